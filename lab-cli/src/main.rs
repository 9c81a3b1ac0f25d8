use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lab_core::config::Config;
use lab_core::processor::{BoxModule, ModuleContext};
use lab_core::runner::Runner;
use lab_core::storage::{FsObjectStore, ObjectStore};

#[derive(Parser, Debug)]
#[command(name = "lab", about = "Periodic Ethereum beacon-chain analytics aggregator")]
struct Args {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug-level logging regardless of RUST_LOG.
    #[arg(short, long)]
    debug: bool,

    /// Override the configured object store. `fs:<dir>` stores objects
    /// under `<dir>` on the local filesystem instead of S3, for local
    /// development.
    #[arg(long, value_name = "fs:<dir>")]
    storage: Option<String>,
}

fn storage_override(raw: &str) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match raw.strip_prefix("fs:") {
        Some(dir) => Ok(Arc::new(FsObjectStore::new(dir))),
        None => anyhow::bail!("unrecognized --storage value {raw:?}, expected fs:<dir>"),
    }
}

fn log_init(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    log_init(args.debug);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!(path = %args.config.display(), "loading configuration");
    let config = Config::from_path(&args.config)?;

    let mut network_names: Vec<String> = config.ethereum.networks.keys().cloned().collect();
    if network_names.is_empty() {
        network_names.push("mainnet".to_string());
    }

    let storage = args.storage.as_deref().map(storage_override).transpose()?;
    let mut runner = Runner::new(config.clone(), &network_names, storage).await?;

    if let Some(beacon_config) = config.modules.beacon.clone() {
        if beacon_config.enabled {
            let ctx = module_context(&mut runner, "beacon");
            let module: BoxModule = Box::new(lab_beacon::BeaconModule::new(
                ctx,
                &beacon_config,
                &config.ethereum,
            ));
            runner.register_module(module);
        }
    }

    if let Some(timings_config) = config.modules.beacon_chain_timings.clone() {
        if timings_config.enabled {
            let ctx = module_context(&mut runner, "beacon_chain_timings");
            let module: BoxModule = Box::new(lab_timings::BeaconChainTimingsModule::new(
                ctx,
                &timings_config,
            ));
            runner.register_module(module);
        }
    }

    if let Some(xatu_config) = config.modules.xatu_public_contributors.clone() {
        if xatu_config.enabled {
            let ctx = module_context(&mut runner, "xatu_public_contributors");
            let module: BoxModule = Box::new(lab_xatu::XatuPublicContributorsModule::new(
                ctx,
                &xatu_config,
            ));
            runner.register_module(module);
        }
    }

    runner.run().await?;
    Ok(())
}

fn module_context(runner: &mut Runner, name: &str) -> ModuleContext {
    let state = runner.new_state_store(name);
    ModuleContext {
        name: name.to_string(),
        storage: runner.storage(),
        warehouse: runner.warehouse(),
        state,
        networks: runner.networks(),
    }
}
