//! Processor/Module abstraction: one cadenced work unit driven by a
//! default should-process/process/sleep loop, grouped under a Module
//! that owns a fixed set of them.
//!
//! Generalized from the reference `Module`/`ModuleContext` base classes:
//! Rust has no subclass hierarchy to lean on, so dynamic dispatch happens
//! through trait objects instead, and the default scheduling loop is
//! factored out into [`PeriodicDriver`] rather than inherited.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::network::NetworkCatalog;
use crate::state::StateStore;
use crate::storage::ObjectStore;
use crate::warehouse::WarehouseClient;

/// Collaborators handed to every module at construction time. Built once
/// by the Runner and cloned (cheaply, via `Arc`s) into each module.
#[derive(Clone)]
pub struct ModuleContext {
    pub name: String,
    pub storage: Arc<dyn ObjectStore>,
    pub warehouse: Arc<WarehouseClient>,
    pub state: Arc<StateStore>,
    pub networks: Arc<NetworkCatalog>,
}

impl ModuleContext {
    /// A storage key prefixed with the module name, e.g.
    /// `beacon/slots/mainnet/123.json`.
    pub fn storage_key(&self, parts: &[&str]) -> String {
        let mut segments = vec![self.name.as_str()];
        segments.extend_from_slice(parts);
        segments.join("/")
    }
}

/// State key holding the UTC timestamp a processor last completed
/// `process()` successfully, namespaced by [`Processor::name`].
fn last_processed_key(name: &str) -> String {
    format!("{name}_last_processed")
}

/// One cadenced unit of work. Implementors own a durable state sub-key
/// (via the module's shared [`StateStore`], namespaced by [`Processor::name`])
/// and must be safe to call `process` on repeatedly and re-entrantly.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stable identifier; used as a state-key prefix.
    fn name(&self) -> &str;

    /// Cadence between successive `process()` calls.
    fn interval(&self) -> StdDuration;

    /// Durable state backing `should_process`/`update_last_processed`, so
    /// cadence survives a restart instead of resetting to "run
    /// immediately" every time the process comes back up.
    fn state(&self) -> &Arc<StateStore>;

    /// Spawn internal tasks if any; must be idempotent.
    async fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()>
    where
        Self: Sized + 'static,
    {
        tokio::spawn(async move { PeriodicDriver::new(self, cancel).run().await })
    }

    /// Cancels and tears down any internal tasks. The default is a no-op;
    /// processors driven entirely by [`PeriodicDriver`] have nothing of
    /// their own to tear down beyond the driver's own cancellation.
    async fn stop(&self) {}

    /// Whether `interval()` has elapsed since the last successful
    /// `process()`, per the durable timestamp in [`Processor::state`].
    /// Returns `true` when no prior run is recorded, so a processor runs
    /// immediately the first time it is ever driven.
    async fn should_process(&self) -> bool {
        match self
            .state()
            .get_typed::<chrono::DateTime<Utc>>(&last_processed_key(self.name()))
            .await
        {
            Ok(last) => {
                let elapsed = Utc::now() - last;
                let interval = chrono::Duration::from_std(self.interval()).unwrap_or_default();
                elapsed >= interval
            }
            Err(_) => true,
        }
    }

    /// Records "now" as the last successful `process()` time. Called by
    /// [`PeriodicDriver`] after `process()` returns `Ok`.
    async fn update_last_processed(&self) {
        if let Err(e) = self
            .state()
            .set(&last_processed_key(self.name()), Utc::now())
            .await
        {
            error!(processor = %self.name(), error = %e, "failed to record last-processed timestamp");
        }
    }

    /// One iteration. Must complete, fail, or be cancelled in bounded
    /// time; a returned error is logged and swallowed by the driver.
    async fn process(&self) -> anyhow::Result<()>;
}

/// Implements the default scheduling loop named in the module contract:
/// try `process()`, log errors without advancing state, then wait for a
/// stop signal or the next interval tick.
pub struct PeriodicDriver<P: Processor + ?Sized> {
    processor: Arc<P>,
    cancel: CancellationToken,
}

impl<P: Processor + ?Sized> PeriodicDriver<P> {
    pub fn new(processor: Arc<P>, cancel: CancellationToken) -> Self {
        Self { processor, cancel }
    }

    pub async fn run(self) {
        let name = self.processor.name().to_string();
        info!(processor = %name, "starting periodic driver");
        loop {
            let started = Utc::now();
            if self.processor.should_process().await {
                match self.processor.process().await {
                    Ok(()) => {
                        debug!(processor = %name, "process iteration complete");
                        self.processor.update_last_processed().await;
                    }
                    Err(e) => error!(processor = %name, error = %e, "process iteration failed"),
                }
            } else {
                debug!(processor = %name, "skipping iteration, not due yet");
            }
            let elapsed = Utc::now() - started;
            let interval = self.processor.interval();
            let remaining = interval.saturating_sub(
                elapsed
                    .to_std()
                    .unwrap_or(StdDuration::from_secs(0)),
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(processor = %name, "stop signal received, exiting periodic driver");
                    break;
                }
                _ = tokio::time::sleep(remaining) => {}
            }
        }
        self.processor.stop().await;
        info!(processor = %name, "stopped periodic driver");
    }
}

/// Owns a fixed set of processors (or other internal tasks). `start`
/// must be idempotent and must not block past the time needed to launch
/// its internal tasks; `stop` cancels all tracked tasks and awaits them.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self);
}

pub type BoxModule = Box<dyn Module>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::storage::MemoryObjectStore;

    struct CountingProcessor {
        calls: AtomicUsize,
        state: Arc<StateStore>,
    }

    #[async_trait]
    impl Processor for CountingProcessor {
        fn name(&self) -> &str {
            "counting"
        }

        fn interval(&self) -> StdDuration {
            StdDuration::from_millis(10)
        }

        fn state(&self) -> &Arc<StateStore> {
            &self.state
        }

        async fn process(&self) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn driver_ticks_until_cancelled() {
        let storage = Arc::new(MemoryObjectStore::new());
        let state = StateStore::new("counting", storage);
        state.start().await.unwrap();
        let processor = Arc::new(CountingProcessor {
            calls: AtomicUsize::new(0),
            state,
        });
        let cancel = CancellationToken::new();
        let handle = Processor::start(processor.clone(), cancel.clone()).await;

        tokio::time::sleep(StdDuration::from_millis(55)).await;
        cancel.cancel();
        handle.await.unwrap();

        let calls = processor.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected multiple iterations, got {calls}");
    }

    #[tokio::test]
    async fn should_process_false_until_interval_elapses() {
        let storage = Arc::new(MemoryObjectStore::new());
        let state = StateStore::new("counting", storage);
        state.start().await.unwrap();
        let processor = CountingProcessor {
            calls: AtomicUsize::new(0),
            state,
        };

        assert!(processor.should_process().await, "no prior run recorded yet");
        processor.update_last_processed().await;
        assert!(
            !processor.should_process().await,
            "interval has not elapsed since the just-recorded run"
        );
    }
}
