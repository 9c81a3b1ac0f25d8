//! Backlog target selection: exactly one of fork name, target date, or
//! target slot; if none is set, the default is "1 day ago".

use chrono::{DateTime, Utc};

use lab_core::error::{LabError, Result};
use lab_core::network::EthereumNetwork;

#[derive(Debug, Clone, Default)]
pub struct BacklogConfig {
    pub fork_name: Option<String>,
    pub target_date: Option<DateTime<Utc>>,
    pub target_slot: Option<u64>,
}

impl BacklogConfig {
    pub fn validated(self) -> Result<Self> {
        let set_count = [
            self.fork_name.is_some(),
            self.target_date.is_some(),
            self.target_slot.is_some(),
        ]
        .into_iter()
        .filter(|x| *x)
        .count();

        if set_count > 1 {
            return Err(LabError::config_invalid(
                "only one of fork_name, target_date, or target_slot may be set",
            ));
        }
        Ok(self)
    }

    /// Resolves to an absolute target slot for `network`.
    pub fn target_slot(&self, network: &EthereumNetwork) -> Result<u64> {
        if let Some(fork_name) = &self.fork_name {
            let epoch = network
                .fork_epoch(fork_name)
                .ok_or_else(|| LabError::config_invalid(format!("unknown fork `{fork_name}`")))?;
            return Ok(epoch * lab_core::time::SLOTS_PER_EPOCH);
        }

        if let Some(target_date) = self.target_date {
            let delta = target_date.timestamp() - network.genesis_time();
            let seconds_per_slot = network.config().seconds_per_slot as i64;
            return Ok((delta / seconds_per_slot).max(0) as u64);
        }

        if let Some(target_slot) = self.target_slot {
            return Ok(target_slot);
        }

        // Default: one day behind the current wall-clock slot.
        let current_slot = network.clock().current_slot();
        let slots_per_day = 86_400 / network.config().seconds_per_slot;
        Ok(current_slot.saturating_sub(slots_per_day))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_than_one_field_set_is_rejected() {
        let cfg = BacklogConfig {
            fork_name: Some("deneb".to_string()),
            target_slot: Some(100),
            ..Default::default()
        };
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn single_field_passes_validation() {
        let cfg = BacklogConfig {
            target_slot: Some(100),
            ..Default::default()
        };
        assert!(cfg.validated().is_ok());
    }

    #[test]
    fn default_is_valid() {
        assert!(BacklogConfig::default().validated().is_ok());
    }
}
