//! Slot/epoch wall-clock math for a single Ethereum network.
//!
//! Ported field-for-field from the network's `WallClock` helper: genesis
//! time plus seconds-per-slot is enough to convert freely between slot
//! numbers, epoch numbers, and `DateTime<Utc>` instants.

use chrono::{DateTime, TimeDelta, Utc};

pub const SLOTS_PER_EPOCH: u64 = 32;

#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    genesis_time: DateTime<Utc>,
    seconds_per_slot: u64,
}

impl WallClock {
    pub fn new(genesis_time: i64, seconds_per_slot: u64) -> Self {
        Self {
            genesis_time: DateTime::from_timestamp(genesis_time, 0).unwrap_or_default(),
            seconds_per_slot,
        }
    }

    pub fn genesis_time(&self) -> DateTime<Utc> {
        self.genesis_time
    }

    pub fn seconds_per_slot(&self) -> u64 {
        self.seconds_per_slot
    }

    pub fn current_slot(&self) -> u64 {
        self.time_to_slot(Utc::now())
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_slot() / SLOTS_PER_EPOCH
    }

    pub fn time_to_slot(&self, time: DateTime<Utc>) -> u64 {
        if time < self.genesis_time {
            return 0;
        }
        let delta = time - self.genesis_time;
        (delta.num_seconds() as u64) / self.seconds_per_slot
    }

    pub fn time_to_epoch(&self, time: DateTime<Utc>) -> u64 {
        self.time_to_slot(time) / SLOTS_PER_EPOCH
    }

    /// Start time of a slot.
    pub fn slot_to_time(&self, slot: u64) -> DateTime<Utc> {
        self.genesis_time + TimeDelta::seconds((slot * self.seconds_per_slot) as i64)
    }

    /// Start time of an epoch.
    pub fn epoch_to_time(&self, epoch: u64) -> DateTime<Utc> {
        self.slot_to_time(epoch * SLOTS_PER_EPOCH)
    }

    pub fn slot_in_epoch(&self, slot: u64) -> u64 {
        slot % SLOTS_PER_EPOCH
    }

    pub fn epoch_start_slot(&self, epoch: u64) -> u64 {
        epoch * SLOTS_PER_EPOCH
    }

    pub fn epoch_end_slot(&self, epoch: u64) -> u64 {
        (epoch + 1) * SLOTS_PER_EPOCH - 1
    }

    pub fn is_slot_in_epoch(&self, slot: u64, epoch: u64) -> bool {
        (self.epoch_start_slot(epoch)..=self.epoch_end_slot(epoch)).contains(&slot)
    }

    pub fn time_until_slot(&self, slot: u64) -> TimeDelta {
        self.slot_to_time(slot) - Utc::now()
    }

    pub fn time_until_epoch(&self, epoch: u64) -> TimeDelta {
        self.time_until_slot(self.epoch_start_slot(epoch))
    }

    pub fn is_current_slot(&self, slot: u64) -> bool {
        slot == self.current_slot()
    }

    pub fn is_current_epoch(&self, epoch: u64) -> bool {
        epoch == self.current_epoch()
    }

    pub fn is_slot_in_future(&self, slot: u64) -> bool {
        slot > self.current_slot()
    }

    pub fn is_epoch_in_future(&self, epoch: u64) -> bool {
        epoch > self.current_epoch()
    }

    pub fn slot_start_time(&self, slot: u64) -> DateTime<Utc> {
        self.slot_to_time(slot)
    }

    pub fn slot_end_time(&self, slot: u64) -> DateTime<Utc> {
        self.slot_to_time(slot + 1)
    }

    pub fn slot_progress(&self, slot: u64) -> f64 {
        if !self.is_current_slot(slot) {
            return if slot < self.current_slot() { 100.0 } else { 0.0 };
        }
        let start = self.slot_start_time(slot);
        let elapsed = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;
        (elapsed / self.seconds_per_slot as f64 * 100.0).min(100.0)
    }

    pub fn epoch_progress(&self, epoch: u64) -> f64 {
        if !self.is_current_epoch(epoch) {
            return if epoch < self.current_epoch() { 100.0 } else { 0.0 };
        }
        let start_slot = self.epoch_start_slot(epoch);
        let current_slot = self.current_slot();
        let slot_progress = self.slot_progress(current_slot);
        let slots_elapsed = (current_slot - start_slot) as f64;
        ((slots_elapsed * 100.0 + slot_progress) / SLOTS_PER_EPOCH as f64).min(100.0)
    }

    /// `(start, end)` instants spanning a slot.
    pub fn slot_window(&self, slot: u64) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.slot_to_time(slot);
        let end = start + TimeDelta::seconds(self.seconds_per_slot as i64);
        (start, end)
    }

    /// `(start, end)` instants spanning an epoch.
    pub fn epoch_window(&self, epoch: u64) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.epoch_to_time(epoch);
        let end = start + TimeDelta::seconds((self.seconds_per_slot * SLOTS_PER_EPOCH) as i64);
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> WallClock {
        // Mainnet genesis, 12s slots.
        WallClock::new(1_606_824_023, 12)
    }

    #[test]
    fn slot_and_time_round_trip() {
        let clock = clock();
        let slot = 1_000_000;
        let t = clock.slot_to_time(slot);
        assert_eq!(clock.time_to_slot(t), slot);
    }

    #[test]
    fn epoch_boundaries_are_32_slots_wide() {
        let clock = clock();
        let epoch = 12345;
        let start = clock.epoch_start_slot(epoch);
        let end = clock.epoch_end_slot(epoch);
        assert_eq!(end - start + 1, SLOTS_PER_EPOCH);
        assert!(clock.is_slot_in_epoch(start, epoch));
        assert!(clock.is_slot_in_epoch(end, epoch));
        assert!(!clock.is_slot_in_epoch(end + 1, epoch));
    }

    #[test]
    fn time_before_genesis_clamps_to_slot_zero() {
        let clock = clock();
        let before = clock.genesis_time() - TimeDelta::seconds(100);
        assert_eq!(clock.time_to_slot(before), 0);
    }

    #[test]
    fn slot_window_spans_one_slot_duration() {
        let clock = clock();
        let (start, end) = clock.slot_window(500);
        assert_eq!((end - start).num_seconds() as u64, clock.seconds_per_slot());
    }

    #[test]
    fn epoch_window_spans_32_slots() {
        let clock = clock();
        let (start, end) = clock.epoch_window(10);
        assert_eq!(
            (end - start).num_seconds() as u64,
            clock.seconds_per_slot() * SLOTS_PER_EPOCH
        );
    }
}
