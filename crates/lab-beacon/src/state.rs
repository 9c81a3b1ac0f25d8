//! Per-direction processor state, stored under `slot_<network>_<direction>`
//! in the module's shared [`lab_core::state::StateStore`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Middle,
    Backward,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotProcessorState {
    pub target_slot: Option<u64>,
    pub current_slot: Option<u64>,
    pub last_processed_slot: Option<u64>,
}
