//! Shared plumbing for the lab backend: configuration, object storage,
//! warehouse access, network/fork schedules, wall-clock slot math,
//! durable state, the processor/module abstraction, geocoding, and the
//! top-level Runner that wires them all together.

pub mod config;
pub mod error;
pub mod frontend;
pub mod geo;
pub mod network;
pub mod processor;
pub mod runner;
pub mod state;
pub mod storage;
pub mod time;
pub mod warehouse;

pub use error::{LabError, Result};
