//! Crate-wide error kinds, matching the propagation policy spelled out
//! for the processor-orchestration engine: every collaborator failure
//! collapses into one of a handful of kinds so a driving loop can decide
//! whether to retry, skip, or treat the failure as fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LabError>;

impl LabError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        LabError::NotFound(msg.into())
    }

    pub fn data_integrity(msg: impl Into<String>) -> Self {
        LabError::DataIntegrity(msg.into())
    }

    pub fn config_invalid(msg: impl Into<String>) -> Self {
        LabError::ConfigInvalid(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        LabError::Fatal(msg.into())
    }

    /// True for errors a retrying caller should treat as "try again later"
    /// rather than give up on permanently.
    pub fn is_transient(&self) -> bool {
        matches!(self, LabError::Transient(_))
    }
}
