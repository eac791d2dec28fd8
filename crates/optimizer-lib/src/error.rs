//! Error types for the optimizer library

use thiserror::Error;

/// Errors produced by the optimizer subsystem
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration rejected at construction time
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A shared structure's lock was poisoned by a panicking thread
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// The service has already been stopped
    #[error("optimizer service already stopped")]
    ServiceStopped,
}

impl OptimizerError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        OptimizerError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OptimizerError>;
