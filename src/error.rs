//! Error types for starch
//!
//! Provides unified error handling across all starch modules.

use thiserror::Error;

/// Core starch error types
#[derive(Error, Debug)]
pub enum StarchError {
    /// Contradictory or missing configuration, or an unusable source set.
    /// Always raised before any store I/O.
    #[error("Input error: {0}")]
    Input(String),

    /// Manifest CSV could not be read or parsed
    #[error("Manifest error: {0}")]
    Manifest(#[from] csv::Error),

    /// The planner or grouper produced a layout that breaks a tar or store
    /// invariant. Programmer error; surfaced without attempting upload.
    #[error("Layout invariant violated: {0}")]
    InvariantViolation(String),

    /// A store call failed and the client's own retry policy was exhausted
    #[error("Store error: {0}")]
    Store(String),

    /// The run's cancellation token fired
    #[error("Run cancelled")]
    Cancelled,

    /// A spawned assembly task died without reporting a result
    #[error("Task failure: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StarchResult<T> = Result<T, StarchError>;

impl StarchError {
    pub fn input<S: Into<String>>(message: S) -> Self {
        StarchError::Input(message.into())
    }

    pub fn store<S: Into<String>>(message: S) -> Self {
        StarchError::Store(message.into())
    }

    pub fn invariant<S: Into<String>>(message: S) -> Self {
        StarchError::InvariantViolation(message.into())
    }
}
