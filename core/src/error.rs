//! Error types for redis-bench-core

use thiserror::Error;

/// Core error type
///
/// Configuration and preparation errors are raised before any remote side
/// effects accumulate. Remote and dispatch errors come out of remote work,
/// parse errors out of captured command output.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid or contradictory user-supplied parameters
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Expected topology or precondition not met
    #[error("preparation error: {0}")]
    Preparation(String),

    /// A remote command failed, or the transport carrying it did
    #[error("remote command failed on {machine}: {message} (command: {command})")]
    RemoteExecution {
        /// Machine the command was issued on
        machine: String,
        /// The command string
        command: String,
        /// Failure description (stderr, exit status or transport error)
        message: String,
    },

    /// Captured output did not match the expected format
    #[error("parse error: {0}")]
    Parse(String),

    /// A dispatched task panicked or was aborted
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BenchError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        BenchError::Configuration(message.into())
    }

    /// Create a configuration error for a required field that was not set
    pub fn missing_config(field: &str) -> Self {
        BenchError::Configuration(format!("missing required field: {field}"))
    }

    /// Create a preparation error
    pub fn preparation(message: impl Into<String>) -> Self {
        BenchError::Preparation(message.into())
    }

    /// Create a remote execution error
    pub fn remote(
        machine: impl Into<String>,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        BenchError::RemoteExecution {
            machine: machine.into(),
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        BenchError::Parse(message.into())
    }

    /// True for errors that abort a run before any remote side effects
    pub fn is_fatal_precondition(&self) -> bool {
        matches!(
            self,
            BenchError::Configuration(_) | BenchError::Preparation(_)
        )
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
