use std::sync::Arc;
use thiserror::Error;

pub mod classify;

pub use classify::{classify, ErrorKind, StructuredError};

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("No test data record available for iteration {iteration}")]
    DataExhausted { iteration: u32 },

    #[error("Step '{step}' failed: {error}")]
    StepFailed {
        step: String,
        error: Arc<StructuredError>,
    },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    Anyhow(String),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

// Convert anyhow::Error to RunnerError
impl From<anyhow::Error> for RunnerError {
    fn from(err: anyhow::Error) -> Self {
        RunnerError::Anyhow(err.to_string())
    }
}

impl RunnerError {
    pub fn driver<E: std::fmt::Display>(err: E) -> Self {
        RunnerError::Driver(err.to_string())
    }

    /// True for failures that end the run before any step executes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunnerError::DataExhausted { .. } | RunnerError::Driver(_))
    }
}

/// Raised by step bodies when an explicit check does not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("assertion failed: {0}")]
pub struct AssertionFailure(pub String);

/// Fails the current step with an [`AssertionFailure`] unless `condition` holds.
pub fn assert_that(condition: bool, message: impl Into<String>) -> anyhow::Result<()> {
    if condition {
        Ok(())
    } else {
        Err(AssertionFailure(message.into()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_that_passes_and_fails() {
        assert!(assert_that(true, "never").is_ok());

        let err = assert_that(1 + 1 == 3, "math is broken").unwrap_err();
        assert_eq!(err.to_string(), "assertion failed: math is broken");
        assert!(err.downcast_ref::<AssertionFailure>().is_some());
    }

    #[test]
    fn fatal_errors() {
        assert!(RunnerError::DataExhausted { iteration: 2 }.is_fatal());
        assert!(!RunnerError::Config("bad".into()).is_fatal());
        assert_eq!(
            RunnerError::DataExhausted { iteration: 2 }.to_string(),
            "No test data record available for iteration 2"
        );
    }
}
