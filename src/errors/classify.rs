//! Classification of errors raised by step bodies.
//!
//! Every raw error maps to exactly one [`ErrorKind`]:
//!
//! - [`ErrorKind::Assertion`] for typed [`AssertionFailure`]s and for any error whose
//!   message reads like a failed assertion (this includes `assert!` panics). The original
//!   backtrace text is copied onto the wrapper.
//! - [`ErrorKind::AlreadyStructured`] for errors that already are a [`StructuredError`];
//!   those are handed back untouched.
//! - [`ErrorKind::Unclassified`] for everything else, wrapped as-is.

use crate::errors::AssertionFailure;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Assertion,
    AlreadyStructured,
    Unclassified,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Assertion => "assertion",
            ErrorKind::AlreadyStructured => "already-structured",
            ErrorKind::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

/// A classified step failure. Built once per failing step and never mutated afterwards.
#[derive(Debug)]
pub struct StructuredError {
    kind: ErrorKind,
    message: String,
    original: Option<anyhow::Error>,
    original_stack: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl StructuredError {
    /// Builds a structured error from a lower layer (a driver, a helper library).
    /// The classifier passes these through unchanged.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::AlreadyStructured,
            message: message.into(),
            original: None,
            original_stack: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn original(&self) -> Option<&anyhow::Error> {
        self.original.as_ref()
    }

    pub fn original_stack(&self) -> Option<&str> {
        self.original_stack.as_deref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for StructuredError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.original
            .as_ref()
            .map(|err| &**err as &(dyn std::error::Error + 'static))
    }
}

fn assertion_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(assertion\b.*?\bfailed\b|assertion ?error\b)")
            .expect("assertion pattern is valid")
    })
}

fn is_assertion(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<AssertionFailure>().is_some() {
        return true;
    }
    assertion_pattern().is_match(&err.to_string())
}

/// Lifts a raw step error into a [`StructuredError`]. Pure and total.
pub fn classify(err: anyhow::Error) -> StructuredError {
    let err = match err.downcast::<StructuredError>() {
        Ok(structured) => return structured,
        Err(err) => err,
    };

    if is_assertion(&err) {
        StructuredError {
            kind: ErrorKind::Assertion,
            message: err.to_string(),
            original_stack: Some(err.backtrace().to_string()),
            original: Some(err),
            occurred_at: Utc::now(),
        }
    } else {
        StructuredError {
            kind: ErrorKind::Unclassified,
            message: err.to_string(),
            original_stack: None,
            original: Some(err),
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn assertion_message_is_classified_with_stack() {
        let err = anyhow!("assertion failed: x");
        let expected_stack = err.backtrace().to_string();

        let structured = classify(err);
        assert_eq!(structured.kind(), ErrorKind::Assertion);
        assert_eq!(structured.message(), "assertion failed: x");
        assert_eq!(structured.original_stack(), Some(expected_stack.as_str()));
        assert!(structured.original().is_some());
    }

    #[test]
    fn typed_assertion_failure() {
        let structured = classify(AssertionFailure("title matches".into()).into());
        assert_eq!(structured.kind(), ErrorKind::Assertion);
        assert_eq!(structured.message(), "assertion failed: title matches");
    }

    #[test]
    fn assert_macro_panic_text_is_an_assertion() {
        let structured = classify(anyhow!("assertion failed: left == right"));
        assert_eq!(structured.kind(), ErrorKind::Assertion);

        let structured = classify(anyhow!("assertion `left == right` failed\n  left: 1\n right: 2"));
        assert_eq!(structured.kind(), ErrorKind::Assertion);

        let structured = classify(anyhow!("AssertionError: expected 2"));
        assert_eq!(structured.kind(), ErrorKind::Assertion);
    }

    #[test]
    fn structured_errors_pass_through_unchanged() {
        let original = StructuredError::new("element #submit not found");
        let at = original.occurred_at();

        let structured = classify(original.into());
        assert_eq!(structured.kind(), ErrorKind::AlreadyStructured);
        assert_eq!(structured.message(), "element #submit not found");
        assert_eq!(structured.occurred_at(), at);
        assert!(structured.original().is_none());
    }

    #[test]
    fn reraised_classification_keeps_its_kind() {
        let first = classify(anyhow!("assertion failed: once"));
        let again = classify(first.into());
        assert_eq!(again.kind(), ErrorKind::Assertion);
    }

    #[test]
    fn anything_else_is_unclassified() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let structured = classify(io.into());
        assert_eq!(structured.kind(), ErrorKind::Unclassified);
        assert_eq!(structured.message(), "socket closed");
        assert!(structured.original_stack().is_none());
        assert!(std::error::Error::source(&structured).is_some());

        // Mentioning an assertion mid-message is not an assertion failure.
        let structured = classify(anyhow!("request failed: assertion failed upstream"));
        assert_eq!(structured.kind(), ErrorKind::Unclassified);
    }

    #[test]
    fn kind_names() {
        assert_eq!(ErrorKind::Assertion.to_string(), "assertion");
        assert_eq!(ErrorKind::AlreadyStructured.to_string(), "already-structured");
        assert_eq!(
            serde_json::to_string(&ErrorKind::Unclassified).unwrap(),
            "\"unclassified\""
        );
    }
}
