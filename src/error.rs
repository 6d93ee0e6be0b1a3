//! Error types with actionable diagnostics.
//!
//! Every error carries enough context to act on without consulting
//! external documentation.

use thiserror::Error;

/// Result type alias for calentar operations.
pub type Result<T> = std::result::Result<T, CalentarError>;

/// Errors that can occur while driving a warm-up schedule.
#[derive(Error, Debug)]
pub enum CalentarError {
    /// A caller-supplied argument is outside the accepted domain.
    #[error("invalid argument '{field}': {message}\n  → {suggestion}")]
    InvalidArgument {
        field: String,
        message: String,
        suggestion: String,
    },

    /// An underlying compute resource gave out (e.g. allocation failure
    /// inside a collaborator). Never retried; propagated to the caller.
    #[error("resource exhausted during {what}: {message}\n  → reduce the batch size or the number of parameter groups")]
    ResourceExhausted { what: String, message: String },
}

impl CalentarError {
    /// Shorthand for the `InvalidArgument` variant.
    pub fn invalid_argument(
        field: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_has_actionable_message() {
        let err = CalentarError::invalid_argument(
            "routine",
            "unrecognized routine 'gradual'",
            "use 'felbo' or 'howard'",
        );
        let msg = err.to_string();
        assert!(msg.contains("routine"));
        assert!(msg.contains("→"));
        assert!(msg.contains("felbo"));
    }

    #[test]
    fn test_resource_exhausted_names_the_operation() {
        let err = CalentarError::ResourceExhausted {
            what: "optimizer step".into(),
            message: "moment buffer allocation failed".into(),
        };
        assert!(err.to_string().contains("optimizer step"));
    }
}
