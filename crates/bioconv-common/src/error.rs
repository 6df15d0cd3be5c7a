//! Error types for bioconv

use thiserror::Error;

/// Result type alias for bioconv operations
pub type Result<T> = std::result::Result<T, BioconvError>;

/// Fatal errors raised while converting a data source.
///
/// Non-fatal conditions (unresolved references, conflicting duplicate keys)
/// are logged and counted by the converter, never returned as errors.
#[derive(Error, Debug)]
pub enum BioconvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Structurally invalid input; aborts the whole conversion.
    #[error("Malformed input at line {line}: {message}")]
    MalformedInput { line: usize, message: String },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Tabular input error: {0}")]
    Csv(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid converter state: {0}")]
    InvalidState(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl BioconvError {
    /// Shorthand for [`BioconvError::MalformedInput`]
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        BioconvError::MalformedInput {
            line,
            message: message.into(),
        }
    }

    /// Whether this error came from the input itself rather than the environment
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, BioconvError::MalformedInput { .. } | BioconvError::Xml(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display() {
        let err = BioconvError::malformed(12, "expected 9 columns, got 4");
        assert_eq!(err.to_string(), "Malformed input at line 12: expected 9 columns, got 4");
        assert!(err.is_malformed_input());
    }

    #[test]
    fn test_io_is_not_malformed() {
        let err: BioconvError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(!err.is_malformed_input());
    }
}
