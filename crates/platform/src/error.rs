//! Error types for strait

use std::fmt;

/// Unified error type for all strait operations
#[derive(Debug)]
pub enum StraitError {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Protocol error
    Protocol(String),

    /// Security error (authentication, authorization, etc.)
    Security(String),

    /// Other error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for StraitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StraitError::Io(e) => write!(f, "IO error: {}", e),
            StraitError::Config(msg) => write!(f, "Configuration error: {}", msg),
            StraitError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            StraitError::Security(msg) => write!(f, "Security error: {}", msg),
            StraitError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for StraitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StraitError::Io(e) => Some(e),
            StraitError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StraitError {
    fn from(err: std::io::Error) -> Self {
        StraitError::Io(err)
    }
}

/// Result type for strait operations
pub type StraitResult<T> = Result<T, StraitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StraitError::Config("Invalid configuration".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let strait_err: StraitError = io_err.into();
        assert!(matches!(strait_err, StraitError::Io(_)));
    }

    #[test]
    fn test_result_type() {
        fn example() -> StraitResult<i32> {
            Ok(42)
        }

        assert_eq!(example().unwrap(), 42);
    }
}
