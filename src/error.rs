//! Error types
//!
//! One crate-level taxonomy shared by every public operation. Validation
//! failures are raised before any engine call and carry expected-vs-actual
//! context so callers can see exactly which shape constraint broke.

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all public operations
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Bad construction arguments (unsupported format, conflicting or
    /// incomplete resolver filter, non-positive buffer window)
    Config(String),

    /// Shape mismatch caught before any engine call
    Validation {
        /// What was being validated (e.g. "sample length", "row 3 length")
        what: String,
        /// Expected count
        expected: usize,
        /// Actual count
        actual: usize,
    },

    /// Deadline elapsed with no data or event on a blocking call
    Timeout(&'static str),

    /// Remote stream disappeared; recoverable on the next access when the
    /// inlet was constructed with `recover = true`
    Lost(String),

    /// Engine failure, generally fatal to the instance
    Internal(String),

    /// Unrecognized negative engine status code
    Unknown(i32),

    /// Operation on a handle whose `destroy()` already ran
    Destroyed(&'static str),
}

impl Error {
    /// Shorthand for a shape-mismatch error
    pub(crate) fn shape(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::Validation {
            what: what.into(),
            expected,
            actual,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Validation {
                what,
                expected,
                actual,
            } => write!(
                f,
                "Validation error: {} mismatch (expected {}, got {})",
                what, expected, actual
            ),
            Error::Timeout(op) => write!(f, "Timed out waiting for {}", op),
            Error::Lost(what) => write!(f, "Stream lost: {}", what),
            Error::Internal(msg) => write!(f, "Internal engine error: {}", msg),
            Error::Unknown(code) => write!(f, "Unknown engine status code: {}", code),
            Error::Destroyed(what) => write!(f, "{} used after destroy()", what),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_carries_context() {
        let err = Error::shape("sample length", 4, 3);
        let text = err.to_string();
        assert!(text.contains("expected 4"));
        assert!(text.contains("got 3"));
        assert!(text.contains("sample length"));
    }

    #[test]
    fn test_error_is_std_error() {
        fn assert_std_error<E: std::error::Error>(_e: E) {}
        assert_std_error(Error::Timeout("open_stream"));
    }
}
