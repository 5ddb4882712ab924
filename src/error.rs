//! Error types for ldbfmt.

use std::io;
use thiserror::Error;

/// Result type alias for ldbfmt operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the format engine.
///
/// Every fallible operation in the crate returns one of these. The `Display`
/// output is a human-readable one-liner prefixed by the kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// I/O error from file operations.
    #[error("IO error: {0}")]
    Io(String),

    /// On-disk format violation: checksum, magic, truncation, bad handle.
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Lookup miss.
    #[error("NotFound: {0}")]
    NotFound(String),

    /// Misuse of the public API.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not supported by this build.
    #[error("Not implemented: {0}")]
    NotSupported(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a corruption error with the given message.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Check if this error indicates on-disk corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }

    /// Check if this error is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("bad magic");
        assert_eq!(format!("{}", err), "Corruption: bad magic");

        let err = Error::not_found("k1");
        assert_eq!(format!("{}", err), "NotFound: k1");
    }

    #[test]
    fn test_error_is_corruption() {
        assert!(Error::corruption("bad").is_corruption());
        assert!(!Error::not_found("k").is_corruption());
        assert!(!Error::Io("disk gone".into()).is_corruption());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
