//! Error types for the UDM library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for UDM operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing property, path segment, document root or file.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A typed accessor was used on a node holding a different type.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Cursor moved past the end of the buffer.
    #[error("Read of {len} bytes at offset {pos} is out of bounds (size {size})")]
    OutOfBounds { pos: u64, len: u64, size: u64 },

    /// Invalid magic bytes at start of file
    #[error("Invalid UDM file: bad magic {0:02X?}")]
    BadMagic(Vec<u8>),

    /// Unsupported file format version
    #[error("Unsupported UDM version: {0}")]
    UnsupportedVersion(u32),

    /// Compressed payload could not be inflated.
    #[error("Decompression failed: {0}")]
    DecompressionFailure(String),

    /// Decoder met an asset shape or shader it does not know.
    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    /// Type tag byte outside the tag table.
    #[error("Unknown type tag: {0}")]
    UnknownTag(u8),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// Syntax error in a text document.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Document failed to load; wraps the cause with the file name.
    #[error("Failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (settings / metadata) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a type mismatch error.
    pub fn mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an unknown schema error.
    pub fn unknown_schema(msg: impl Into<String>) -> Self {
        Self::UnknownSchema(msg.into())
    }

    /// Attach the document path to a load failure.
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            e @ Self::Load { .. } => e,
            e => Self::Load {
                path: path.into(),
                source: Box::new(e),
            },
        }
    }

    /// The underlying cause, looking through [`Error::Load`].
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Load { source, .. } => source.root_cause(),
            e => e,
        }
    }

    /// True for recoverable "missing" conditions.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound(_))
    }
}

/// Result type alias for UDM operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::BadMagic(b"ABCD".to_vec());
        assert!(e.to_string().contains("magic"));

        let e = Error::OutOfBounds { pos: 5, len: 4, size: 6 };
        assert!(e.to_string().contains('5'));
        assert!(e.to_string().contains('6'));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_with_path_wraps_once() {
        let err = Error::UnsupportedVersion(7)
            .with_path("a.pmdl")
            .with_path("b.pmdl");
        assert!(err.to_string().contains("a.pmdl"));
        assert!(matches!(err.root_cause(), Error::UnsupportedVersion(7)));
        assert!(!err.is_not_found());
        assert!(Error::not_found("x").with_path("c").is_not_found());
    }
}
