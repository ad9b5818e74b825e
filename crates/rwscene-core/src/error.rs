//! Unified error handling for rwscene
//!
//! Every failure the codec can report is a variant of [`Error`]. Parse
//! failures are fatal for the tree being read: no partial tree is ever
//! returned to the caller.

use thiserror::Error;

/// Unified error type for all rwscene operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Parse Errors ====================

    /// A read went past the end of the available bytes
    #[error("Truncated input at offset {offset}: needed {expected} bytes, {available} available")]
    Truncated {
        /// Absolute offset of the failed read
        offset: u64,
        /// Bytes the read required
        expected: u64,
        /// Bytes actually left
        available: u64,
    },

    /// A node's declared length disagrees with what its structure consumed
    #[error(
        "Structural mismatch in chunk 0x{node_type:X} at offset {offset}: declared {declared} bytes, consumed {consumed}"
    )]
    StructuralMismatch {
        /// Type tag of the offending node
        node_type: u32,
        /// Absolute offset of the node header
        offset: u64,
        /// Length from the chunk header
        declared: u64,
        /// Bytes the parser actually consumed
        consumed: u64,
    },

    /// A required child chunk was missing or of the wrong type
    #[error("Unexpected chunk at offset {offset}: expected {expected}, found 0x{found:X}")]
    UnexpectedNode {
        /// Name of the chunk that should have been there
        expected: String,
        /// Type tag actually found
        found: u32,
        /// Absolute offset of the unexpected header
        offset: u64,
    },

    /// Chunk nesting went deeper than the configured limit
    #[error("Chunk nesting too deep: {depth} exceeds limit {limit}")]
    NestingTooDeep {
        /// Depth reached
        depth: u32,
        /// Configured maximum
        limit: u32,
    },

    /// Unsupported format version
    #[error("Unsupported library version 0x{version:05X}")]
    UnsupportedVersion {
        /// Unpacked library version
        version: u32,
    },

    /// Invalid data structure
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Description of the problem
        message: String,
    },

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField {
        /// Name of the field or chunk
        field: String,
    },

    // ==================== Scene Errors ====================

    /// An index could not be translated into the requested index space
    #[error("Unresolved {space} index {index}")]
    UnresolvedIndex {
        /// Index space the lookup was made in ("hierarchy", "frame", ...)
        space: &'static str,
        /// The index that failed to resolve
        index: i64,
    },

    /// A vertex names more bone influences than the format can store
    #[error("Vertex {vertex} has {count} bone influences (at most 4 are supported)")]
    TooManyInfluences {
        /// Vertex index
        vertex: usize,
        /// Number of nonzero influences given
        count: usize,
    },

    /// A vertex has no nonzero bone influence
    #[error("Vertex {vertex} has no nonzero bone influence")]
    UnweightedVertex {
        /// Vertex index
        vertex: usize,
    },

    // ==================== Write Errors ====================

    /// A value does not fit the on-disk field it is written to
    #[error("Value {value} out of range for {field}")]
    ValueOutOfRange {
        /// Field being written
        field: &'static str,
        /// Offending value
        value: i64,
    },

    // ==================== General Errors ====================

    /// Custom error with context
    #[error("{context}: {source}")]
    WithContext {
        /// What was being done when the error occurred
        context: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::InvalidData {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Error::MissingField {
            field: field.into(),
        }
    }

    /// Create an out-of-range error for a narrowing write
    pub fn out_of_range(field: &'static str, value: impl TryInto<i64>) -> Self {
        Error::ValueOutOfRange {
            field,
            value: value.try_into().unwrap_or(i64::MAX),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if this is a parse/format error
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::Truncated { .. }
                | Error::StructuralMismatch { .. }
                | Error::UnexpectedNode { .. }
                | Error::NestingTooDeep { .. }
                | Error::UnsupportedVersion { .. }
                | Error::InvalidData { .. }
                | Error::MissingField { .. }
        )
    }

    /// Check if this error came from building skin data
    pub fn is_skin_error(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::TooManyInfluences { .. }
                | Error::UnweightedVertex { .. }
                | Error::UnresolvedIndex { .. }
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::missing_field("FrameList");
        let contextualized = err.with_context("while reading clump");

        assert!(contextualized.to_string().contains("while reading clump"));
        assert!(contextualized.to_string().contains("FrameList"));
    }

    #[test]
    fn test_is_parse_error_sees_through_context() {
        let err = Error::Truncated {
            offset: 12,
            expected: 4,
            available: 1,
        }
        .with_context("geometry")
        .with_context("clump");

        assert!(err.is_parse_error());
        assert!(!err.is_skin_error());
    }

    #[test]
    fn test_is_skin_error() {
        assert!(Error::TooManyInfluences { vertex: 0, count: 5 }.is_skin_error());
        assert!(Error::UnweightedVertex { vertex: 3 }.is_skin_error());
        assert!(!Error::invalid_data("x").is_skin_error());
    }

    #[test]
    fn test_out_of_range_saturates() {
        match Error::out_of_range("index", u64::MAX) {
            Error::ValueOutOfRange { field, value } => {
                assert_eq!(field, "index");
                assert_eq!(value, i64::MAX);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::invalid_data("bad count"));
        let with_context = result.context("loading data");

        assert!(with_context.is_err());
        assert!(with_context.unwrap_err().to_string().contains("loading data"));
    }
}
