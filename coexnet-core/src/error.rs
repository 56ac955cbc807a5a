//! Structured error types for the coexnet workspace.

use thiserror::Error;

/// Unified error type for all coexnet operations.
///
/// Storage invariant violations and backend failures are fatal for a run;
/// per-pair numerical edge cases never surface here (they resolve to `K = 0`
/// or a `NaN` correlation instead).
#[derive(Debug, Error)]
pub enum CoexError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input (bad arguments, inconsistent configuration)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A pairwise index could not be constructed or moved.
    #[error("invalid pairwise index: {0}")]
    InvalidIndex(String),

    /// A seek past the theoretical pair count of the matrix.
    #[error("index out of range: pair {index} >= total pairs {total}")]
    IndexOutOfRange { index: u64, total: u64 },

    /// A write whose index is not strictly after the last written index.
    #[error("storage corruption: write of pair {index} after pair {last} violates append order")]
    NonMonotonicWrite { index: u64, last: u64 },

    /// The matrix header was already written.
    #[error("matrix header is already initialized")]
    AlreadyInitialized,

    /// A record was written before the matrix header.
    #[error("matrix header has not been initialized")]
    NotInitialized,

    /// Corrupt or truncated storage contents.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A compute kernel failed to build or load.
    #[error("backend compile error: {0}")]
    BackendCompile(String),

    /// A device allocation, transfer, or kernel launch failed.
    #[error("backend execution error: {0}")]
    BackendExecution(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

impl CoexError {
    /// Short title for the error kind, paired with the `Display` detail when
    /// a run aborts.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Io(_) => "File IO Error",
            Self::InvalidInput(_) => "Invalid Input",
            Self::InvalidIndex(_) | Self::IndexOutOfRange { .. } => "Index Error",
            Self::NonMonotonicWrite { .. } | Self::MalformedRecord(_) => "Storage Error",
            Self::AlreadyInitialized | Self::NotInitialized => "Header Error",
            Self::BackendCompile(_) => "Kernel Build Error",
            Self::BackendExecution(_) => "Device Error",
            Self::Other(_) => "Error",
        }
    }
}

/// Convenience alias used throughout the coexnet workspace.
pub type Result<T> = std::result::Result<T, CoexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_detail() {
        let err = CoexError::NonMonotonicWrite { index: 3, last: 7 };
        assert_eq!(
            err.to_string(),
            "storage corruption: write of pair 3 after pair 7 violates append order"
        );
        assert_eq!(err.title(), "Storage Error");
    }

    #[test]
    fn io_converts_with_question_mark() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, CoexError::Io(_)));
        assert_eq!(err.title(), "File IO Error");
    }

    #[test]
    fn index_out_of_range_message() {
        let err = CoexError::IndexOutOfRange { index: 6, total: 6 };
        assert_eq!(err.to_string(), "index out of range: pair 6 >= total pairs 6");
    }
}
