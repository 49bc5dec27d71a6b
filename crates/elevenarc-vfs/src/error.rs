//! Error types for blob and namespace operations

use thiserror::Error;

/// Result type for VFS operations
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors raised by [`LazyBlob`](crate::LazyBlob) and
/// [`VirtualDirectory`](crate::VirtualDirectory)
#[derive(Debug, Error)]
pub enum VfsError {
    /// Caller supplied an unusable argument (empty path, negative range, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No folder exists at the virtual path
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// No file exists at the virtual path
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Backing source refuses reads
    #[error("source is not readable")]
    NotReadable,

    /// Backing source refuses seeks
    #[error("source is not seekable")]
    NotSeekable,

    /// Backing source ends before the declared range
    #[error("source too short: range ends at {required} but source holds {available} bytes")]
    RangeTooShort {
        /// End offset of the requested range
        required: u64,
        /// Length of the source
        available: u64,
    },

    /// Source delivered fewer bytes than declared
    #[error("unexpected end of stream: expected {expected} bytes, read {actual}")]
    UnexpectedEof {
        /// Declared byte count
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// Requested slice lies outside the blob
    #[error("range out of bounds: {start}+{len} exceeds blob size {size}")]
    OutOfRange {
        /// Slice start
        start: u64,
        /// Slice length
        len: u64,
        /// Blob size
        size: u64,
    },

    /// Async operation observed a cancelled token between chunks
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error from the source or destination
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VfsError {
    /// Check if this error reports a missing virtual path
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DirectoryNotFound(_) | Self::FileNotFound(_))
    }

    /// Check if this error comes from the backing source's capabilities
    pub fn is_stream_capability_error(&self) -> bool {
        matches!(
            self,
            Self::NotReadable | Self::NotSeekable | Self::RangeTooShort { .. }
        )
    }
}
