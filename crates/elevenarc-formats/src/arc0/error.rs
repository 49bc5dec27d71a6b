//! ARC0 error types

use elevenarc_vfs::VfsError;
use thiserror::Error;

use crate::compression::CompressionError;

/// ARC0 operation result type
pub type Arc0Result<T> = Result<T, Arc0Error>;

/// Errors raised while reading or writing ARC0 archives
#[derive(Debug, Error)]
pub enum Arc0Error {
    /// Caller supplied an unusable argument or a namespace the format cannot hold
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Magic mismatch, even after unwrapping a compressed container
    #[error("invalid ARC0 magic: 0x{0:08X}")]
    InvalidMagic(u32),

    /// Structurally inconsistent archive
    #[error("invalid ARC0 archive: {0}")]
    InvalidFormat(String),

    /// Table block extends past the end of the archive
    #[error("{table} table truncated: needs {required} bytes at 0x{offset:X}, archive is {available} bytes")]
    TruncatedTable {
        /// Name of the table
        table: &'static str,
        /// Table offset from the header
        offset: u64,
        /// Bytes the table requires from its offset
        required: u64,
        /// Total archive length
        available: u64,
    },

    /// Name not representable in Shift_JIS
    #[error("name cannot be encoded as Shift_JIS: {0}")]
    UnencodableName(String),

    /// Namespace or blob error
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// Table block compression error
    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Arc0Error {
    /// Check if the archive bytes themselves are bad
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic(_)
                | Self::InvalidFormat(_)
                | Self::TruncatedTable { .. }
                | Self::Compression(_)
                | Self::BinRw(_)
        )
    }

    /// Check if a virtual path lookup missed
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Vfs(e) if e.is_not_found())
    }
}
