//! In-memory filesystem layer for Level-5 style game archives
//!
//! This crate holds the archive-independent half of the ARC0 tooling: file
//! payloads that are only read from their backing source when needed, and a
//! folder tree that codecs populate on read and flatten on write.
//!
//! # Components
//!
//! - **[`LazyBlob`]**: a byte range that is either already in memory or backed
//!   by a seekable [`BlobSource`]. Loads once, even under concurrent first
//!   access, and can be released back to the lazy state.
//! - **[`VirtualDirectory`]**: a tree of named folders owning files. Provides
//!   path resolution, recursive flattening, a rebuildable search index and
//!   bulk operations that fan out with rayon above configurable thresholds.
//! - **[`VfsConfig`]**: chunk size and parallelism thresholds.
//!
//! # Example
//!
//! ```
//! use elevenarc_vfs::{LazyBlob, VirtualDirectory};
//!
//! let mut root = VirtualDirectory::root();
//! root.get_or_create_folder("data/menu")
//!     .add_file("title.bin", LazyBlob::new_eager(vec![1, 2, 3]));
//!
//! let bytes = root.resolve_file("data/menu/title.bin")?;
//! assert_eq!(&bytes[..], &[1, 2, 3]);
//! assert_eq!(root.total_size(), 3);
//! # Ok::<(), elevenarc_vfs::VfsError>(())
//! ```

#![warn(missing_docs)]

pub mod blob;
pub mod cancel;
pub mod config;
pub mod directory;
pub mod error;
mod index;
pub mod source;

pub use blob::{DEFAULT_CHUNK_SIZE, LazyBlob};
pub use cancel::CancellationToken;
pub use config::{ParallelPolicy, ParallelThresholds, VfsConfig};
pub use directory::{IndexState, SearchHit, VirtualDirectory};
pub use error::{VfsError, VfsResult};
pub use source::{BlobSource, SharedSource, share};
