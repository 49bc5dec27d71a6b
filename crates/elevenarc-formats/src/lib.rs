//! Archive codecs for Level-5 style game containers
//!
#![allow(clippy::cast_possible_truncation)] // Table fields are narrower than usize
#![allow(clippy::cast_possible_wrap)] // Counts are range checked before narrowing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
//! This crate reads and writes ARC0 archives on top of the in-memory namespace
//! from [`elevenarc_vfs`].
//!
//! # Modules
//!
//! - **[`crc32`]**: name hashing used as the lookup key in every table
//! - **[`compression`]**: wrapper header and pluggable table block compression
//! - **[`arc0`]**: ARC0 records, writer, reader and [`arc0::Arc0Archive`]
//!
//! # Example
//!
//! ```
//! use elevenarc_formats::arc0;
//! use elevenarc_vfs::{LazyBlob, VirtualDirectory};
//!
//! let mut root = VirtualDirectory::root();
//! root.add_folder("a").add_file("x.txt", LazyBlob::new_eager(b"hi".to_vec()));
//!
//! let bytes = arc0::to_bytes(&root)?;
//! assert_eq!(&bytes[..4], b"ARC0");
//!
//! let restored = arc0::from_bytes(bytes)?;
//! assert_eq!(&restored.resolve_file("a/x.txt")?[..], b"hi");
//! # Ok::<(), arc0::Arc0Error>(())
//! ```

#![warn(missing_docs)]

pub mod arc0;
pub mod compression;
pub mod crc32;

use elevenarc_vfs::VirtualDirectory;
use std::path::Path;

/// Common contract of archive containers
pub trait Archive {
    /// Error type of the container's codec
    type Error: std::error::Error + Send + Sync + 'static;

    /// Archive name, usually its file name
    fn name(&self) -> &str;

    /// Namespace held by the archive
    fn directory(&self) -> &VirtualDirectory;

    /// Mutable namespace held by the archive
    fn directory_mut(&mut self) -> &mut VirtualDirectory;

    /// Serialize the archive
    ///
    /// With a path the archive is written there and `None` is returned;
    /// without one the encoded bytes are returned.
    fn save(&mut self, path: Option<&Path>) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Release cached payloads and drop the namespace
    fn close(&mut self);
}
