//! ARC0 archive format
//!
//! ARC0 packs a folder tree into one file: a fixed 0x48-byte header, four
//! independently compressed table blocks and a raw payload region.
//!
//! # Layout
//!
//! - **Directory entries**: one 20-byte record per folder, sorted by the CRC32
//!   of the folder path. `first_dir_index` is the running sum of subfolder
//!   counts in that order.
//! - **Directory hashes**: the same CRC32 values as a bare `u32` array.
//! - **File entries**: 16-byte records grouped per folder. Names and payload
//!   offsets are assigned in name order; each group is then sorted by CRC32.
//! - **Names**: null-terminated Shift_JIS strings. Hashes are taken over the
//!   UTF-8 form of the same names.
//! - **Payload**: file content, each file starting on a 4-byte boundary.
//!
//! Every table block is 4-byte aligned and starts with the wrapper header from
//! [`compression`](crate::compression).

mod entry;
mod error;
mod header;
mod reader;
mod writer;

pub use entry::{DirectoryEntry, FileEntry};
pub use error::{Arc0Error, Arc0Result};
pub use header::{ARC0_MAGIC, Arc0Header, HEADER_SIZE};
pub use reader::{Arc0Reader, Arc0Tables, from_bytes, read};
pub use writer::{
    Arc0Layout, Arc0WriteOptions, align4, to_bytes, to_bytes_with_options, write,
    write_to_path, write_to_path_with_options, write_with_options,
};

use elevenarc_vfs::{BlobSource, SharedSource, VfsConfig, VirtualDirectory, share};
use std::fs::File;
use std::path::Path;
use tracing::debug;

use crate::Archive;

/// An ARC0 archive: a name, its namespace and the source it was read from
pub struct Arc0Archive {
    name: String,
    root: VirtualDirectory,
    source: Option<SharedSource>,
    options: Arc0WriteOptions,
}

impl Arc0Archive {
    /// Create an empty archive
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: VirtualDirectory::root(),
            source: None,
            options: Arc0WriteOptions::default(),
        }
    }

    /// Read an archive from `source`
    pub fn open<S: BlobSource + 'static>(name: impl Into<String>, source: S) -> Arc0Result<Self> {
        Self::open_shared(name, share(source), &VfsConfig::default())
    }

    /// Read an archive from an already shared source
    pub fn open_shared(
        name: impl Into<String>,
        source: SharedSource,
        config: &VfsConfig,
    ) -> Arc0Result<Self> {
        let reader = Arc0Reader::with_config(source, config)?;
        let root = reader.read_directory()?;
        Ok(Self {
            name: name.into(),
            root,
            source: Some(reader.source().clone()),
            options: Arc0WriteOptions::default(),
        })
    }

    /// Open the archive file at `path`, reading payloads from it on demand
    pub fn open_path(path: impl AsRef<Path>) -> Arc0Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Arc0Error::InvalidArgument(format!("{} does not name a file", path.display()))
            })?;
        let file = File::open(path)?;
        debug!(path = %path.display(), "opening ARC0 archive");
        Self::open(name, file)
    }

    /// Write options used by [`Archive::save`]
    #[must_use]
    pub fn with_options(mut self, options: Arc0WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether payloads are still read from a backing source
    pub fn is_source_backed(&self) -> bool {
        self.source.is_some()
    }
}

impl std::fmt::Debug for Arc0Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arc0Archive")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("source_backed", &self.source.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl Archive for Arc0Archive {
    type Error = Arc0Error;

    fn name(&self) -> &str {
        &self.name
    }

    fn directory(&self) -> &VirtualDirectory {
        &self.root
    }

    fn directory_mut(&mut self) -> &mut VirtualDirectory {
        &mut self.root
    }

    fn save(&mut self, path: Option<&Path>) -> Arc0Result<Option<Vec<u8>>> {
        match path {
            None => to_bytes_with_options(&self.root, &self.options).map(Some),
            Some(path) => {
                write_to_path_with_options(&self.root, path, &self.options)?;
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        let released = self.root.release_all();
        self.root = VirtualDirectory::root();
        self.source = None;
        debug!(archive = %self.name, released, "closed ARC0 archive");
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use elevenarc_vfs::LazyBlob;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn save_to_memory_and_reopen() {
        let mut archive = Arc0Archive::new("menu.arc");
        archive
            .directory_mut()
            .get_or_create_folder("menu")
            .add_file("title.bin", LazyBlob::new_eager(b"title".to_vec()));

        let bytes = archive.save(None).unwrap().unwrap();
        let reopened = Arc0Archive::open("menu.arc", Cursor::new(bytes)).unwrap();
        assert_eq!(reopened.name(), "menu.arc");
        assert!(reopened.is_source_backed());
        assert_eq!(
            &reopened.directory().resolve_file("menu/title.bin").unwrap()[..],
            b"title"
        );
    }

    #[test]
    fn close_drops_namespace() {
        let mut archive = Arc0Archive::new("x.arc");
        archive
            .directory_mut()
            .add_file("a", LazyBlob::new_eager(b"a".to_vec()));
        let bytes = archive.save(None).unwrap().unwrap();

        let mut reopened = Arc0Archive::open("x.arc", Cursor::new(bytes)).unwrap();
        reopened.directory().resolve_file("a").unwrap();
        reopened.close();
        assert!(!reopened.is_source_backed());
        assert_eq!(reopened.directory().file_count(), 0);
    }

    #[test]
    fn save_rejects_empty_path() {
        let mut archive = Arc0Archive::new("x.arc");
        assert!(matches!(
            archive.save(Some(Path::new(""))),
            Err(Arc0Error::InvalidArgument(_))
        ));
    }
}
