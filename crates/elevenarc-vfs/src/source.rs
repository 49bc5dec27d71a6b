//! Seekable byte sources backing lazy blobs

use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

/// A readable, seekable byte source
///
/// Capability probes default to `true`; wrappers around handles that may be
/// opened write-only or as pipes override them so blob loads fail with
/// [`VfsError::NotReadable`](crate::VfsError::NotReadable) or
/// [`VfsError::NotSeekable`](crate::VfsError::NotSeekable) instead of an
/// opaque I/O error.
pub trait BlobSource: Read + Seek + Send {
    /// Whether the source accepts reads
    fn can_read(&self) -> bool {
        true
    }

    /// Whether the source accepts seeks
    fn can_seek(&self) -> bool {
        true
    }
}

impl<T: AsRef<[u8]> + Send> BlobSource for Cursor<T> {}

impl BlobSource for File {}

/// Source shared by every blob pointing into the same archive
pub type SharedSource = Arc<Mutex<Box<dyn BlobSource>>>;

/// Wrap a source so several blobs can read from it
pub fn share<S: BlobSource + 'static>(source: S) -> SharedSource {
    Arc::new(Mutex::new(Box::new(source)))
}

/// Total length of the source, leaving the position unchanged
pub(crate) fn source_len(source: &mut dyn BlobSource) -> io::Result<u64> {
    let current = source.stream_position()?;
    let end = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(current))?;
    Ok(end)
}

/// Read into `buf` starting at `position` until it is full or the source ends
pub(crate) fn read_at(
    source: &mut dyn BlobSource,
    position: u64,
    buf: &mut [u8],
) -> io::Result<usize> {
    source.seek(SeekFrom::Start(position))?;
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
