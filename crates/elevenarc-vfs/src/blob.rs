//! Lazily materialized byte ranges
//!
//! A [`LazyBlob`] describes one file payload. Blobs built from an in-memory
//! buffer are ready immediately; blobs built from a [`SharedSource`] only read
//! their `offset..offset + size` range on first use and keep the bytes until
//! [`LazyBlob::release`] is called.
//!
//! Loading is guarded by one state mutex per blob, shared by the blocking and
//! async entry points. A caller that finds the blob `Loading` waits for the
//! in-flight read instead of starting another, so concurrent first access
//! performs a single physical read sequence. Blocking callers park on a
//! condition variable; async callers await a [`Notify`] signalled at the same
//! points.
//!
//! Blocking accessors must not run on a runtime thread that an async load of
//! the same blob needs to make progress: on a current-thread runtime the
//! blocked thread would wait for a load that can never finish. Use
//! [`LazyBlob::load_async`] there, or call the blocking API from
//! `spawn_blocking`.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::io::Write;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::error::{VfsError, VfsResult};
use crate::source::{BlobSource, SharedSource, read_at, source_len};

/// Default chunk size for reads and copies (80 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 81920;

enum LoadState {
    Lazy,
    Loading,
    Ready(Bytes),
}

enum Claim<'a> {
    Ready,
    Busy,
    Acquired(LoadClaim<'a>),
}

/// Exclusive right to perform the physical read for one blob
///
/// Dropping an unfinished claim (error, cancellation, or a dropped future)
/// returns the blob to the lazy state and wakes waiters.
struct LoadClaim<'a> {
    blob: &'a LazyBlob,
    source: &'a SharedSource,
    finished: bool,
}

impl LoadClaim<'_> {
    fn finish(mut self, bytes: Bytes) {
        *self.blob.state.lock() = LoadState::Ready(bytes);
        self.finished = true;
        self.blob.wake();
    }
}

impl Drop for LoadClaim<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.blob.state.lock() = LoadState::Lazy;
            self.blob.wake();
        }
    }
}

/// A file payload that may or may not be in memory yet
pub struct LazyBlob {
    offset: u64,
    size: u64,
    source: Option<SharedSource>,
    chunk_size: usize,
    state: Mutex<LoadState>,
    ready: Condvar,
    ready_async: Notify,
}

impl LazyBlob {
    /// Create a blob whose content is already in memory
    pub fn new_eager(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            offset: 0,
            size: data.len() as u64,
            source: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            state: Mutex::new(LoadState::Ready(data)),
            ready: Condvar::new(),
            ready_async: Notify::new(),
        }
    }

    /// Create a blob backed by `size` bytes of `source` starting at `offset`
    ///
    /// Nothing is read until the content is requested.
    pub fn new_lazy(source: SharedSource, offset: u64, size: u64) -> VfsResult<Self> {
        if offset.checked_add(size).is_none() {
            return Err(VfsError::InvalidArgument(format!(
                "blob range {offset}+{size} overflows"
            )));
        }
        Ok(Self {
            offset,
            size,
            source: Some(source),
            chunk_size: DEFAULT_CHUNK_SIZE,
            state: Mutex::new(LoadState::Lazy),
            ready: Condvar::new(),
            ready_async: Notify::new(),
        })
    }

    /// Create a lazy blob from a signed range, rejecting negative values
    pub fn from_signed_range(source: SharedSource, offset: i64, size: i64) -> VfsResult<Self> {
        let offset = u64::try_from(offset)
            .map_err(|_| VfsError::InvalidArgument(format!("negative blob offset {offset}")))?;
        let size = u64::try_from(size)
            .map_err(|_| VfsError::InvalidArgument(format!("negative blob size {size}")))?;
        Self::new_lazy(source, offset, size)
    }

    /// Set the chunk size used for reads and copies
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset of the payload inside its source (zero for eager blobs)
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the content is currently held in memory
    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), LoadState::Ready(_))
    }

    /// Whether the blob is backed by a source and can be released
    pub fn is_lazy(&self) -> bool {
        self.source.is_some()
    }

    /// Load the content into memory if it is not there yet
    pub fn load(&self) -> VfsResult<()> {
        self.materialize().map(|_| ())
    }

    /// Full content, loading it first if needed
    pub fn bytes(&self) -> VfsResult<Bytes> {
        self.materialize()
    }

    /// Copy `len` bytes starting at `start` out of the blob
    pub fn get_range(&self, start: u64, len: u64) -> VfsResult<Bytes> {
        let out_of_range = VfsError::OutOfRange {
            start,
            len,
            size: self.size,
        };
        let end = match start.checked_add(len) {
            Some(end) if end <= self.size => end,
            _ => return Err(out_of_range),
        };
        let bytes = self.materialize()?;
        Ok(bytes.slice(start as usize..end as usize))
    }

    /// Drop cached content, returning a source-backed blob to the lazy state
    ///
    /// Eager blobs have nothing to reload from and keep their content.
    /// Returns whether anything was released.
    pub fn release(&self) -> bool {
        if self.source.is_none() {
            return false;
        }
        let mut state = self.state.lock();
        if matches!(*state, LoadState::Ready(_)) {
            *state = LoadState::Lazy;
            trace!(offset = self.offset, size = self.size, "released blob cache");
            true
        } else {
            false
        }
    }

    /// Write the content to `dest` using the blob's chunk size
    pub fn copy_to<W: Write + ?Sized>(&self, dest: &mut W) -> VfsResult<u64> {
        self.copy_to_with_chunk_size(dest, self.chunk_size)
    }

    /// Write the content to `dest`
    ///
    /// Cached content is written directly. Otherwise the range is streamed
    /// from the source chunk by chunk without populating the cache.
    pub fn copy_to_with_chunk_size<W: Write + ?Sized>(
        &self,
        dest: &mut W,
        chunk_size: usize,
    ) -> VfsResult<u64> {
        if let Some(bytes) = self.cached() {
            dest.write_all(&bytes)?;
            return Ok(self.size);
        }
        let source = self.source.as_ref().ok_or(VfsError::NotReadable)?;
        self.validate(source)?;

        let chunk_size = chunk_size.max(1);
        let mut buffer = vec![0u8; chunk_size.min(self.size as usize)];
        let mut copied = 0u64;
        while copied < self.size {
            let want = chunk_size.min((self.size - copied) as usize);
            let read = read_at(&mut **source.lock(), self.offset + copied, &mut buffer[..want])?;
            dest.write_all(&buffer[..read])?;
            copied += read as u64;
            if read < want {
                break;
            }
        }
        self.check_complete(copied)?;
        Ok(copied)
    }

    /// Async variant of [`LazyBlob::load`]
    ///
    /// Yields after every chunk and checks `cancel` between chunks. A
    /// cancelled load leaves the blob lazy and returns [`VfsError::Cancelled`].
    pub async fn load_async(&self, cancel: &CancellationToken) -> VfsResult<()> {
        let claim = loop {
            // registered before the state check so a wake in between is not lost
            let mut notified = std::pin::pin!(self.ready_async.notified());
            notified.as_mut().enable();
            match self.try_claim()? {
                Claim::Ready => return Ok(()),
                Claim::Busy => notified.await,
                Claim::Acquired(claim) => break claim,
            }
        };
        self.validate(claim.source)?;

        let size = self.buffer_len()?;
        let mut buffer = vec![0u8; size];
        let mut filled = 0usize;
        while filled < size {
            if cancel.is_cancelled() {
                debug!(offset = self.offset, "blob load cancelled");
                return Err(VfsError::Cancelled);
            }
            let end = size.min(filled + self.chunk_size);
            let want = end - filled;
            let read = read_at(
                &mut **claim.source.lock(),
                self.offset + filled as u64,
                &mut buffer[filled..end],
            )?;
            filled += read;
            if read < want {
                break;
            }
            tokio::task::yield_now().await;
        }
        self.check_complete(filled as u64)?;
        claim.finish(Bytes::from(buffer));
        Ok(())
    }

    /// Async variant of [`LazyBlob::copy_to_with_chunk_size`]
    pub async fn copy_to_async<W: AsyncWrite + Unpin + ?Sized>(
        &self,
        dest: &mut W,
        chunk_size: usize,
        cancel: &CancellationToken,
    ) -> VfsResult<u64> {
        let chunk_size = chunk_size.max(1);
        if let Some(bytes) = self.cached() {
            for chunk in bytes.chunks(chunk_size) {
                if cancel.is_cancelled() {
                    return Err(VfsError::Cancelled);
                }
                dest.write_all(chunk).await?;
            }
            return Ok(self.size);
        }
        let source = self.source.as_ref().ok_or(VfsError::NotReadable)?;
        self.validate(source)?;

        let mut buffer = vec![0u8; chunk_size.min(self.size as usize)];
        let mut copied = 0u64;
        while copied < self.size {
            if cancel.is_cancelled() {
                return Err(VfsError::Cancelled);
            }
            let want = chunk_size.min((self.size - copied) as usize);
            let read = read_at(&mut **source.lock(), self.offset + copied, &mut buffer[..want])?;
            dest.write_all(&buffer[..read]).await?;
            copied += read as u64;
            if read < want {
                break;
            }
        }
        self.check_complete(copied)?;
        Ok(copied)
    }

    fn cached(&self) -> Option<Bytes> {
        match &*self.state.lock() {
            LoadState::Ready(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    fn materialize(&self) -> VfsResult<Bytes> {
        let claim = {
            let mut state = self.state.lock();
            loop {
                if let LoadState::Ready(bytes) = &*state {
                    return Ok(bytes.clone());
                }
                if matches!(*state, LoadState::Lazy) {
                    break;
                }
                self.ready.wait(&mut state);
            }
            let source = self.source.as_ref().ok_or(VfsError::NotReadable)?;
            *state = LoadState::Loading;
            LoadClaim {
                blob: self,
                source,
                finished: false,
            }
        };

        let bytes = self.read_blocking(claim.source)?;
        claim.finish(bytes.clone());
        Ok(bytes)
    }

    fn try_claim(&self) -> VfsResult<Claim<'_>> {
        let mut state = self.state.lock();
        if matches!(*state, LoadState::Ready(_)) {
            return Ok(Claim::Ready);
        }
        if matches!(*state, LoadState::Loading) {
            return Ok(Claim::Busy);
        }
        let source = self.source.as_ref().ok_or(VfsError::NotReadable)?;
        *state = LoadState::Loading;
        Ok(Claim::Acquired(LoadClaim {
            blob: self,
            source,
            finished: false,
        }))
    }

    fn wake(&self) {
        self.ready.notify_all();
        self.ready_async.notify_waiters();
    }

    fn read_blocking(&self, source: &SharedSource) -> VfsResult<Bytes> {
        self.validate(source)?;
        let size = self.buffer_len()?;
        let mut buffer = vec![0u8; size];
        let mut filled = 0usize;
        while filled < size {
            let end = size.min(filled + self.chunk_size);
            let want = end - filled;
            let read = read_at(
                &mut **source.lock(),
                self.offset + filled as u64,
                &mut buffer[filled..end],
            )?;
            filled += read;
            if read < want {
                break;
            }
        }
        self.check_complete(filled as u64)?;
        debug!(offset = self.offset, size = self.size, "loaded blob");
        Ok(Bytes::from(buffer))
    }

    fn validate(&self, source: &SharedSource) -> VfsResult<()> {
        let mut guard = source.lock();
        let source: &mut dyn BlobSource = &mut **guard;
        if !source.can_read() {
            return Err(VfsError::NotReadable);
        }
        if !source.can_seek() {
            return Err(VfsError::NotSeekable);
        }
        let available = source_len(source)?;
        let required = self.offset + self.size;
        if available < required {
            return Err(VfsError::RangeTooShort {
                required,
                available,
            });
        }
        Ok(())
    }

    fn buffer_len(&self) -> VfsResult<usize> {
        usize::try_from(self.size).map_err(|_| {
            VfsError::InvalidArgument(format!("blob of {} bytes does not fit in memory", self.size))
        })
    }

    fn check_complete(&self, actual: u64) -> VfsResult<()> {
        if actual < self.size {
            return Err(VfsError::UnexpectedEof {
                expected: self.size,
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for LazyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyBlob")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("lazy", &self.is_lazy())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::source::share;
    use std::io::{Cursor, Read, Seek, SeekFrom};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts every `read` call reaching the underlying buffer
    struct CountingSource {
        inner: Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    impl Seek for CountingSource {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl BlobSource for CountingSource {}

    struct RestrictedSource {
        inner: Cursor<Vec<u8>>,
        readable: bool,
        seekable: bool,
    }

    impl Read for RestrictedSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for RestrictedSource {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl BlobSource for RestrictedSource {
        fn can_read(&self) -> bool {
            self.readable
        }

        fn can_seek(&self) -> bool {
            self.seekable
        }
    }

    /// Reports a longer length than it can deliver
    struct TruncatedSource {
        inner: Cursor<Vec<u8>>,
        claimed_len: u64,
    }

    impl Read for TruncatedSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for TruncatedSource {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            match pos {
                SeekFrom::End(delta) => {
                    let position = self.claimed_len.saturating_add_signed(delta);
                    self.inner.set_position(position);
                    Ok(position)
                }
                other => self.inner.seek(other),
            }
        }
    }

    impl BlobSource for TruncatedSource {}

    fn counting(data: Vec<u8>) -> (SharedSource, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = share(CountingSource {
            inner: Cursor::new(data),
            reads: Arc::clone(&reads),
        });
        (source, reads)
    }

    #[test]
    fn eager_blob_is_ready() {
        let blob = LazyBlob::new_eager(b"hello".to_vec());
        assert_eq!(blob.size(), 5);
        assert!(blob.is_loaded());
        assert!(!blob.is_lazy());
        assert_eq!(&blob.bytes().unwrap()[..], b"hello");
        assert!(!blob.release());
        assert!(blob.is_loaded());
    }

    #[test]
    fn lazy_blob_reads_its_range() {
        let source = share(Cursor::new(b"0123456789".to_vec()));
        let blob = LazyBlob::new_lazy(source, 3, 4).unwrap();
        assert!(!blob.is_loaded());
        assert_eq!(&blob.bytes().unwrap()[..], b"3456");
        assert!(blob.is_loaded());
    }

    #[test]
    fn negative_signed_range_is_rejected() {
        let source = share(Cursor::new(vec![0u8; 4]));
        assert!(matches!(
            LazyBlob::from_signed_range(Arc::clone(&source), -1, 2),
            Err(VfsError::InvalidArgument(_))
        ));
        assert!(matches!(
            LazyBlob::from_signed_range(source, 0, -2),
            Err(VfsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn repeated_load_reads_once() {
        let (source, reads) = counting(vec![7u8; 64]);
        let blob = LazyBlob::new_lazy(source, 8, 16).unwrap();
        for _ in 0..5 {
            blob.load().unwrap();
        }
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_access_reads_once() {
        let (source, reads) = counting((0..=255).collect());
        let blob = LazyBlob::new_lazy(source, 0, 256).unwrap();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let bytes = blob.bytes().unwrap();
                    assert_eq!(bytes.len(), 256);
                });
            }
        });
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chunked_load_assembles_full_range() {
        let data: Vec<u8> = (0..100).collect();
        let source = share(Cursor::new(data.clone()));
        let blob = LazyBlob::new_lazy(source, 10, 50)
            .unwrap()
            .with_chunk_size(7);
        assert_eq!(&blob.bytes().unwrap()[..], &data[10..60]);
    }

    #[test]
    fn release_then_reload() {
        let (source, reads) = counting(b"abcdef".to_vec());
        let blob = LazyBlob::new_lazy(source, 0, 6).unwrap();
        blob.load().unwrap();
        assert!(blob.release());
        assert!(!blob.is_loaded());
        assert_eq!(&blob.bytes().unwrap()[..], b"abcdef");
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn range_past_source_end_is_too_short() {
        let source = share(Cursor::new(vec![0u8; 8]));
        let blob = LazyBlob::new_lazy(source, 4, 8).unwrap();
        let err = blob.load().unwrap_err();
        assert!(matches!(
            err,
            VfsError::RangeTooShort {
                required: 12,
                available: 8
            }
        ));
        assert!(!blob.is_loaded());
    }

    #[test]
    fn short_delivery_is_unexpected_eof() {
        let source = share(TruncatedSource {
            inner: Cursor::new(vec![1u8; 4]),
            claimed_len: 100,
        });
        let blob = LazyBlob::new_lazy(source, 0, 10).unwrap();
        let err = blob.load().unwrap_err();
        assert!(matches!(
            err,
            VfsError::UnexpectedEof {
                expected: 10,
                actual: 4
            }
        ));
        // A failed load leaves the blob retryable
        assert!(matches!(blob.load(), Err(VfsError::UnexpectedEof { .. })));
    }

    #[test]
    fn capability_errors() {
        let unreadable = share(RestrictedSource {
            inner: Cursor::new(vec![0u8; 4]),
            readable: false,
            seekable: true,
        });
        let blob = LazyBlob::new_lazy(unreadable, 0, 4).unwrap();
        assert!(matches!(blob.load(), Err(VfsError::NotReadable)));

        let unseekable = share(RestrictedSource {
            inner: Cursor::new(vec![0u8; 4]),
            readable: true,
            seekable: false,
        });
        let blob = LazyBlob::new_lazy(unseekable, 0, 4).unwrap();
        let err = blob.load().unwrap_err();
        assert!(err.is_stream_capability_error());
        assert!(matches!(err, VfsError::NotSeekable));
    }

    #[test]
    fn get_range_bounds() {
        let blob = LazyBlob::new_eager(b"abcdef".to_vec());
        assert_eq!(&blob.get_range(2, 3).unwrap()[..], b"cde");
        assert_eq!(&blob.get_range(6, 0).unwrap()[..], b"");
        assert!(matches!(
            blob.get_range(4, 3),
            Err(VfsError::OutOfRange {
                start: 4,
                len: 3,
                size: 6
            })
        ));
        assert!(matches!(
            blob.get_range(u64::MAX, 2),
            Err(VfsError::OutOfRange { .. })
        ));
    }

    #[test]
    fn copy_to_streams_without_caching() {
        let (source, _) = counting((0..64).collect());
        let blob = LazyBlob::new_lazy(source, 16, 32).unwrap();
        let mut out = Vec::new();
        let copied = blob.copy_to_with_chunk_size(&mut out, 5).unwrap();
        assert_eq!(copied, 32);
        assert_eq!(out, (16..48).collect::<Vec<u8>>());
        assert!(!blob.is_loaded());
    }

    #[test]
    fn copy_to_uses_cache_when_loaded() {
        let (source, reads) = counting(b"payload".to_vec());
        let blob = LazyBlob::new_lazy(source, 0, 7).unwrap();
        blob.load().unwrap();
        let mut out = Vec::new();
        blob.copy_to(&mut out).unwrap();
        assert_eq!(out, b"payload");
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_load_shares_state_with_sync_path() {
        let (source, reads) = counting(b"async bytes".to_vec());
        let blob = LazyBlob::new_lazy(source, 0, 11)
            .unwrap()
            .with_chunk_size(3);
        let cancel = CancellationToken::new();
        blob.load_async(&cancel).await.unwrap();
        assert!(blob.is_loaded());
        let before = reads.load(Ordering::SeqCst);
        blob.load().unwrap();
        blob.load_async(&cancel).await.unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), before);
        assert_eq!(&blob.bytes().unwrap()[..], b"async bytes");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn mixed_sync_and_async_first_access_reads_once() {
        let (source, reads) = counting((0..=255).collect());
        let blob = Arc::new(LazyBlob::new_lazy(source, 0, 256).unwrap().with_chunk_size(256));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let blob = Arc::clone(&blob);
                tokio::spawn(async move { blob.load_async(&CancellationToken::new()).await })
            })
            .collect();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let blob = Arc::clone(&blob);
                std::thread::spawn(move || blob.bytes().map(|bytes| bytes.len()))
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        for thread in threads {
            assert_eq!(thread.join().unwrap().unwrap(), 256);
        }
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(&blob.bytes().unwrap()[..3], &[0, 1, 2]);
    }

    #[tokio::test]
    async fn async_waiter_wakes_when_blocking_load_finishes() {
        let (source, reads) = counting(vec![5u8; 32]);
        let blob = Arc::new(LazyBlob::new_lazy(source, 0, 32).unwrap());

        // hold the claim from another thread while the async caller waits
        let gate = Arc::new(std::sync::Barrier::new(2));
        let holder = {
            let blob = Arc::clone(&blob);
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || {
                let claim = match blob.try_claim().unwrap() {
                    Claim::Acquired(claim) => claim,
                    _ => panic!("blob should be lazy"),
                };
                gate.wait();
                std::thread::sleep(std::time::Duration::from_millis(20));
                let bytes = blob.read_blocking(claim.source).unwrap();
                claim.finish(bytes);
            })
        };
        gate.wait();
        assert!(!blob.is_loaded());
        blob.load_async(&CancellationToken::new()).await.unwrap();
        assert!(blob.is_loaded());
        holder.join().unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_async_load_stays_lazy() {
        let source = share(Cursor::new(vec![3u8; 32]));
        let blob = LazyBlob::new_lazy(source, 0, 32).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            blob.load_async(&cancel).await,
            Err(VfsError::Cancelled)
        ));
        assert!(!blob.is_loaded());
        blob.load().unwrap();
        assert!(blob.is_loaded());
    }

    #[tokio::test]
    async fn async_copy_streams_chunks() {
        let source = share(Cursor::new((0..40).collect::<Vec<u8>>()));
        let blob = LazyBlob::new_lazy(source, 4, 20).unwrap();
        let mut out: Vec<u8> = Vec::new();
        let copied = blob
            .copy_to_async(&mut out, 6, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(copied, 20);
        assert_eq!(out, (4..24).collect::<Vec<u8>>());
        assert!(!blob.is_loaded());
    }
}
