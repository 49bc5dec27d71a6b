//! Configuration for blob reads and parallel bulk operations

use serde::{Deserialize, Serialize};

use crate::blob::DEFAULT_CHUNK_SIZE;

/// Folder sizes above which bulk operations fan out with rayon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelThresholds {
    /// `total_size` sums a folder's files in parallel above this many files
    pub size_files: usize,
    /// `total_size` recurses into subfolders in parallel above this many subfolders
    pub size_folders: usize,
    /// `sort_alphabetically` recurses in parallel above this many subfolders
    pub sort_folders: usize,
}

impl Default for ParallelThresholds {
    fn default() -> Self {
        Self {
            size_files: 100,
            size_folders: 1,
            sort_folders: 10,
        }
    }
}

/// Strategy used by bulk operations on a [`VirtualDirectory`](crate::VirtualDirectory)
///
/// Every policy yields the same result; they only differ in scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelPolicy {
    /// Never fan out
    Sequential,
    /// Always fan out, regardless of folder size
    Parallel,
    /// Fan out only where a folder exceeds the thresholds
    Threshold(ParallelThresholds),
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self::Threshold(ParallelThresholds::default())
    }
}

impl ParallelPolicy {
    pub(crate) fn sum_files_in_parallel(self, file_count: usize) -> bool {
        match self {
            Self::Sequential => false,
            Self::Parallel => true,
            Self::Threshold(t) => file_count > t.size_files,
        }
    }

    pub(crate) fn sum_folders_in_parallel(self, folder_count: usize) -> bool {
        match self {
            Self::Sequential => false,
            Self::Parallel => true,
            Self::Threshold(t) => folder_count > t.size_folders,
        }
    }

    pub(crate) fn sort_in_parallel(self, folder_count: usize) -> bool {
        match self {
            Self::Sequential => false,
            Self::Parallel => true,
            Self::Threshold(t) => folder_count > t.sort_folders,
        }
    }
}

/// Configuration for the virtual filesystem layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Chunk size used when reading lazy blobs from their source
    pub read_chunk_size: usize,

    /// Parallelism thresholds for bulk operations
    pub parallel: ParallelThresholds,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: ParallelThresholds::default(),
        }
    }
}

impl VfsConfig {
    /// Set the chunk size for lazy reads (zero is clamped to one byte)
    #[must_use]
    pub const fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = if size == 0 { 1 } else { size };
        self
    }

    /// Set the parallelism thresholds
    #[must_use]
    pub const fn with_parallel_thresholds(mut self, thresholds: ParallelThresholds) -> Self {
        self.parallel = thresholds;
        self
    }

    /// Policy derived from the configured thresholds
    pub const fn policy(&self) -> ParallelPolicy {
        ParallelPolicy::Threshold(self.parallel)
    }
}
