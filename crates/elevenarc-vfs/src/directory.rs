//! Hierarchical in-memory namespace of folders and lazy blobs
//!
//! Paths are `/`-separated; empty segments are ignored, so `"a/b"`,
//! `"/a/b/"` and `"a//b"` name the same folder. Folder and file order is
//! insertion order everywhere (resolution, flattening, archive writing).
//!
//! A parent owns its children outright. Nodes of one tree share a tree
//! revision counter instead of pointing back at their parent: any structural
//! change below a folder bumps the counter, which marks every search index in
//! the tree stale. Moving a subtree into another tree re-binds it to the new
//! tree's counter.

use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::blob::LazyBlob;
use crate::config::ParallelPolicy;
use crate::error::{VfsError, VfsResult};
use crate::index::SearchIndex;

/// Freshness of a folder's search index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// The index matches the tree
    Fresh,
    /// The tree changed since the index was built, or it was never built
    Stale,
}

/// A search result borrowed from the tree
#[derive(Debug)]
pub struct SearchHit<'a, T> {
    /// Full path relative to the searched folder (`/a/b/` or `/a/file.bin`)
    pub path: String,
    /// The matching folder or blob
    pub item: &'a T,
}

/// A named folder owning subfolders and files
pub struct VirtualDirectory {
    name: String,
    folders: Vec<VirtualDirectory>,
    files: IndexMap<String, LazyBlob>,
    revision: Arc<AtomicU64>,
    child_cache: Mutex<HashMap<String, usize>>,
    index: RwLock<Option<SearchIndex>>,
    policy: ParallelPolicy,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn path_prefix(base_path: &str) -> String {
    let mut prefix = String::from("/");
    for segment in segments(base_path) {
        prefix.push_str(segment);
        prefix.push('/');
    }
    prefix
}

impl VirtualDirectory {
    /// Create an unnamed root folder
    pub fn root() -> Self {
        Self::new("")
    }

    /// Create a detached folder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            folders: Vec::new(),
            files: IndexMap::new(),
            revision: Arc::new(AtomicU64::new(0)),
            child_cache: Mutex::new(HashMap::new()),
            index: RwLock::new(None),
            policy: ParallelPolicy::default(),
        }
    }

    /// Scheduling policy used by [`total_size`](Self::total_size) and
    /// [`sort_alphabetically`](Self::sort_alphabetically)
    pub fn parallel_policy(&self) -> ParallelPolicy {
        self.policy
    }

    /// Set the scheduling policy for this folder and everything below it
    ///
    /// Folders created or moved under this one later adopt it as well.
    pub fn set_parallel_policy(&mut self, policy: ParallelPolicy) {
        let revision = Arc::clone(&self.revision);
        self.rebind(&revision, policy);
    }

    /// Folder name (may itself contain `/` until [`reorganize`](Self::reorganize) runs)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct subfolders in insertion order
    pub fn folders(&self) -> &[VirtualDirectory] {
        &self.folders
    }

    /// Direct files in insertion order
    pub fn files(&self) -> impl ExactSizeIterator<Item = (&str, &LazyBlob)> {
        self.files.iter().map(|(name, blob)| (name.as_str(), blob))
    }

    /// Direct file by name
    pub fn file(&self, name: &str) -> Option<&LazyBlob> {
        self.files.get(name)
    }

    /// Add or replace a file, returning the blob it replaced
    pub fn add_file(&mut self, name: impl Into<String>, blob: LazyBlob) -> Option<LazyBlob> {
        let previous = self.files.insert(name.into(), blob);
        self.touch();
        previous
    }

    /// Remove a direct file, keeping the order of the remaining files
    pub fn remove_file(&mut self, name: &str) -> Option<LazyBlob> {
        let removed = self.files.shift_remove(name);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Append a new empty subfolder and return it
    pub fn add_folder(&mut self, name: impl Into<String>) -> &mut VirtualDirectory {
        self.add_directory(Self::new(name))
    }

    /// Move a folder (and its subtree) under this one and return it
    pub fn add_directory(&mut self, mut folder: VirtualDirectory) -> &mut VirtualDirectory {
        folder.rebind(&self.revision, self.policy);
        self.folders.push(folder);
        self.touch();
        let last = self.folders.len() - 1;
        &mut self.folders[last]
    }

    /// Detach the first direct subfolder called `name`
    pub fn remove_folder(&mut self, name: &str) -> Option<VirtualDirectory> {
        let position = self.folders.iter().position(|f| f.name == name)?;
        let mut removed = self.folders.remove(position);
        let policy = removed.policy;
        removed.rebind(&Arc::new(AtomicU64::new(0)), policy);
        self.touch();
        Some(removed)
    }

    /// Direct subfolder by name (first match)
    ///
    /// Resolutions are cached until the next structural change.
    pub fn get_folder(&self, name: &str) -> Option<&VirtualDirectory> {
        let mut cache = self.child_cache.lock();
        let position = match cache.get(name).copied() {
            Some(position) => position,
            None => {
                let position = self.folders.iter().position(|f| f.name == name)?;
                cache.insert(name.to_owned(), position);
                position
            }
        };
        self.folders.get(position)
    }

    /// Mutable direct subfolder by name (first match)
    pub fn get_folder_mut(&mut self, name: &str) -> Option<&mut VirtualDirectory> {
        let cache = self.child_cache.get_mut();
        let position = match cache.get(name).copied() {
            Some(position) => position,
            None => {
                let position = self.folders.iter().position(|f| f.name == name)?;
                cache.insert(name.to_owned(), position);
                position
            }
        };
        self.folders.get_mut(position)
    }

    /// Folder at `path` below this one
    pub fn resolve_folder(&self, path: &str) -> VfsResult<&VirtualDirectory> {
        let mut current = self;
        for segment in segments(path) {
            current = current
                .get_folder(segment)
                .ok_or_else(|| VfsError::DirectoryNotFound(path.to_owned()))?;
        }
        Ok(current)
    }

    /// Mutable folder at `path` below this one
    pub fn resolve_folder_mut(&mut self, path: &str) -> VfsResult<&mut VirtualDirectory> {
        let mut current = self;
        for segment in segments(path) {
            current = current
                .get_folder_mut(segment)
                .ok_or_else(|| VfsError::DirectoryNotFound(path.to_owned()))?;
        }
        Ok(current)
    }

    /// Blob at `path` without loading it
    pub fn resolve_blob(&self, path: &str) -> VfsResult<&LazyBlob> {
        let parts: Vec<&str> = segments(path).collect();
        let Some((name, parents)) = parts.split_last() else {
            return Err(VfsError::InvalidArgument("empty file path".to_owned()));
        };
        let mut folder = self;
        for segment in parents {
            folder = folder
                .get_folder(segment)
                .ok_or_else(|| VfsError::FileNotFound(path.to_owned()))?;
        }
        folder
            .files
            .get(*name)
            .ok_or_else(|| VfsError::FileNotFound(path.to_owned()))
    }

    /// Content of the file at `path`, loading it if needed
    pub fn resolve_file(&self, path: &str) -> VfsResult<Bytes> {
        self.resolve_blob(path)?.bytes()
    }

    /// Folder at `path`, creating missing segments
    pub fn get_or_create_folder(&mut self, path: &str) -> &mut VirtualDirectory {
        let mut current = self;
        for segment in segments(path) {
            current = current.child_or_create(segment);
        }
        current
    }

    /// Every folder keyed by its path, parents before children
    ///
    /// The folder itself is keyed `/`, descendants `/a/`, `/a/b/`. When two
    /// siblings share a name only the first is kept, matching resolution.
    pub fn flatten_folders(&self) -> IndexMap<String, &VirtualDirectory> {
        let mut flattened = IndexMap::new();
        for (path, folder) in self.walk() {
            flattened.entry(path).or_insert(folder);
        }
        flattened
    }

    /// Every file keyed by its path (`/a/b/file.bin`)
    pub fn flatten_files(&self) -> IndexMap<String, &LazyBlob> {
        let mut flattened = IndexMap::new();
        for (path, folder) in self.walk() {
            for (name, blob) in &folder.files {
                flattened.entry(format!("{path}{name}")).or_insert(blob);
            }
        }
        flattened
    }

    /// Pre-order traversal with an explicit stack, keeping duplicate paths
    pub fn walk(&self) -> Vec<(String, &VirtualDirectory)> {
        let mut visited = Vec::new();
        let mut stack = vec![("/".to_owned(), self)];
        while let Some((path, folder)) = stack.pop() {
            for child in folder.folders.iter().rev() {
                stack.push((format!("{path}{}/", child.name), child));
            }
            visited.push((path, folder));
        }
        visited
    }

    /// Number of files in the subtree
    pub fn file_count(&self) -> usize {
        self.walk().iter().map(|(_, folder)| folder.files.len()).sum()
    }

    /// Number of folders below this one
    pub fn folder_count(&self) -> usize {
        self.walk().len() - 1
    }

    /// Sum of every file size in the subtree, scheduled by the folder's policy
    pub fn total_size(&self) -> u64 {
        self.total_size_with(self.policy)
    }

    /// [`total_size`](Self::total_size) with an explicit scheduling policy
    pub fn total_size_with(&self, policy: ParallelPolicy) -> u64 {
        let files: u64 = if policy.sum_files_in_parallel(self.files.len()) {
            self.files.par_values().map(LazyBlob::size).sum()
        } else {
            self.files.values().map(LazyBlob::size).sum()
        };
        let folders: u64 = if policy.sum_folders_in_parallel(self.folders.len()) {
            self.folders
                .par_iter()
                .map(|folder| folder.total_size_with(policy))
                .sum()
        } else {
            self.folders
                .iter()
                .map(|folder| folder.total_size_with(policy))
                .sum()
        };
        files + folders
    }

    /// Recursively sort folders and files by case-insensitive name
    ///
    /// The sort is stable: names equal ignoring case keep their order.
    pub fn sort_alphabetically(&mut self) {
        self.sort_alphabetically_with(self.policy);
    }

    /// [`sort_alphabetically`](Self::sort_alphabetically) with an explicit policy
    pub fn sort_alphabetically_with(&mut self, policy: ParallelPolicy) {
        self.folders.sort_by_cached_key(|folder| folder.name.to_lowercase());
        self.files
            .sort_by(|a, _, b, _| a.to_lowercase().cmp(&b.to_lowercase()));
        if policy.sort_in_parallel(self.folders.len()) {
            self.folders
                .par_iter_mut()
                .for_each(|folder| folder.sort_alphabetically_with(policy));
        } else {
            for folder in &mut self.folders {
                folder.sort_alphabetically_with(policy);
            }
        }
        self.touch();
    }

    /// Expand folders whose name is a `/`-separated path into nested folders
    ///
    /// `"x/y/z"` becomes `x` → `y` → `z`, reusing existing folders along the
    /// way; the expanded folder keeps its files and subfolders. Siblings that
    /// end up with the same name are merged into one folder.
    pub fn reorganize(&mut self) {
        let folders = std::mem::take(&mut self.folders);
        self.child_cache.get_mut().clear();

        for mut folder in folders {
            folder.reorganize();
            let parts: Vec<String> = segments(&folder.name).map(str::to_owned).collect();
            match parts.split_last() {
                Some((last, parents)) if !parents.is_empty() || *last != folder.name => {
                    folder.name.clone_from(last);
                    let mut target: &mut VirtualDirectory = self;
                    for segment in parents {
                        target = target.child_or_create(segment);
                    }
                    target.merge_folder(folder);
                }
                _ => self.merge_folder(folder),
            }
        }
        self.touch();
    }

    /// Folders below `base_path` whose name contains `pattern` (case-insensitive)
    pub fn search_directories(
        &self,
        pattern: &str,
        base_path: &str,
    ) -> Vec<SearchHit<'_, VirtualDirectory>> {
        let needle = pattern.to_lowercase();
        let prefix = path_prefix(base_path);
        let guard = self.fresh_index();
        let Some(index) = guard.as_ref() else {
            return Vec::new();
        };
        index
            .folders
            .iter()
            .filter(|entry| entry.name_lower.contains(&needle))
            .filter(|entry| entry.full_path.starts_with(&prefix))
            .filter_map(|entry| {
                Some(SearchHit {
                    path: entry.full_path.clone(),
                    item: self.follow(&entry.route)?,
                })
            })
            .collect()
    }

    /// Files below `base_path` whose name contains `pattern` (case-insensitive)
    pub fn search_files(&self, pattern: &str, base_path: &str) -> Vec<SearchHit<'_, LazyBlob>> {
        let needle = pattern.to_lowercase();
        let prefix = path_prefix(base_path);
        let guard = self.fresh_index();
        let Some(index) = guard.as_ref() else {
            return Vec::new();
        };
        index
            .files
            .iter()
            .filter(|entry| entry.name_lower.contains(&needle))
            .filter(|entry| entry.full_path.starts_with(&prefix))
            .filter_map(|entry| {
                let (_, blob) = self.follow(&entry.route)?.files.get_index(entry.file_index)?;
                Some(SearchHit {
                    path: entry.full_path.clone(),
                    item: blob,
                })
            })
            .collect()
    }

    /// Whether this folder's search index matches the tree
    pub fn index_state(&self) -> IndexState {
        let revision = self.revision.load(Ordering::Acquire);
        match self.index.read().as_ref() {
            Some(index) if index.is_current(revision) => IndexState::Fresh,
            _ => IndexState::Stale,
        }
    }

    /// Release the cache of every source-backed blob in the subtree
    pub fn release_all(&self) -> usize {
        self.walk()
            .iter()
            .flat_map(|(_, folder)| folder.files.values())
            .filter(|blob| blob.release())
            .count()
    }

    fn fresh_index(&self) -> RwLockReadGuard<'_, Option<SearchIndex>> {
        let revision = self.revision.load(Ordering::Acquire);
        {
            let guard = self.index.read();
            if guard.as_ref().is_some_and(|index| index.is_current(revision)) {
                return guard;
            }
        }
        let mut guard = self.index.write();
        if !guard.as_ref().is_some_and(|index| index.is_current(revision)) {
            let index = SearchIndex::build(self, revision);
            debug!(
                folder = %self.name,
                folders = index.folders.len(),
                files = index.files.len(),
                "rebuilt search index"
            );
            *guard = Some(index);
        }
        RwLockWriteGuard::downgrade(guard)
    }

    fn follow(&self, route: &[usize]) -> Option<&VirtualDirectory> {
        let mut current = self;
        for &position in route {
            current = current.folders.get(position)?;
        }
        Some(current)
    }

    fn child_or_create(&mut self, name: &str) -> &mut VirtualDirectory {
        match self.folders.iter().position(|f| f.name == name) {
            Some(position) => &mut self.folders[position],
            None => self.add_folder(name),
        }
    }

    fn merge_folder(&mut self, folder: VirtualDirectory) {
        let Some(position) = self.folders.iter().position(|f| f.name == folder.name) else {
            self.add_directory(folder);
            return;
        };
        let VirtualDirectory { files, folders, .. } = folder;
        let existing = &mut self.folders[position];
        for (name, blob) in files {
            existing.add_file(name, blob);
        }
        for child in folders {
            existing.merge_folder(child);
        }
    }

    fn rebind(&mut self, revision: &Arc<AtomicU64>, policy: ParallelPolicy) {
        let mut stack = vec![self];
        while let Some(folder) = stack.pop() {
            folder.revision = Arc::clone(revision);
            folder.policy = policy;
            *folder.index.get_mut() = None;
            stack.extend(folder.folders.iter_mut());
        }
    }

    fn touch(&mut self) {
        self.child_cache.get_mut().clear();
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for VirtualDirectory {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Debug for VirtualDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDirectory")
            .field("name", &self.name)
            .field("folders", &self.folders)
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}
