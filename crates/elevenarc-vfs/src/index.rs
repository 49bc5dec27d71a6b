//! Flat search index over a folder tree
//!
//! The index is rebuilt in full whenever the tree revision it was built at no
//! longer matches the tree's current revision. Entries store the route of
//! child positions from the indexed folder so hits resolve back to borrowed
//! nodes without holding references inside the lock.

use crate::directory::VirtualDirectory;

#[derive(Debug)]
pub(crate) struct IndexedFolder {
    pub(crate) name_lower: String,
    pub(crate) full_path: String,
    pub(crate) route: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct IndexedFile {
    pub(crate) name_lower: String,
    pub(crate) full_path: String,
    pub(crate) route: Vec<usize>,
    pub(crate) file_index: usize,
}

#[derive(Debug)]
pub(crate) struct SearchIndex {
    pub(crate) revision: u64,
    pub(crate) folders: Vec<IndexedFolder>,
    pub(crate) files: Vec<IndexedFile>,
}

impl SearchIndex {
    /// Walk the tree below `root` with an explicit stack
    pub(crate) fn build(root: &VirtualDirectory, revision: u64) -> Self {
        let mut folders = Vec::new();
        let mut files = Vec::new();
        let mut stack: Vec<(String, Vec<usize>, &VirtualDirectory)> =
            vec![("/".to_owned(), Vec::new(), root)];

        while let Some((path, route, folder)) = stack.pop() {
            for (file_index, (name, _)) in folder.files().enumerate() {
                files.push(IndexedFile {
                    name_lower: name.to_lowercase(),
                    full_path: format!("{path}{name}"),
                    route: route.clone(),
                    file_index,
                });
            }
            for (position, child) in folder.folders().iter().enumerate().rev() {
                let mut child_route = route.clone();
                child_route.push(position);
                stack.push((format!("{path}{}/", child.name()), child_route, child));
            }
            if !route.is_empty() {
                folders.push(IndexedFolder {
                    name_lower: folder.name().to_lowercase(),
                    full_path: path,
                    route,
                });
            }
        }

        Self {
            revision,
            folders,
            files,
        }
    }

    pub(crate) fn is_current(&self, revision: u64) -> bool {
        self.revision == revision
    }
}
