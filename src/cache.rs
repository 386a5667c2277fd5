use crate::directory::{DirHandle, SharedDir};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct DirectoryCache {
    dirs: HashMap<PathBuf, SharedDir>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, path: &Path) -> SharedDir {
        let key = normalize(path);
        self.dirs
            .entry(key.clone())
            .or_insert_with(|| Arc::new(DirHandle::new(key)))
            .clone()
    }

    pub fn get(&self, path: &Path) -> Option<SharedDir> {
        self.dirs.get(&normalize(path)).cloned()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn invalidate_all(&self) {
        for dir in self.dirs.values() {
            dir.invalidate();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedDir> {
        self.dirs.values()
    }
}

/// Lexically resolves `.` and `..` without touching the filesystem, so
/// symlinked paths keep their spelling.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_yields_same_instance() {
        let mut cache = DirectoryCache::new();
        let a = cache.get_or_create(Path::new("/tmp/x"));
        let b = cache.get_or_create(Path::new("/tmp/./y/../x"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_path_is_unread_and_empty() {
        let mut cache = DirectoryCache::new();
        let dir = cache.get_or_create(Path::new("/no/such/place/at/all"));
        let guard = dir.read();
        assert!(!guard.is_read());
        assert!(guard.is_empty());
    }

    #[test]
    fn normalize_handles_dots() {
        assert_eq!(normalize(Path::new("/a/b/../c/.")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
    }
}
