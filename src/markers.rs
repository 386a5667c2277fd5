use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Bookmarks {
    path: PathBuf,
    marks: BTreeMap<char, PathBuf>,
}

#[derive(Default, Serialize, Deserialize)]
struct BookmarkFile {
    bookmarks: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("failed to access bookmarks: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode bookmarks: {0}")]
    Encode(#[from] toml::ser::Error),
}

impl Bookmarks {
    pub fn load() -> Self {
        Self::load_from(default_bookmark_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let marks = match fs::read_to_string(&path) {
            Ok(content) => parse_bookmarks(&content),
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    log::warn!("cannot read bookmarks {}: {err}", path.display());
                }
                BTreeMap::new()
            }
        };
        Self { path, marks }
    }

    pub fn get(&self, key: char) -> Option<&Path> {
        self.marks.get(&key).map(PathBuf::as_path)
    }

    pub fn set(&mut self, key: char, path: PathBuf) {
        self.marks.insert(key, path);
    }

    pub fn remove(&mut self, key: char) -> bool {
        self.marks.remove(&key).is_some()
    }

    pub fn remember(&mut self, path: PathBuf) {
        self.marks.insert('\'', path.clone());
        self.marks.insert('`', path);
    }

    pub fn entries(&self) -> impl Iterator<Item = (char, &Path)> {
        self.marks.iter().map(|(key, path)| (*key, path.as_path()))
    }

    pub fn save(&self) -> Result<(), MarkerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bookmarks = self
            .marks
            .iter()
            .map(|(key, path)| (key.to_string(), path.to_string_lossy().into_owned()))
            .collect();
        let content = toml::to_string(&BookmarkFile { bookmarks })?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

fn parse_bookmarks(content: &str) -> BTreeMap<char, PathBuf> {
    let file: BookmarkFile = toml::from_str(content).unwrap_or_default();
    let mut marks = BTreeMap::new();
    for (key, value) in file.bookmarks {
        let mut chars = key.chars();
        if let (Some(key), None) = (chars.next(), chars.next()) {
            marks.insert(key, PathBuf::from(value));
        }
    }
    marks
}

fn default_bookmark_path() -> PathBuf {
    if let Some(dir) = dirs::config_dir() {
        return dir.join("millr").join("bookmarks.toml");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".millr.bookmarks.toml");
    }
    PathBuf::from("bookmarks.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmarks_survive_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("nested").join("bookmarks.toml");
        let mut marks = Bookmarks::load_from(file.clone());
        marks.set('a', PathBuf::from("/usr/share"));
        marks.remember(PathBuf::from("/tmp"));
        marks.save().unwrap();

        let loaded = Bookmarks::load_from(file);
        assert_eq!(loaded.get('a'), Some(Path::new("/usr/share")));
        assert_eq!(loaded.get('`'), Some(Path::new("/tmp")));
        assert_eq!(loaded.get('\''), Some(Path::new("/tmp")));
    }

    #[test]
    fn multi_character_keys_are_ignored() {
        let marks = parse_bookmarks("[bookmarks]\nab = \"/x\"\nc = \"/y\"\n");
        assert_eq!(marks.len(), 1);
        assert_eq!(marks.get(&'c'), Some(&PathBuf::from("/y")));
    }

    #[test]
    fn removing_unknown_key_reports_false() {
        let tmp = tempfile::tempdir().unwrap();
        let mut marks = Bookmarks::load_from(tmp.path().join("none.toml"));
        assert!(!marks.remove('z'));
        assert_eq!(marks.entries().count(), 0);
    }
}
