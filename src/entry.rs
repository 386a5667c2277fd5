use crate::apps::{Dispatch, Handler};
use crate::mime::MimeTable;
use std::fs::{self, FileType, Metadata};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};

pub const BAD_TIME: SystemTime = UNIX_EPOCH;
pub const NO_RIGHTS: &str = "----------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Socket,
    Nonexistent,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub path: PathBuf,
    pub basename: String,
    pub name: String,
    pub extension: String,
    pub kind: EntryKind,
    pub size: u64,
    pub rights: String,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub exists: bool,
    pub symlink: bool,
    pub link_target: Option<PathBuf>,
    pub writable: bool,
    pub executable: bool,
    pub infostring: String,
    pub marked: bool,
    pub stat: bool,
    mime: OnceLock<Option<String>>,
    handler: OnceLock<Handler>,
}

impl Entry {
    pub fn new(path: &Path) -> Self {
        let basename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let (name, extension) = split_at_last_dot(&basename);
        Self {
            path: path.to_path_buf(),
            name,
            extension,
            basename,
            kind: EntryKind::Nonexistent,
            size: 0,
            rights: NO_RIGHTS.to_string(),
            mtime: BAD_TIME,
            ctime: BAD_TIME,
            exists: false,
            symlink: false,
            link_target: None,
            writable: false,
            executable: false,
            infostring: String::new(),
            marked: false,
            stat: false,
            mime: OnceLock::new(),
            handler: OnceLock::new(),
        }
    }

    pub fn from_listing(path: PathBuf, file_type: Option<FileType>) -> Self {
        let mut entry = Self::new(&path);
        let Some(file_type) = file_type else {
            return entry;
        };
        entry.exists = true;
        entry.symlink = file_type.is_symlink();
        entry.kind = if file_type.is_symlink() {
            match fs::metadata(&path) {
                Ok(meta) => kind_of(&meta),
                Err(_) => {
                    entry.exists = false;
                    EntryKind::Nonexistent
                }
            }
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if is_socket(&file_type) {
            EntryKind::Socket
        } else {
            EntryKind::File
        };
        entry
    }

    pub fn probe(path: &Path) -> Self {
        let mut entry = Self::new(path);
        entry.refresh_entry();
        entry
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_broken_symlink(&self) -> bool {
        self.symlink && !self.exists
    }

    pub fn is_hidden(&self) -> bool {
        self.basename.starts_with('.') || self.basename == "lost+found"
    }

    pub fn is_in(&self, dir: &Path) -> bool {
        self.path.starts_with(dir)
    }

    pub fn refresh_entry(&mut self) {
        self.size = 0;
        self.infostring.clear();
        self.stat = true;
        self.symlink = fs::symlink_metadata(&self.path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        self.link_target = if self.symlink {
            fs::read_link(&self.path).ok()
        } else {
            None
        };

        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(_) => {
                self.clear_metadata();
                return;
            }
        };

        self.exists = true;
        self.kind = kind_of(&meta);
        match self.kind {
            EntryKind::Directory => match fs::read_dir(&self.path) {
                Ok(children) => {
                    self.size = children.count() as u64;
                    self.infostring = self.size.to_string();
                }
                Err(_) => self.infostring = "?".to_string(),
            },
            EntryKind::File => {
                self.size = meta.len();
                if self.size > 0 {
                    self.infostring = human_size(self.size);
                }
            }
            EntryKind::Socket | EntryKind::Nonexistent => {}
        }
        self.rights = rights_string(&meta, self.symlink);
        self.writable = !meta.permissions().readonly();
        self.executable = self.kind != EntryKind::Directory && is_executable(&meta);
        self.mtime = meta.modified().unwrap_or(BAD_TIME);
        self.ctime = change_time(&meta);
    }

    fn clear_metadata(&mut self) {
        self.exists = false;
        self.kind = EntryKind::Nonexistent;
        self.writable = false;
        self.executable = false;
        self.rights = NO_RIGHTS.to_string();
        self.mtime = BAD_TIME;
        self.ctime = BAD_TIME;
        if self.symlink {
            self.infostring = "->".to_string();
        }
    }

    pub fn mime_type(&self, table: &MimeTable) -> Option<&str> {
        self.mime
            .get_or_init(|| {
                if self.is_dir() {
                    return None;
                }
                if let Some(mime) = table.lookup(&self.extension) {
                    return Some(mime.to_string());
                }
                if !self.is_file() {
                    return None;
                }
                infer::get_from_path(&self.path)
                    .ok()
                    .flatten()
                    .map(|kind| kind.mime_type().to_string())
            })
            .as_deref()
    }

    /// Handler resolved through `dispatch`. Computed once per entry, also
    /// when the answer is [`Handler::None`].
    pub fn handler(&self, dispatch: &dyn Dispatch, table: &MimeTable) -> &Handler {
        self.handler
            .get_or_init(|| dispatch.resolve(self, self.mime_type(table)))
    }

    pub fn handler_resolved(&self) -> bool {
        self.handler.get().is_some()
    }
}

fn kind_of(meta: &Metadata) -> EntryKind {
    let file_type = meta.file_type();
    if file_type.is_dir() {
        EntryKind::Directory
    } else if is_socket(&file_type) {
        EntryKind::Socket
    } else {
        EntryKind::File
    }
}

#[cfg(unix)]
fn is_socket(file_type: &FileType) -> bool {
    file_type.is_socket()
}

#[cfg(not(unix))]
fn is_socket(_: &FileType) -> bool {
    false
}

#[cfg(unix)]
fn is_executable(meta: &Metadata) -> bool {
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_: &Metadata) -> bool {
    false
}

#[cfg(unix)]
fn change_time(meta: &Metadata) -> SystemTime {
    let secs = meta.ctime();
    if secs < 0 {
        return BAD_TIME;
    }
    UNIX_EPOCH + Duration::new(secs as u64, meta.ctime_nsec().clamp(0, 999_999_999) as u32)
}

#[cfg(not(unix))]
fn change_time(meta: &Metadata) -> SystemTime {
    meta.created().unwrap_or(BAD_TIME)
}

pub fn split_at_last_dot(basename: &str) -> (String, String) {
    match basename.rfind('.') {
        Some(index) if index > 0 => (
            basename[..index].to_string(),
            basename[index + 1..].to_string(),
        ),
        _ => (basename.to_string(), String::new()),
    }
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, UNITS[unit])
    } else {
        format!("{rounded} {}", UNITS[unit])
    }
}

#[cfg(unix)]
fn rights_string(metadata: &Metadata, symlink: bool) -> String {
    let mode = metadata.permissions().mode();
    let mut output = String::with_capacity(10);
    output.push(if symlink {
        'l'
    } else if metadata.is_dir() {
        'd'
    } else {
        '-'
    });
    output.push(if mode & 0o400 != 0 { 'r' } else { '-' });
    output.push(if mode & 0o200 != 0 { 'w' } else { '-' });
    output.push(match (mode & 0o100 != 0, mode & 0o4000 != 0) {
        (true, true) => 's',
        (false, true) => 'S',
        (true, false) => 'x',
        (false, false) => '-',
    });
    output.push(if mode & 0o040 != 0 { 'r' } else { '-' });
    output.push(if mode & 0o020 != 0 { 'w' } else { '-' });
    output.push(match (mode & 0o010 != 0, mode & 0o2000 != 0) {
        (true, true) => 's',
        (false, true) => 'S',
        (true, false) => 'x',
        (false, false) => '-',
    });
    output.push(if mode & 0o004 != 0 { 'r' } else { '-' });
    output.push(if mode & 0o002 != 0 { 'w' } else { '-' });
    output.push(match (mode & 0o001 != 0, mode & 0o1000 != 0) {
        (true, true) => 't',
        (false, true) => 'T',
        (true, false) => 'x',
        (false, false) => '-',
    });
    output
}

#[cfg(not(unix))]
fn rights_string(metadata: &Metadata, symlink: bool) -> String {
    let kind = if symlink {
        'l'
    } else if metadata.is_dir() {
        'd'
    } else {
        '-'
    };
    if metadata.permissions().readonly() {
        format!("{kind}r--r--r--")
    } else {
        format!("{kind}rw-rw-rw-")
    }
}
