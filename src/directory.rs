use crate::config::SortKey;
use crate::context::{Context, Settings};
use crate::entry::Entry;
use crate::mime::MimeTable;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use unicode_width::UnicodeWidthStr;

pub type SharedDir = Arc<DirHandle>;

/// One directory's listing plus its view state.
///
/// The cursor always lies in `[0, max(0, len - 1)]`.
#[derive(Debug)]
pub struct Directory {
    path: PathBuf,
    entries: Vec<Entry>,
    filtered_out: Vec<Entry>,
    cursor: usize,
    pointed: Option<PathBuf>,
    mtime: Option<SystemTime>,
    listed_hidden: bool,
    last_read: Option<Instant>,
    sorted_generation: Option<u64>,
    read: bool,
    error: bool,
    marked_size: u64,
    free_space: Option<u64>,
    filter: Option<Regex>,
    width: usize,
    listings: u64,
    deep_refreshes: u64,
}

impl Directory {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: Vec::new(),
            filtered_out: Vec::new(),
            cursor: 0,
            pointed: None,
            mtime: None,
            listed_hidden: false,
            last_read: None,
            sorted_generation: None,
            read: false,
            error: false,
            marked_size: 0,
            free_space: None,
            filter: None,
            width: 0,
            listings: 0,
            deep_refreshes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn pointed(&self) -> Option<&Entry> {
        self.entries.get(self.cursor)
    }

    pub fn pointed_path(&self) -> Option<&Path> {
        self.pointed.as_deref()
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    pub fn last_read(&self) -> Option<Instant> {
        self.last_read
    }

    pub fn marked_size(&self) -> u64 {
        self.marked_size
    }

    pub fn free_space(&self) -> Option<u64> {
        self.free_space
    }

    pub fn filter(&self) -> Option<&Regex> {
        self.filter.as_ref()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn listings(&self) -> u64 {
        self.listings
    }

    pub fn deep_refreshes(&self) -> u64 {
        self.deep_refreshes
    }

    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|entry| entry.path == path)
    }

    pub fn set_cursor(&mut self, index: usize) {
        self.cursor = index.min(self.entries.len().saturating_sub(1));
        self.pointed = self.entries.get(self.cursor).map(|entry| entry.path.clone());
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let target = if delta < 0 {
            self.cursor.saturating_sub(delta.unsigned_abs())
        } else {
            self.cursor.saturating_add(delta as usize)
        };
        self.set_cursor(target);
    }

    pub fn set_pointed_path(&mut self, path: &Path) {
        match self.index_of(path) {
            Some(index) => self.set_cursor(index),
            None if self.entries.is_empty() => {
                self.cursor = 0;
                self.pointed = Some(path.to_path_buf());
            }
            None => self.set_cursor(0),
        }
    }

    fn replace_entries(&mut self, entries: Vec<Entry>) {
        let marked: HashSet<PathBuf> = self
            .entries
            .iter()
            .chain(self.filtered_out.iter())
            .filter(|entry| entry.marked)
            .map(|entry| entry.path.clone())
            .collect();
        let mut entries = entries;
        for entry in &mut entries {
            entry.marked = marked.contains(&entry.path);
        }
        self.partition(entries);
        self.listings += 1;
        self.sorted_generation = None;
        self.recompute_marked_size();
        self.restore_cursor();
    }

    fn partition(&mut self, entries: Vec<Entry>) {
        match &self.filter {
            Some(filter) => {
                let (keep, drop): (Vec<Entry>, Vec<Entry>) = entries
                    .into_iter()
                    .partition(|entry| filter.is_match(&entry.basename));
                self.entries = keep;
                self.filtered_out = drop;
            }
            None => {
                self.entries = entries;
                self.filtered_out.clear();
            }
        }
    }

    fn restore_cursor(&mut self) {
        match self.pointed.clone() {
            Some(path) => match self.index_of(&path) {
                Some(index) => self.set_cursor(index),
                None => self.set_cursor(self.cursor),
            },
            None => self.set_cursor(self.cursor),
        }
    }

    pub fn set_filter(&mut self, filter: Option<Regex>, context: &Context) {
        self.filter = filter;
        let mut all = std::mem::take(&mut self.entries);
        all.append(&mut self.filtered_out);
        self.partition(all);
        self.sorted_generation = None;
        self.sort(context);
        self.restore_cursor();
    }

    pub fn sort(&mut self, context: &Context) -> bool {
        let settings = context.settings();
        if self.sorted_generation == Some(settings.sort_generation) {
            return false;
        }
        sort_entries(&mut self.entries, &settings, context.mime());
        self.sorted_generation = Some(settings.sort_generation);
        self.restore_cursor();
        true
    }

    pub fn toggle_mark(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.marked = !entry.marked;
        }
        self.recompute_marked_size();
    }

    pub fn invert_marks(&mut self) {
        for entry in &mut self.entries {
            entry.marked = !entry.marked;
        }
        self.recompute_marked_size();
    }

    pub fn clear_marks(&mut self) {
        for entry in self.entries.iter_mut().chain(self.filtered_out.iter_mut()) {
            entry.marked = false;
        }
        self.marked_size = 0;
    }

    pub fn marked(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|entry| entry.marked)
    }

    fn recompute_marked_size(&mut self) {
        self.marked_size = self
            .entries
            .iter()
            .filter(|entry| entry.marked && entry.is_file())
            .map(|entry| entry.size)
            .sum();
    }

    pub fn recompute_width(&mut self) {
        self.width = self
            .entries
            .iter()
            .map(|entry| entry.basename.width() + entry.infostring.width() + 2)
            .max()
            .unwrap_or(0);
    }

    fn mark_unlistable(&mut self) {
        self.entries.clear();
        self.filtered_out.clear();
        self.cursor = 0;
        self.read = true;
        self.error = true;
        self.marked_size = 0;
        self.listings += 1;
    }
}

/// Shared handle to a cached directory.
///
/// Refreshes do their filesystem work without the lock and only take the
/// write lock to publish the result.
#[derive(Debug)]
pub struct DirHandle {
    path: PathBuf,
    scheduled: AtomicBool,
    inner: RwLock<Directory>,
}

impl DirHandle {
    pub fn new(path: PathBuf) -> Self {
        Self {
            inner: RwLock::new(Directory::new(path.clone())),
            path,
            scheduled: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Directory> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Directory> {
        self.inner.write()
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(atomic::Ordering::SeqCst)
    }

    pub(crate) fn try_schedule(&self) -> bool {
        !self.scheduled.swap(true, atomic::Ordering::SeqCst)
    }

    pub(crate) fn clear_scheduled(&self) {
        self.scheduled.store(false, atomic::Ordering::SeqCst);
    }

    pub fn invalidate(&self) {
        self.write().mtime = None;
    }

    /// Cheap refresh re-lists only when the on-disk mtime (or the hidden
    /// file setting) changed since the last listing. Deep refresh always
    /// re-lists, stats every entry and marks the directory read.
    ///
    /// Returns whether the entry list was rebuilt.
    pub fn refresh(&self, deep: bool, context: &Context) -> bool {
        let settings = context.settings();
        let disk_mtime = fs::metadata(&self.path).and_then(|meta| meta.modified()).ok();
        let stale = {
            let dir = self.read();
            deep
                || disk_mtime.is_none()
                || dir.mtime != disk_mtime
                || dir.listed_hidden != settings.show_hidden
        };
        if !stale {
            self.write().sort(context);
            return false;
        }

        let mut entries = match list_entries(&self.path, &settings) {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!("cannot list {}: {err}", self.path.display());
                let mut dir = self.write();
                dir.mark_unlistable();
                dir.mtime = disk_mtime;
                return true;
            }
        };
        let free = if deep {
            for entry in &mut entries {
                entry.refresh_entry();
            }
            free_space(&self.path)
        } else {
            None
        };

        let mut dir = self.write();
        dir.error = false;
        dir.mtime = disk_mtime;
        dir.listed_hidden = settings.show_hidden;
        dir.replace_entries(entries);
        if deep {
            dir.read = true;
            dir.last_read = Some(Instant::now());
            dir.deep_refreshes += 1;
            dir.free_space = free;
        }
        dir.sort(context);
        true
    }
}

fn list_entries(path: &Path, settings: &Settings) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for item in fs::read_dir(path)? {
        let Ok(item) = item else {
            continue;
        };
        let entry = Entry::from_listing(item.path(), item.file_type().ok());
        if !settings.show_hidden && entry.is_hidden() {
            continue;
        }
        entries.push(entry);
    }
    Ok(entries)
}

pub fn sort_entries(entries: &mut [Entry], settings: &Settings, mime: &MimeTable) {
    entries.sort_by(|a, b| {
        if settings.dirs_first {
            match (a.is_dir(), b.is_dir()) {
                (true, false) => return Ordering::Less,
                (false, true) => return Ordering::Greater,
                _ => {}
            }
        }
        compare_by(settings.sort, a, b, mime)
    });
    if settings.sort_reverse {
        entries.reverse();
    }
}

fn compare_by(key: SortKey, a: &Entry, b: &Entry, mime: &MimeTable) -> Ordering {
    let primary = match key {
        SortKey::Name => Ordering::Equal,
        SortKey::Extension => a
            .extension
            .to_ascii_lowercase()
            .cmp(&b.extension.to_ascii_lowercase()),
        SortKey::Type => a.mime_type(mime).cmp(&b.mime_type(mime)),
        SortKey::Size => a.size.cmp(&b.size),
        SortKey::Ctime => a.ctime.cmp(&b.ctime),
        SortKey::Mtime => a.mtime.cmp(&b.mtime),
    };
    primary
        .then_with(|| {
            a.basename
                .to_lowercase()
                .cmp(&b.basename.to_lowercase())
        })
        .then_with(|| a.path.cmp(&b.path))
}

#[cfg(unix)]
fn free_space(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    // SAFETY: statvfs only writes into the zeroed struct we own.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    Some(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
fn free_space(_: &Path) -> Option<u64> {
    None
}
