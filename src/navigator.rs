use crate::apps::Dispatch;
use crate::cache::{normalize, DirectoryCache};
use crate::config::expand_home;
use crate::context::Context;
use crate::directory::SharedDir;
use crate::entry::Entry;
use crate::scheduler::Scheduler;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    Regexp,
    Size,
    Mtime,
    Ctime,
    Handler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hints {
    Unique,
    None,
    Many,
    Invalid,
}

pub fn pattern(text: &str) -> Option<Regex> {
    RegexBuilder::new(text).case_insensitive(true).build().ok()
}

pub struct Navigator {
    context: Arc<Context>,
    cache: DirectoryCache,
    stack: Vec<SharedDir>,
}

impl Navigator {
    pub fn new(context: Arc<Context>, start: &Path, scheduler: &Scheduler) -> Self {
        let mut navigator = Self {
            context,
            cache: DirectoryCache::new(),
            stack: Vec::new(),
        };
        if !navigator.enter_dir(start, scheduler) {
            let root = PathBuf::from("/");
            navigator.enter_dir(&root, scheduler);
        }
        navigator
    }

    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DirectoryCache {
        &mut self.cache
    }

    pub fn stack(&self) -> &[SharedDir] {
        &self.stack
    }

    pub fn pwd(&self) -> &SharedDir {
        // The stack always holds at least the root once constructed.
        &self.stack[self.stack.len() - 1]
    }

    pub fn pwd_path(&self) -> PathBuf {
        self.pwd().path().to_path_buf()
    }

    pub fn resolve(&self, target: &Path) -> PathBuf {
        let expanded = expand_home(&target.to_string_lossy());
        let absolute = if expanded.is_absolute() || self.stack.is_empty() {
            expanded
        } else {
            self.pwd().path().join(expanded)
        };
        normalize(&absolute)
    }

    pub fn enter_dir(&mut self, target: &Path, scheduler: &Scheduler) -> bool {
        let path = self.resolve(target);
        if !path.is_dir() {
            log::debug!("not entering {}", path.display());
            return false;
        }
        let previous = self.stack.last().map(|dir| dir.path().to_path_buf());

        let mut ancestors: Vec<&Path> = path.ancestors().collect();
        ancestors.reverse();
        self.stack = ancestors
            .into_iter()
            .map(|ancestor| self.cache.get_or_create(ancestor))
            .collect();

        let pwd = Arc::clone(self.pwd());
        pwd.refresh(false, &self.context);
        if let Some(previous) = previous.filter(|old| old.starts_with(&path) && *old != path) {
            if let Some(child) = previous
                .strip_prefix(&path)
                .ok()
                .and_then(|rest| rest.components().next())
            {
                pwd.write().set_pointed_path(&path.join(child));
            }
        }
        for pair in self.stack.windows(2) {
            pair[0].write().set_pointed_path(pair[1].path());
        }
        for dir in &self.stack {
            scheduler.enqueue(dir);
        }
        log::debug!("entered {}", path.display());
        true
    }

    pub fn descend(&mut self, scheduler: &Scheduler) -> bool {
        if self.stack.len() < 2 {
            return false;
        }
        self.pwd().write().set_filter(None, &self.context);
        let parent = self.stack[self.stack.len() - 2].path().to_path_buf();
        self.enter_dir(&parent, scheduler)
    }

    pub fn current_entry(&self) -> Option<Entry> {
        self.pwd().read().pointed().cloned()
    }

    pub fn selection(&self) -> Vec<Entry> {
        let dir = self.pwd().read();
        let marked: Vec<Entry> = dir.marked().cloned().collect();
        if !marked.is_empty() {
            return marked;
        }
        dir.pointed().cloned().into_iter().collect()
    }

    pub fn pointed_dir(&mut self, scheduler: &Scheduler) -> Option<SharedDir> {
        let entry = self.current_entry().filter(Entry::is_dir)?;
        let dir = self.cache.get_or_create(&entry.path);
        if !dir.read().is_read() {
            scheduler.enqueue(&dir);
        }
        Some(dir)
    }

    pub fn move_cursor(&self, delta: isize) {
        self.pwd().write().move_cursor(delta);
    }

    pub fn set_cursor(&self, index: usize) {
        self.pwd().write().set_cursor(index);
    }

    pub fn point_at(&self, path: &Path) {
        self.pwd().write().set_pointed_path(path);
    }

    pub fn hints(&self, text: &str) -> Hints {
        let Some(rx) = pattern(text) else {
            return Hints::Invalid;
        };
        let mut dir = self.pwd().write();
        let len = dir.len();
        let start = dir.cursor();
        let mut first = None;
        let mut count = 0;
        for offset in 0..len {
            let index = (start + offset) % len;
            if rx.is_match(&dir.entries()[index].basename) {
                first.get_or_insert(index);
                count += 1;
            }
        }
        if let Some(index) = first {
            dir.set_cursor(index);
        }
        match count {
            0 => Hints::None,
            1 => Hints::Unique,
            _ => Hints::Many,
        }
    }

    pub fn search(&self, text: &str, offset: usize, backwards: bool) -> bool {
        let Some(rx) = pattern(text) else {
            return false;
        };
        let mut dir = self.pwd().write();
        let len = dir.len();
        if len == 0 {
            return false;
        }
        let start = dir.cursor() + offset;
        let mut order: Vec<usize> = (0..len).map(|k| (start + k) % len).collect();
        if backwards {
            order.reverse();
        }
        let hit = order
            .into_iter()
            .find(|&index| rx.is_match(&dir.entries()[index].basename));
        match hit {
            Some(index) => {
                dir.set_cursor(index);
                true
            }
            None => false,
        }
    }

    pub fn quicksearch(
        &self,
        n: isize,
        method: SearchMethod,
        search: &str,
        reset: bool,
        dispatch: &dyn Dispatch,
    ) -> bool {
        match method {
            SearchMethod::Regexp => self.quicksearch_regexp(n, search),
            _ => self.quicksearch_ranked(n, method, reset, dispatch),
        }
    }

    fn quicksearch_regexp(&self, n: isize, text: &str) -> bool {
        let Some(rx) = pattern(text) else {
            return false;
        };
        let mut dir = self.pwd().write();
        let len = dir.len();
        if len == 0 || n == 0 {
            return false;
        }
        let start = dir.cursor();
        let step = n.unsigned_abs();
        let hits: Vec<usize> = (1..=len)
            .map(|k| {
                if n > 0 {
                    (start + k) % len
                } else {
                    (start + len - k % len) % len
                }
            })
            .filter(|&index| rx.is_match(&dir.entries()[index].basename))
            .collect();
        if hits.is_empty() {
            return false;
        }
        let index = hits[(step - 1) % hits.len()];
        dir.set_cursor(index);
        true
    }

    fn quicksearch_ranked(
        &self,
        n: isize,
        method: SearchMethod,
        reset: bool,
        dispatch: &dyn Dispatch,
    ) -> bool {
        let mime = self.context.mime();
        let mut dir = self.pwd().write();
        let len = dir.len();
        if len == 0 {
            return false;
        }
        let mut ranking: Vec<usize> = (0..len).collect();
        {
            let entries = dir.entries();
            ranking.sort_by(|&a, &b| {
                let (a, b) = (&entries[a], &entries[b]);
                let primary = match method {
                    SearchMethod::Size => b.size.cmp(&a.size),
                    SearchMethod::Mtime => b.mtime.cmp(&a.mtime),
                    SearchMethod::Ctime => b.ctime.cmp(&a.ctime),
                    SearchMethod::Handler => a
                        .handler(dispatch, mime)
                        .name()
                        .cmp(&b.handler(dispatch, mime).name()),
                    SearchMethod::Regexp => Ordering::Equal,
                };
                primary.then_with(|| a.basename.cmp(&b.basename))
            });
        }
        let target = if reset {
            ranking[0]
        } else {
            let current = dir.cursor();
            let rank = ranking.iter().position(|&i| i == current).unwrap_or(0) as isize;
            ranking[(rank + n).rem_euclid(len as isize) as usize]
        };
        dir.set_cursor(target);
        true
    }
}
