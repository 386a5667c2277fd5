use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use walkdir::WalkDir;

const CHUNK: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cancelled")]
    Cancelled,
    #[error("cannot transfer {} into itself", .0.display())]
    IntoItself(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> TransferError + '_ {
    move |source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Copy,
    Move,
}

impl Operation {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Copy => "cp",
            Self::Move => "mv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Bytes,
    Entries,
}

#[derive(Debug, Default)]
pub struct Meter {
    progress: AtomicU64,
    max: AtomicU64,
    cancel: AtomicBool,
    label: Mutex<String>,
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Acquire)
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Acquire)
    }

    pub fn set_max(&self, max: u64) {
        self.max.store(max, Ordering::Release);
    }

    pub fn advance(&self, amount: u64) {
        self.progress.fetch_add(amount, Ordering::AcqRel);
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn label(&self) -> String {
        self.label.lock().clone()
    }

    pub fn set_label(&self, label: String) {
        *self.label.lock() = label;
    }

    fn check(&self) -> Result<(), TransferError> {
        if self.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
struct Item {
    source: PathBuf,
    target: PathBuf,
    weight: u64,
}

#[derive(Debug, Clone)]
pub struct Plan {
    operation: Operation,
    items: Vec<Item>,
    create_root: Option<PathBuf>,
    unit: Unit,
    max: u64,
}

impl Plan {
    pub fn new(
        operation: Operation,
        sources: &[PathBuf],
        destination: &Path,
    ) -> Result<Self, TransferError> {
        let sources: Vec<&PathBuf> = sources
            .iter()
            .filter(|source| fs::symlink_metadata(source).is_ok())
            .collect();
        for source in &sources {
            if is_inside(source, destination) {
                return Err(TransferError::IntoItself(source.to_path_buf()));
            }
        }

        let into_dir = destination.is_dir();
        let create_root = (!into_dir && sources.len() > 1).then(|| destination.to_path_buf());
        let mut claimed = HashSet::new();
        let mut items = Vec::with_capacity(sources.len());
        for source in sources {
            let target = if into_dir || create_root.is_some() {
                if operation == Operation::Move && source.parent() == Some(destination) {
                    continue;
                }
                let Some(name) = source.file_name() else {
                    continue;
                };
                unique_target(&destination.join(name), &mut claimed)
            } else {
                destination.to_path_buf()
            };
            items.push(Item {
                source: source.clone(),
                target,
                weight: 0,
            });
        }

        Ok(Self {
            operation,
            items,
            create_root,
            unit: Unit::Entries,
            max: 0,
        })
    }

    pub fn measure(&mut self) -> u64 {
        let single_file = match self.items.as_slice() {
            [item] => fs::symlink_metadata(&item.source)
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            _ => false,
        };
        if single_file {
            let len = fs::metadata(&self.items[0].source).map(|m| m.len()).unwrap_or(0);
            self.items[0].weight = len;
            self.unit = Unit::Bytes;
        } else {
            for item in &mut self.items {
                item.weight = count_entries(&item.source);
            }
            self.unit = Unit::Entries;
        }
        self.max = self.items.iter().map(|item| item.weight).sum();
        self.max
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn targets(&self) -> Vec<PathBuf> {
        self.items.iter().map(|item| item.target.clone()).collect()
    }

    pub fn execute(&mut self, meter: &Meter) -> Result<(), TransferError> {
        meter.check()?;
        meter.set_max(self.measure());
        if let Some(root) = &self.create_root {
            fs::create_dir_all(root).map_err(io_error(root))?;
        }
        for item in &self.items {
            meter.check()?;
            meter.set_label(format!("{} {} ...", self.operation.verb(), display_name(&item.source)));
            match self.operation {
                Operation::Copy => self.copy_tree(&item.source, &item.target, meter)?,
                Operation::Move => self.move_item(item, meter)?,
            }
        }
        Ok(())
    }

    fn move_item(&self, item: &Item, meter: &Meter) -> Result<(), TransferError> {
        if item.target.is_dir() && !same_file(&item.source, &item.target) {
            return Err(TransferError::Io {
                path: item.target.clone(),
                source: io::Error::new(io::ErrorKind::AlreadyExists, "target directory exists"),
            });
        }
        match fs::rename(&item.source, &item.target) {
            Ok(()) => {
                meter.advance(item.weight);
                Ok(())
            }
            Err(err) => {
                log::debug!(
                    "rename {} failed ({err}), copying instead",
                    item.source.display()
                );
                self.copy_tree(&item.source, &item.target, meter)?;
                remove_path(&item.source)
            }
        }
    }

    fn copy_tree(&self, source: &Path, target: &Path, meter: &Meter) -> Result<(), TransferError> {
        for entry in WalkDir::new(source).follow_links(false) {
            meter.check()?;
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(source).to_path_buf();
                io_error(&path)(err.into())
            })?;
            let relative = entry.path().strip_prefix(source).unwrap_or(Path::new(""));
            let destination = if relative.as_os_str().is_empty() {
                target.to_path_buf()
            } else {
                target.join(relative)
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                match fs::create_dir(&destination) {
                    Err(err) if !destination.is_dir() => return Err(io_error(&destination)(err)),
                    _ => {}
                }
            } else if file_type.is_symlink() {
                let link = fs::read_link(entry.path()).map_err(io_error(entry.path()))?;
                make_symlink(&link, &destination).map_err(io_error(&destination))?;
            } else if file_type.is_file() {
                copy_file(entry.path(), &destination, meter, self.unit)?;
            } else {
                log::warn!("skipping special file {}", entry.path().display());
            }
            if self.unit == Unit::Entries {
                meter.advance(1);
            }
        }
        Ok(())
    }
}

/// Streams one file in chunks. The target is removed if the copy does not
/// finish.
fn copy_file(source: &Path, target: &Path, meter: &Meter, unit: Unit) -> Result<(), TransferError> {
    let result = stream(source, target, meter, unit);
    if result.is_err() {
        let _ = fs::remove_file(target);
    }
    result
}

fn stream(source: &Path, target: &Path, meter: &Meter, unit: Unit) -> Result<(), TransferError> {
    let mut input = File::open(source).map_err(io_error(source))?;
    let permissions = input.metadata().map(|meta| meta.permissions()).ok();
    let mut output = File::create(target).map_err(io_error(target))?;
    let mut buffer = vec![0u8; CHUNK];
    loop {
        meter.check()?;
        let read = input.read(&mut buffer).map_err(io_error(source))?;
        if read == 0 {
            break;
        }
        output.write_all(&buffer[..read]).map_err(io_error(target))?;
        if unit == Unit::Bytes {
            meter.advance(read as u64);
        }
    }
    output.flush().map_err(io_error(target))?;
    if let Some(permissions) = permissions {
        let _ = fs::set_permissions(target, permissions);
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<(), TransferError> {
    let meta = fs::symlink_metadata(path).map_err(io_error(path))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(io_error(path))
    } else {
        fs::remove_file(path).map_err(io_error(path))
    }
}

fn count_entries(source: &Path) -> u64 {
    WalkDir::new(source).follow_links(false).into_iter().count() as u64
}

fn unique_target(candidate: &Path, claimed: &mut HashSet<PathBuf>) -> PathBuf {
    let mut target = candidate.to_path_buf();
    while fs::symlink_metadata(&target).is_ok() || claimed.contains(&target) {
        let mut name = target.as_os_str().to_os_string();
        name.push("_");
        target = PathBuf::from(name);
    }
    claimed.insert(target.clone());
    target
}

fn is_inside(source: &Path, destination: &Path) -> bool {
    if !source.is_dir() {
        return false;
    }
    let Ok(source) = source.canonicalize() else {
        return false;
    };
    let existing = destination
        .ancestors()
        .find(|ancestor| ancestor.exists())
        .unwrap_or(destination);
    match existing.canonicalize() {
        Ok(destination) => destination.starts_with(&source),
        Err(_) => false,
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(unix)]
fn make_symlink(link: &Path, at: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, at)
}

#[cfg(not(unix))]
fn make_symlink(link: &Path, at: &Path) -> io::Result<()> {
    if link.is_dir() {
        std::os::windows::fs::symlink_dir(link, at)
    } else {
        std::os::windows::fs::symlink_file(link, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file_counts_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("big.bin");
        fs::write(&source, vec![7u8; CHUNK * 3 + 10]).unwrap();
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        let mut plan = Plan::new(Operation::Copy, &[source.clone()], &out).unwrap();
        assert_eq!(plan.measure(), (CHUNK * 3 + 10) as u64);
        assert_eq!(plan.unit(), Unit::Bytes);
        let meter = Meter::new();
        plan.execute(&meter).unwrap();
        assert_eq!(meter.progress(), meter.max());
        assert_eq!(fs::read(out.join("big.bin")).unwrap().len(), CHUNK * 3 + 10);
    }

    #[test]
    fn tree_counts_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("tree");
        fs::create_dir_all(source.join("a/b")).unwrap();
        fs::write(source.join("a/one"), b"1").unwrap();
        fs::write(source.join("a/b/two"), b"2").unwrap();
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        let mut plan = Plan::new(Operation::Copy, &[source.clone()], &out).unwrap();
        assert_eq!(plan.max(), 0);
        assert_eq!(plan.targets(), [out.join("tree")]);
        assert_eq!(plan.measure(), 5);
        assert_eq!(plan.unit(), Unit::Entries);
        let meter = Meter::new();
        plan.execute(&meter).unwrap();
        assert_eq!(meter.progress(), 5);
        assert_eq!(fs::read(out.join("tree/a/b/two")).unwrap(), b"2");
    }

    #[test]
    fn collisions_get_underscore_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("a.txt");
        fs::write(&source, b"x").unwrap();
        let plan = Plan::new(Operation::Copy, &[source.clone()], tmp.path()).unwrap();
        assert_eq!(plan.targets(), [tmp.path().join("a.txt_")]);
    }

    #[test]
    fn several_sources_into_missing_path_create_it() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();
        let dest = tmp.path().join("new");
        let mut plan = Plan::new(Operation::Copy, &[a, b], &dest).unwrap();
        plan.execute(&Meter::new()).unwrap();
        assert!(dest.join("a").is_file() && dest.join("b").is_file());
    }

    #[test]
    fn move_renames_and_advances() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("m.txt");
        fs::write(&source, b"move me").unwrap();
        let dest = tmp.path().join("sub");
        fs::create_dir(&dest).unwrap();
        let mut plan = Plan::new(Operation::Move, &[source.clone()], &dest).unwrap();
        let meter = Meter::new();
        plan.execute(&meter).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(dest.join("m.txt")).unwrap(), b"move me");
        assert_eq!(meter.progress(), 7);
    }

    #[test]
    fn cancelled_copy_leaves_no_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("f");
        fs::write(&source, vec![1u8; CHUNK * 2]).unwrap();
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        let mut plan = Plan::new(Operation::Copy, &[source], &out).unwrap();
        let meter = Meter::new();
        meter.cancel();
        assert!(matches!(plan.execute(&meter), Err(TransferError::Cancelled)));
        assert!(!out.join("f").exists());
    }

    #[test]
    fn refuses_copy_into_itself() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("dir");
        fs::create_dir_all(source.join("inner")).unwrap();
        let result = Plan::new(Operation::Copy, &[source.clone()], &source.join("inner"));
        assert!(matches!(result, Err(TransferError::IntoItself(_))));
    }

    #[test]
    fn missing_sources_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut plan = Plan::new(Operation::Copy, &[tmp.path().join("ghost")], tmp.path()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.measure(), 0);
    }
}
