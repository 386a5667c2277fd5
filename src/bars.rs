use crate::context::Redraw;
use crate::transfer::{Meter, Operation, Plan, TransferError};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarState {
    Running,
    Completed,
    Failed(String),
    Killed,
}

impl BarState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug)]
pub struct Bar {
    id: u64,
    operation: Operation,
    meter: Meter,
    targets: Vec<PathBuf>,
    state: Mutex<BarState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Bar {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn state(&self) -> BarState {
        self.state.lock().clone()
    }

    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    pub fn progress(&self) -> u64 {
        self.meter.progress()
    }

    pub fn max(&self) -> u64 {
        self.meter.max()
    }

    pub fn done(&self) -> f64 {
        let max = self.meter.max();
        if max == 0 {
            return if *self.state.lock() == BarState::Completed {
                1.0
            } else {
                0.0
            };
        }
        (self.meter.progress() as f64 / max as f64).min(1.0)
    }

    pub fn text(&self) -> String {
        let percent = (self.done() * 10_000.0).round() / 100.0;
        format!("{} {percent:.2}%", self.meter.label())
    }

    fn finish(&self, result: Result<(), TransferError>) {
        let state = match result {
            Ok(()) => BarState::Completed,
            Err(TransferError::Cancelled) => BarState::Killed,
            Err(err) => {
                log::error!("{} failed: {err}", self.operation.verb());
                BarState::Failed(err.to_string())
            }
        };
        *self.state.lock() = state;
    }
}

#[derive(Debug, Clone)]
pub struct BarHandle(Arc<Bar>);

impl BarHandle {
    pub fn bar(&self) -> &Bar {
        &self.0
    }

    pub fn targets(&self) -> &[PathBuf] {
        self.0.targets()
    }

    pub fn join(&self) {
        let worker = self.0.worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("transfer worker {} panicked", self.0.id);
            }
        }
    }
}

struct Ticker {
    stop: Arc<(Mutex<bool>, Condvar)>,
    thread: JoinHandle<()>,
}

impl Ticker {
    fn start(interval: Duration, redraw: Redraw) -> io::Result<Self> {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("bar-ticker".into())
            .spawn(move || {
                let (lock, wake) = &*flag;
                let mut stopped = lock.lock();
                while !*stopped {
                    wake.wait_for(&mut stopped, interval);
                    if !*stopped {
                        redraw();
                    }
                }
            })?;
        Ok(Self { stop, thread })
    }

    fn stop(self) {
        let (lock, wake) = &*self.stop;
        *lock.lock() = true;
        wake.notify_all();
        if self.thread.join().is_err() {
            log::error!("bar ticker panicked");
        }
    }
}

#[derive(Default)]
struct RegistryState {
    bars: Vec<Arc<Bar>>,
    ticker: Option<Ticker>,
}

struct Inner {
    state: Mutex<RegistryState>,
    idle: Condvar,
    redraw: Redraw,
    tick: Duration,
    next_id: AtomicU64,
}

impl Inner {
    fn register(&self, bar: &Arc<Bar>) {
        let mut state = self.state.lock();
        state.bars.push(Arc::clone(bar));
        if state.ticker.is_none() {
            match Ticker::start(self.tick, Arc::clone(&self.redraw)) {
                Ok(ticker) => state.ticker = Some(ticker),
                Err(err) => log::warn!("cannot start bar ticker: {err}"),
            }
        }
    }

    fn deregister(&self, id: u64) {
        let ticker = {
            let mut state = self.state.lock();
            state.bars.retain(|bar| bar.id != id);
            if state.bars.is_empty() {
                self.idle.notify_all();
                state.ticker.take()
            } else {
                None
            }
        };
        if let Some(ticker) = ticker {
            ticker.stop();
        }
        (self.redraw)();
    }
}

/// Removes its bar from the live list when dropped, whichever way the
/// worker exits.
struct Registration {
    registry: Weak<Inner>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(self.id);
        }
    }
}

#[derive(Clone)]
pub struct BarRegistry {
    inner: Arc<Inner>,
}

impl BarRegistry {
    pub fn new(redraw: Redraw, tick: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RegistryState::default()),
                idle: Condvar::new(),
                redraw,
                tick,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn start_copy(&self, sources: &[PathBuf], destination: &Path) -> io::Result<BarHandle> {
        self.start(Operation::Copy, sources, destination)
    }

    pub fn start_move(&self, sources: &[PathBuf], destination: &Path) -> io::Result<BarHandle> {
        self.start(Operation::Move, sources, destination)
    }

    fn start(
        &self,
        operation: Operation,
        sources: &[PathBuf],
        destination: &Path,
    ) -> io::Result<BarHandle> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let plan = Plan::new(operation, sources, destination);
        let targets = plan.as_ref().map(Plan::targets).unwrap_or_default();
        let meter = Meter::new();
        meter.set_label(format!("{} ...", operation.verb()));
        let bar = Arc::new(Bar {
            id,
            operation,
            meter,
            targets,
            state: Mutex::new(BarState::Running),
            worker: Mutex::new(None),
        });

        self.inner.register(&bar);
        let registration = Registration {
            registry: Arc::downgrade(&self.inner),
            id,
        };
        let worker_bar = Arc::clone(&bar);
        let spawned = thread::Builder::new()
            .name(format!("{}-{id}", operation.verb()))
            .spawn(move || {
                let _registration = registration;
                let result = plan.and_then(|mut plan| plan.execute(&worker_bar.meter));
                worker_bar.finish(result);
            });
        match spawned {
            Ok(worker) => {
                *bar.worker.lock() = Some(worker);
                log::info!("started {} bar {id} to {}", operation.verb(), destination.display());
                Ok(BarHandle(bar))
            }
            Err(err) => {
                // The closure, and with it the registration, was dropped.
                log::error!("cannot spawn transfer thread: {err}");
                Err(err)
            }
        }
    }

    pub fn kill(&self, handle: &BarHandle) {
        handle.0.meter.cancel();
    }

    pub fn kill_first(&self) -> bool {
        self.kill_where(|bars| bars.first().cloned())
    }

    pub fn kill_last(&self) -> bool {
        self.kill_where(|bars| bars.last().cloned())
    }

    fn kill_where(&self, pick: impl FnOnce(&[Arc<Bar>]) -> Option<Arc<Bar>>) -> bool {
        let picked = pick(&self.inner.state.lock().bars);
        match picked {
            Some(bar) => {
                bar.meter.cancel();
                true
            }
            None => false,
        }
    }

    pub fn bars(&self) -> Vec<Arc<Bar>> {
        self.inner.state.lock().bars.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().bars.is_empty()
    }

    pub fn ticker_running(&self) -> bool {
        self.inner.state.lock().ticker.is_some()
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let mut state = self.inner.state.lock();
        if !state.bars.is_empty() {
            self.inner.idle.wait_while_for(&mut state, |state| !state.bars.is_empty(), timeout);
        }
        state.bars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::no_redraw;
    use std::fs;
    use std::time::Instant;

    fn registry() -> BarRegistry {
        BarRegistry::new(no_redraw(), Duration::from_millis(20))
    }

    #[test]
    fn copy_bar_completes_and_deregisters() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("file");
        fs::write(&source, vec![3u8; 200_000]).unwrap();
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        let bars = registry();
        let handle = bars.start_copy(&[source], &out).unwrap();
        let mut last = 0.0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.bar().state().is_finished() {
            let done = handle.bar().done();
            assert!(done >= last);
            last = done;
            assert!(Instant::now() < deadline);
        }
        handle.join();
        assert_eq!(handle.bar().state(), BarState::Completed);
        assert_eq!(handle.bar().done(), 1.0);
        assert_eq!(fs::metadata(out.join("file")).unwrap().len(), 200_000);
        assert!(bars.wait_idle(Duration::from_secs(1)));
        assert!(!bars.ticker_running());
        assert_eq!(handle.targets(), [out.join("file")]);
    }

    #[test]
    fn failed_transfer_still_deregisters() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("dir");
        fs::create_dir(&dir).unwrap();
        let bars = registry();
        let handle = bars.start_copy(&[dir.clone()], &dir.join("x")).unwrap();
        handle.join();
        assert!(matches!(handle.bar().state(), BarState::Failed(_)));
        assert!(bars.is_empty());
    }

    #[test]
    fn killed_bar_reports_killed() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("tree");
        fs::create_dir(&source).unwrap();
        for i in 0..200 {
            fs::write(source.join(format!("f{i}")), vec![0u8; 4096]).unwrap();
        }
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        let bars = registry();
        let handle = bars.start_copy(&[source], &out).unwrap();
        bars.kill(&handle);
        handle.join();
        let state = handle.bar().state();
        assert!(state == BarState::Killed || state == BarState::Completed);
        assert!(bars.is_empty());
    }

    #[test]
    fn text_shows_percentage() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("t.txt");
        fs::write(&source, b"hello").unwrap();
        let bars = registry();
        let handle = bars.start_copy(&[source], &tmp.path().join("u.txt")).unwrap();
        handle.join();
        assert_eq!(handle.bar().text(), "cp t.txt ... 100.00%");
    }

    #[test]
    fn tree_is_weighed_on_the_worker() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("tree");
        fs::create_dir(&source).unwrap();
        for i in 0..50 {
            fs::write(source.join(format!("f{i}")), b"x").unwrap();
        }
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        let bars = registry();
        let handle = bars.start_copy(&[source], &out).unwrap();
        assert_eq!(handle.targets(), [out.join("tree")]);
        handle.join();
        assert_eq!(handle.bar().max(), 51);
        assert_eq!(handle.bar().progress(), 51);
    }

    #[test]
    fn kill_first_without_bars_is_noop() {
        assert!(!registry().kill_first());
    }
}
