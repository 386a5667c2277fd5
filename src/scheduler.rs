use crate::config::SchedulerPolicy;
use crate::context::{Context, Redraw};
use crate::directory::SharedDir;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Default)]
struct Queue {
    pending: VecDeque<SharedDir>,
    active: bool,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    policy: SchedulerPolicy,
    interval: Duration,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(
        context: Arc<Context>,
        policy: SchedulerPolicy,
        interval: Duration,
        redraw: Redraw,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                active: true,
                ..Queue::default()
            }),
            wake: Condvar::new(),
            policy,
            interval,
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("scheduler".into())
            .spawn(move || work(&worker_shared, &context, &redraw))?;
        log::debug!("scheduler started ({policy:?}, {interval:?})");
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn enqueue(&self, dir: &SharedDir) {
        if !dir.try_schedule() {
            return;
        }
        self.shared.queue.lock().pending.push_back(Arc::clone(dir));
        if self.shared.policy == SchedulerPolicy::Signaled {
            self.shared.wake.notify_one();
        }
    }

    pub fn run(&self) {
        self.shared.queue.lock().active = true;
        self.shared.wake.notify_one();
    }

    /// Stops processing until [`Scheduler::run`]. Queued directories stay
    /// queued.
    pub fn pause(&self) {
        self.shared.queue.lock().active = false;
    }

    pub fn is_running(&self) -> bool {
        self.shared.queue.lock().active
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("scheduler worker panicked");
            }
        }
    }
}

fn work(shared: &Shared, context: &Context, redraw: &Redraw) {
    let mut refreshed = 0usize;
    loop {
        let next = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.shutdown {
                    return;
                }
                if queue.active {
                    if let Some(dir) = queue.pending.pop_front() {
                        break Some(dir);
                    }
                }
                if refreshed > 0 {
                    break None;
                }
                match shared.policy {
                    SchedulerPolicy::Signaled => shared.wake.wait(&mut queue),
                    SchedulerPolicy::Cooperative => {
                        shared.wake.wait_for(&mut queue, shared.interval);
                    }
                }
            }
        };

        // Drained or paused: one redraw for everything refreshed since the last one.
        let Some(dir) = next else {
            redraw();
            refreshed = 0;
            continue;
        };
        dir.clear_scheduled();
        dir.refresh(true, context);
        dir.write().recompute_width();
        log::trace!("refreshed {}", dir.path().display());
        refreshed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DirectoryCache;
    use crate::context::Settings;
    use crate::mime::MimeTable;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn context() -> Arc<Context> {
        Context::new(Settings::default(), MimeTable::builtin())
    }

    #[test]
    fn double_enqueue_refreshes_once() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("f"), b"").unwrap();
        let mut cache = DirectoryCache::new();
        let dir = cache.get_or_create(tmp.path());
        let scheduler = Scheduler::start(
            context(),
            SchedulerPolicy::Signaled,
            Duration::from_millis(10),
            crate::context::no_redraw(),
        )
        .unwrap();
        scheduler.pause();
        scheduler.enqueue(&dir);
        scheduler.enqueue(&dir);
        assert!(dir.is_scheduled());
        assert_eq!(scheduler.pending(), 1);
        scheduler.run();
        wait_until(|| dir.read().is_read() && !dir.is_scheduled());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(dir.read().deep_refreshes(), 1);
        assert!(dir.read().width() > 0);
    }

    #[test]
    fn cooperative_policy_picks_up_work_and_redraws() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = DirectoryCache::new();
        let first = cache.get_or_create(tmp.path());
        std::fs::create_dir(tmp.path().join("inner")).unwrap();
        let second = cache.get_or_create(&tmp.path().join("inner"));
        let redraws = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&redraws);
        let scheduler = Scheduler::start(
            context(),
            SchedulerPolicy::Cooperative,
            Duration::from_millis(10),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        scheduler.enqueue(&first);
        scheduler.enqueue(&second);
        wait_until(|| second.read().is_read() && first.read().is_read());
        wait_until(|| redraws.load(Ordering::SeqCst) >= 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn paused_scheduler_holds_queue() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = DirectoryCache::new();
        let dir = cache.get_or_create(tmp.path());
        let scheduler = Scheduler::start(
            context(),
            SchedulerPolicy::Cooperative,
            Duration::from_millis(5),
            crate::context::no_redraw(),
        )
        .unwrap();
        scheduler.pause();
        scheduler.enqueue(&dir);
        thread::sleep(Duration::from_millis(50));
        assert!(!dir.read().is_read());
        assert!(!scheduler.is_running());
        scheduler.run();
        wait_until(|| dir.read().is_read());
    }

    #[test]
    fn pause_stops_a_running_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = DirectoryCache::new();
        let dirs: Vec<SharedDir> = (0..60)
            .map(|i| {
                let path = tmp.path().join(format!("d{i:02}"));
                std::fs::create_dir(&path).unwrap();
                for j in 0..300 {
                    std::fs::write(path.join(format!("f{j:03}")), b"").unwrap();
                }
                cache.get_or_create(&path)
            })
            .collect();
        let scheduler = Scheduler::start(
            context(),
            SchedulerPolicy::Signaled,
            Duration::from_millis(10),
            crate::context::no_redraw(),
        )
        .unwrap();
        scheduler.pause();
        for dir in &dirs {
            scheduler.enqueue(dir);
        }
        let read = || dirs.iter().filter(|dir| dir.read().is_read()).count();

        scheduler.run();
        wait_until(|| dirs[0].read().is_read());
        scheduler.pause();
        // At most the refresh already in flight may still land.
        let at_pause = read();
        thread::sleep(Duration::from_millis(200));
        let later = read();
        assert!(later <= at_pause + 1, "{at_pause} then {later}");
        assert!(later < dirs.len());
        assert!(scheduler.pending() > 0);
        assert!(dirs.last().unwrap().is_scheduled());

        scheduler.run();
        wait_until(|| read() == dirs.len());
        assert_eq!(scheduler.pending(), 0);
    }
}
