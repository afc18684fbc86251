//! The link context: an explicit registry object owning the shared timer
//! scheduler.
//!
//! Constructed once by the embedding application and passed to every pipe.
//! `start_up`/`shut_down` are reference counted; the scheduler thread runs
//! while the count is non-zero.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{PipeError, Result};

/// Continue after a poisoned lock; a panicking timer task must not wedge
/// every other timer or teardown.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Cancellation token for a scheduled timer.
///
/// A timer that fires after `cancel` is a no-op rather than a race.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct TimerEntry {
    deadline: Instant,
    period: Option<Duration>,
    cancelled: Arc<AtomicBool>,
    task: Box<dyn FnMut() + Send>,
}

// BinaryHeap is a max-heap; order entries so the earliest deadline wins.
impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.deadline.cmp(&self.deadline)
    }
}

struct SchedulerShared {
    queue: Mutex<BinaryHeap<TimerEntry>>,
    wakeup: Condvar,
    stop: AtomicBool,
}

struct Scheduler {
    shared: Arc<SchedulerShared>,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    fn start() -> Self {
        let shared = Arc::new(SchedulerShared {
            queue: Mutex::new(BinaryHeap::new()),
            wakeup: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let loop_shared = Arc::clone(&shared);
        let thread = thread::spawn(move || scheduler_loop(loop_shared));
        Self {
            shared,
            thread: Some(thread),
        }
    }

    fn schedule(
        &self,
        delay: Duration,
        period: Option<Duration>,
        task: Box<dyn FnMut() + Send>,
    ) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = TimerHandle {
            cancelled: Arc::clone(&cancelled),
        };
        lock(&self.shared.queue).push(TimerEntry {
            deadline: Instant::now() + delay,
            period,
            cancelled,
            task,
        });
        self.shared.wakeup.notify_all();
        handle
    }

    fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn scheduler_loop(shared: Arc<SchedulerShared>) {
    let mut queue = lock(&shared.queue);
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        let now = Instant::now();
        match queue.peek().map(|entry| entry.deadline) {
            None => {
                queue = shared
                    .wakeup
                    .wait(queue)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            Some(deadline) if deadline > now => {
                let (guard, _) = shared
                    .wakeup
                    .wait_timeout(queue, deadline - now)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                queue = guard;
            }
            Some(_) => {
                if let Some(mut entry) = queue.pop() {
                    drop(queue);
                    if !entry.cancelled.load(Ordering::SeqCst) {
                        (entry.task)();
                        if let Some(period) = entry.period {
                            if !entry.cancelled.load(Ordering::SeqCst) {
                                entry.deadline = Instant::now() + period;
                                lock(&shared.queue).push(entry);
                            }
                        }
                    }
                    queue = lock(&shared.queue);
                }
            }
        }
    }
}

#[derive(Default)]
struct ContextInner {
    refcount: u32,
    scheduler: Option<Scheduler>,
}

/// Shared per-process link state, constructed once and passed to each
/// [`crate::Pipe`].
#[derive(Default)]
pub struct LinkContext {
    inner: Mutex<ContextInner>,
}

impl LinkContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the use count, starting the scheduler on the first call.
    pub fn start_up(&self) {
        let mut inner = lock(&self.inner);
        inner.refcount += 1;
        if inner.scheduler.is_none() {
            info!("link context starting");
            inner.scheduler = Some(Scheduler::start());
        }
    }

    /// Decrement the use count, stopping the scheduler on the last call.
    pub fn shut_down(&self) {
        let mut inner = lock(&self.inner);
        inner.refcount = inner.refcount.saturating_sub(1);
        if inner.refcount == 0 {
            if let Some(mut scheduler) = inner.scheduler.take() {
                drop(inner);
                info!("link context stopping");
                scheduler.stop();
            }
        }
    }

    pub fn is_started(&self) -> bool {
        lock(&self.inner).scheduler.is_some()
    }

    /// Schedule a one-shot timer.
    pub fn schedule_once(
        &self,
        delay: Duration,
        task: Box<dyn FnMut() + Send>,
    ) -> Result<TimerHandle> {
        self.schedule(delay, None, task)
    }

    /// Schedule a repeating timer; the first firing is one period out.
    pub fn schedule_repeating(
        &self,
        period: Duration,
        task: Box<dyn FnMut() + Send>,
    ) -> Result<TimerHandle> {
        self.schedule(period, Some(period), task)
    }

    fn schedule(
        &self,
        delay: Duration,
        period: Option<Duration>,
        task: Box<dyn FnMut() + Send>,
    ) -> Result<TimerHandle> {
        let inner = lock(&self.inner);
        let scheduler = inner.scheduler.as_ref().ok_or(PipeError::ContextNotStarted)?;
        debug!(?delay, ?period, "scheduling timer");
        Ok(scheduler.schedule(delay, period, task))
    }
}
