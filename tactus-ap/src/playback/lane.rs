//! Serialized scheduling lane
//!
//! A single worker thread executes commands in strict FIFO order, so at
//! most one command is ever in flight. Submission never blocks the caller;
//! [`SerialLane::cancel_and_drain`] is the one blocking operation, clearing
//! pending commands and waiting for the in-flight one to finish. This is
//! what lets callers guarantee no stale work runs after a stop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tracing::debug;

struct LaneInner<C> {
    queue: VecDeque<C>,
    in_flight: bool,
}

struct LaneShared<C> {
    inner: Mutex<LaneInner<C>>,
    /// Wakes the worker when a command arrives or shutdown begins
    work_available: Condvar,
    /// Wakes drain waiters when the in-flight command finishes
    idle: Condvar,
    stop_flag: AtomicBool,
}

/// Cloneable submission handle to a [`SerialLane`].
///
/// Holds no reference to the worker itself, so completion callbacks can
/// carry one without extending the lane's lifetime.
pub struct LaneHandle<C> {
    shared: Arc<LaneShared<C>>,
}

impl<C> Clone for LaneHandle<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Send> LaneHandle<C> {
    /// Enqueue a command without blocking.
    ///
    /// Returns false if the lane has shut down (the command is dropped).
    pub fn submit(&self, command: C) -> bool {
        if self.shared.stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        let mut inner = self.shared.inner.lock().unwrap();
        inner.queue.push_back(command);
        self.shared.work_available.notify_one();
        true
    }
}

/// Single-worker FIFO command lane.
pub struct SerialLane<C: Send + 'static> {
    shared: Arc<LaneShared<C>>,
    thread: Option<JoinHandle<()>>,
}

impl<C: Send + 'static> SerialLane<C> {
    /// Spawn the lane's worker thread.
    ///
    /// `handler` runs on the worker for every submitted command, one at a
    /// time, in submission order.
    pub fn spawn<F>(name: &str, mut handler: F) -> Self
    where
        F: FnMut(C) + Send + 'static,
    {
        let shared = Arc::new(LaneShared {
            inner: Mutex::new(LaneInner {
                queue: VecDeque::new(),
                in_flight: false,
            }),
            work_available: Condvar::new(),
            idle: Condvar::new(),
            stop_flag: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let lane_name = name.to_string();
        let thread = thread::spawn(move || {
            debug!("Lane '{}' worker started", lane_name);
            Self::worker_loop(&worker_shared, &mut handler);
            debug!("Lane '{}' worker stopped", lane_name);
        });

        Self {
            shared,
            thread: Some(thread),
        }
    }

    fn worker_loop<F: FnMut(C)>(shared: &LaneShared<C>, handler: &mut F) {
        loop {
            let command = {
                let mut inner = shared.inner.lock().unwrap();
                while inner.queue.is_empty() && !shared.stop_flag.load(Ordering::Relaxed) {
                    inner = shared.work_available.wait(inner).unwrap();
                }
                if shared.stop_flag.load(Ordering::Relaxed) {
                    // Pending commands are discarded on shutdown
                    break;
                }
                let Some(command) = inner.queue.pop_front() else {
                    continue;
                };
                inner.in_flight = true;
                command
            };

            handler(command);

            let mut inner = shared.inner.lock().unwrap();
            inner.in_flight = false;
            shared.idle.notify_all();
        }

        // Unblock any drain waiter racing with shutdown
        shared.idle.notify_all();
    }

    /// Submission handle for this lane.
    pub fn handle(&self) -> LaneHandle<C> {
        LaneHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel queued commands, then block until the in-flight command (if
    /// any) finishes.
    ///
    /// On return, no command submitted before this call will run.
    pub fn cancel_and_drain(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        let cancelled = inner.queue.len();
        inner.queue.clear();
        if cancelled > 0 {
            debug!("Cancelled {} pending lane commands", cancelled);
        }
        while inner.in_flight {
            inner = self.shared.idle.wait(inner).unwrap();
        }
    }

    /// Number of commands waiting to run.
    pub fn pending(&self) -> usize {
        self.shared.inner.lock().unwrap().queue.len()
    }
}

impl<C: Send + 'static> Drop for SerialLane<C> {
    fn drop(&mut self) {
        self.shared.stop_flag.store(true, Ordering::Relaxed);
        self.shared.work_available.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn wait_until(deadline_ms: u64, predicate: impl Fn() -> bool) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_millis(deadline_ms);
        while std::time::Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        predicate()
    }

    #[test]
    fn commands_run_in_submission_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_clone = Arc::clone(&order);

        let lane = SerialLane::spawn("test", move |n: u32| {
            order_clone.lock().unwrap().push(n);
        });

        let handle = lane.handle();
        for n in 0..100 {
            assert!(handle.submit(n));
        }

        assert!(wait_until(2000, || order.lock().unwrap().len() == 100));
        assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn at_most_one_command_in_flight() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let active_clone = Arc::clone(&active);
        let max_clone = Arc::clone(&max_active);
        let done_clone = Arc::clone(&done);

        let lane = SerialLane::spawn("test", move |_: ()| {
            let now = active_clone.fetch_add(1, Ordering::SeqCst) + 1;
            max_clone.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            active_clone.fetch_sub(1, Ordering::SeqCst);
            done_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handle = lane.handle();
        for _ in 0..20 {
            handle.submit(());
        }

        assert!(wait_until(5000, || done.load(Ordering::SeqCst) == 20));
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_and_drain_discards_pending_and_waits_for_in_flight() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let started_clone = Arc::clone(&started);
        let finished_clone = Arc::clone(&finished);

        let lane = SerialLane::spawn("test", move |_: ()| {
            started_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            finished_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handle = lane.handle();
        for _ in 0..10 {
            handle.submit(());
        }

        // Let the first command begin, then cancel the rest
        assert!(wait_until(2000, || started.load(Ordering::SeqCst) >= 1));
        lane.cancel_and_drain();

        // The in-flight command finished before drain returned
        let ran = started.load(Ordering::SeqCst);
        assert_eq!(finished.load(Ordering::SeqCst), ran);
        assert!(ran < 10, "pending commands should have been cancelled");
        assert_eq!(lane.pending(), 0);

        // Nothing else runs afterwards
        thread::sleep(Duration::from_millis(60));
        assert_eq!(started.load(Ordering::SeqCst), ran);
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let lane = SerialLane::spawn("test", |_: ()| {});
        let handle = lane.handle();
        drop(lane);

        assert!(!handle.submit(()));
    }
}
