//! Tick-driven worker pool: `NUM_WORKERS` fixed threads, each with a
//! per-worker task queue, draining session ids handed out by the main (I/O)
//! thread once per tick and completing via work-stealing.
//!
//! Per-session exclusivity (spec.md §3/§5) comes from the `SessionRegistry`'s
//! per-slot `Mutex`, not from any property of the queues themselves: the
//! queues only decide *which* worker calls `tick()` on a given id, and the
//! partition guarantees each dispatched id appears in exactly one queue.
//! Task storage is `Mutex<Vec<u32>>` rather than spec.md §9's raw
//! pointer/atomic design: the mutex is uncontended in the common case (each
//! slot is read by whichever thread's `fetch_sub` claims its index, once),
//! and this is the lock-based alternative spec.md §9 explicitly sanctions.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::warn;

use crate::registry::SessionRegistry;

struct TaskQueue {
    tasks: Mutex<Vec<u32>>,
    count: AtomicI32,
}

impl TaskQueue {
    fn new() -> TaskQueue {
        TaskQueue { tasks: Mutex::new(Vec::new()), count: AtomicI32::new(0) }
    }

    /// Main-thread-only: replaces this queue's contents for the tick about to
    /// run and publishes its size.
    fn fill(&self, ids: &[u32]) {
        *self.tasks.lock().unwrap() = ids.to_vec();
        self.count.store(ids.len() as i32, Ordering::Release);
    }

    /// Claims the next task index, if any remain. Safe to call concurrently
    /// from multiple workers: each call consumes a distinct slot, and calls
    /// past the last real task just observe a negative index and return
    /// `None` without side effects beyond the counter going more negative.
    fn claim(&self) -> Option<u32> {
        let idx = self.count.fetch_sub(1, Ordering::AcqRel) - 1;
        if idx < 0 {
            return None;
        }
        let tasks = self.tasks.lock().unwrap();
        tasks.get(idx as usize).copied()
    }
}

/// Condition-variable pair with a dummy companion mutex, matching spec.md
/// §4.4's `workers_wake`/`main_wake`, the mutex exists only so the condvar
/// has something to block on, not to guard any data.
struct WakePair {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl WakePair {
    fn new() -> WakePair {
        WakePair { mutex: Mutex::new(()), condvar: Condvar::new() }
    }

    fn notify_all(&self) {
        let _guard = self.mutex.lock().unwrap();
        self.condvar.notify_all();
    }

    fn notify_one(&self) {
        let _guard = self.mutex.lock().unwrap();
        self.condvar.notify_one();
    }

    fn wait_while(&self, mut keep_waiting: impl FnMut() -> bool) {
        let guard = self.mutex.lock().unwrap();
        let _guard = self.condvar.wait_while(guard, |_| keep_waiting()).unwrap();
    }
}

/// Fixed-size worker pool driving per-tick physics for every round-running
/// session. Owns the worker threads for its lifetime; `shutdown` joins them.
pub struct WorkerPool {
    queues: Vec<Arc<TaskQueue>>,
    total_remaining: Arc<AtomicI32>,
    workers_wake: Arc<WakePair>,
    main_wake: Arc<WakePair>,
    join_flag: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_workers: usize, registry: Arc<SessionRegistry>, tick_duration_ms: u64) -> WorkerPool {
        let num_workers = num_workers.max(1);
        let queues: Vec<Arc<TaskQueue>> = (0..num_workers).map(|_| Arc::new(TaskQueue::new())).collect();
        let total_remaining = Arc::new(AtomicI32::new(0));
        let workers_wake = Arc::new(WakePair::new());
        let main_wake = Arc::new(WakePair::new());
        let join_flag = Arc::new(AtomicBool::new(false));

        let handles = (0..num_workers)
            .map(|thread_id| {
                let queues = queues.clone();
                let total_remaining = total_remaining.clone();
                let workers_wake = workers_wake.clone();
                let main_wake = main_wake.clone();
                let join_flag = join_flag.clone();
                let registry = registry.clone();
                std::thread::Builder::new()
                    .name(format!("pongd-worker-{thread_id}"))
                    .spawn(move || {
                        worker_loop(
                            thread_id,
                            &queues,
                            &total_remaining,
                            &workers_wake,
                            &main_wake,
                            &join_flag,
                            &registry,
                            tick_duration_ms,
                        )
                    })
                    .expect("failed to spawn session worker thread")
            })
            .collect();

        WorkerPool { queues, total_remaining, workers_wake, main_wake, join_flag, handles }
    }

    /// Partitions `session_ids` as evenly as possible across the worker
    /// queues, wakes every worker, and blocks until all tasks complete.
    /// Called by the I/O thread once per tick cadence.
    pub fn dispatch_tick(&self, session_ids: &[u32]) {
        let num_workers = self.queues.len();
        let n = session_ids.len();
        let mut offset = 0;
        for (i, queue) in self.queues.iter().enumerate() {
            let share = n / num_workers + usize::from(i < n % num_workers);
            queue.fill(&session_ids[offset..offset + share]);
            offset += share;
        }
        debug_assert_eq!(offset, n);

        self.total_remaining.store(n as i32, Ordering::Release);
        self.workers_wake.notify_all();

        if n > 0 {
            self.main_wake.wait_while(|| self.total_remaining.load(Ordering::Acquire) != 0);
        }
    }

    pub fn shutdown(self) {
        self.join_flag.store(true, Ordering::Relaxed);
        self.workers_wake.notify_all();
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("session worker thread panicked during shutdown");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    thread_id: usize,
    queues: &[Arc<TaskQueue>],
    total_remaining: &AtomicI32,
    workers_wake: &WakePair,
    main_wake: &WakePair,
    join_flag: &AtomicBool,
    registry: &SessionRegistry,
    tick_duration_ms: u64,
) {
    let num_workers = queues.len();
    loop {
        workers_wake.wait_while(|| {
            !join_flag.load(Ordering::Relaxed) && queues[thread_id].count.load(Ordering::Acquire) <= 0
        });
        if join_flag.load(Ordering::Relaxed) {
            return;
        }

        let mut completed = 0i32;
        while let Some(session_id) = queues[thread_id].claim() {
            registry.tick_session(session_id, tick_duration_ms);
            completed += 1;
        }

        for offset in 1..num_workers {
            let target = (thread_id + offset) % num_workers;
            while let Some(session_id) = queues[target].claim() {
                registry.tick_session(session_id, tick_duration_ms);
                completed += 1;
            }
        }

        {
            let _guard = main_wake.mutex.lock().unwrap();
            let remaining = total_remaining.fetch_sub(completed, Ordering::AcqRel) - completed;
            if remaining == 0 {
                main_wake.condvar.notify_one();
            }
        }
    }
}
