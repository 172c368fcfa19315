//! Work-stealing worker pool
//!
//! Tasks are submitted to a global injector queue; each worker drains a local
//! deque, refills it in batches from the injector, and steals from sibling
//! workers when both are empty. Workers park on a condition variable when no
//! work exists anywhere.
//!
//! Two execution modes exist: the multi-threaded pool described above, and a
//! single-threaded mode that runs every task inline at `spawn`, giving
//! deterministic execution for tests.

use crossbeam::deque::{Injector, Stealer, Worker as WorkerQueue};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::config::ProcessorConfig;
use crate::task::Task;

/// Upper bound on pool size regardless of configuration.
const MAX_WORKERS: usize = 64;

struct SleepState {
    generation: u64,
    shutdown: bool,
}

struct Shared {
    injector: Injector<Task>,
    stealers: Vec<Stealer<Task>>,
    sleep: Mutex<SleepState>,
    wakeup: Condvar,
}

impl Shared {
    fn notify(&self) {
        let mut sleep = self
            .sleep
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sleep.generation = sleep.generation.wrapping_add(1);
        drop(sleep);
        self.wakeup.notify_all();
    }
}

/// Xorshift generator used to randomize steal victims.
struct FastRnd {
    x: u64,
}

impl FastRnd {
    const fn new(seed: u64) -> Self {
        // A zero state would stay zero forever.
        Self {
            x: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    fn next(&mut self) -> u64 {
        self.x ^= self.x << 13;
        self.x ^= self.x >> 7;
        self.x ^= self.x << 17;
        self.x
    }
}

/// The worker pool tasks are scheduled onto.
///
/// Cheap to share via `Arc`; dropping the last handle shuts the workers down
/// after their queues drain of running tasks.
pub struct Scheduler {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl Scheduler {
    /// Creates a pool sized and bound according to `config`.
    #[must_use]
    pub fn new(config: &ProcessorConfig) -> Self {
        Self::with_seed(config, 0x5EED_0F_5EED)
    }

    /// Creates a pool with an explicit seed for the steal-order generator,
    /// for tests that need reproducible victim selection.
    #[must_use]
    pub fn with_seed(config: &ProcessorConfig, seed: u64) -> Self {
        let config = config.clone().sanitized();
        let count = config.worker_count().clamp(1, MAX_WORKERS);

        let queues: Vec<WorkerQueue<Task>> = (0..count).map(|_| WorkerQueue::new_fifo()).collect();
        let stealers = queues.iter().map(WorkerQueue::stealer).collect();
        let shared = Arc::new(Shared {
            injector: Injector::new(),
            stealers,
            sleep: Mutex::new(SleepState {
                generation: 0,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        });

        let threads = queues
            .into_iter()
            .enumerate()
            .map(|(index, queue)| {
                let shared = Arc::clone(&shared);
                let config = config.clone();
                std::thread::Builder::new()
                    .name(format!("softrast-worker-{index}"))
                    .spawn(move || {
                        bind_affinity(&config, index);
                        worker_loop(&shared, &queue, index, seed);
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        log::debug!("scheduler started with {count} workers");
        Self {
            shared,
            threads,
            worker_count: count,
        }
    }

    /// Creates a scheduler that runs every task inline at [`Scheduler::spawn`].
    ///
    /// Execution order is then exactly submission order, which makes pipeline
    /// output reproducible for tests.
    #[must_use]
    pub fn single_threaded() -> Self {
        Self {
            shared: Arc::new(Shared {
                injector: Injector::new(),
                stealers: Vec::new(),
                sleep: Mutex::new(SleepState {
                    generation: 0,
                    shutdown: false,
                }),
                wakeup: Condvar::new(),
            }),
            threads: Vec::new(),
            worker_count: 0,
        }
    }

    /// Submits a task for execution.
    pub fn spawn(&self, f: impl FnOnce() + Send + 'static) {
        if self.threads.is_empty() {
            // Single-threaded mode: run inline.
            f();
            return;
        }
        self.shared.injector.push(Box::new(f));
        self.shared.notify();
    }

    /// The number of worker threads, zero in single-threaded mode.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        {
            let mut sleep = self
                .shared
                .sleep
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            sleep.shutdown = true;
        }
        self.shared.wakeup.notify_all();
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

fn worker_loop(shared: &Shared, local: &WorkerQueue<Task>, index: usize, seed: u64) {
    let mut rng = FastRnd::new(seed ^ (index as u64 + 1).wrapping_mul(0xA076_1D64_78BD_642F));
    loop {
        if let Some(task) = find_task(shared, local, &mut rng) {
            task();
            continue;
        }

        let mut sleep = shared
            .sleep
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if sleep.shutdown {
            return;
        }
        // A task may have arrived between the last steal attempt and taking
        // the lock; the generation check catches any notify we raced with.
        if !shared.injector.is_empty() {
            continue;
        }
        let generation = sleep.generation;
        while sleep.generation == generation && !sleep.shutdown && shared.injector.is_empty() {
            sleep = shared
                .wakeup
                .wait(sleep)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        if sleep.shutdown {
            return;
        }
    }
}

fn find_task(shared: &Shared, local: &WorkerQueue<Task>, rng: &mut FastRnd) -> Option<Task> {
    if let Some(task) = local.pop() {
        return Some(task);
    }
    loop {
        let steal = shared.injector.steal_batch_and_pop(local);
        if steal.is_retry() {
            continue;
        }
        if let Some(task) = steal.success() {
            return Some(task);
        }
        break;
    }
    // Steal from a sibling, starting at a random victim.
    let n = shared.stealers.len();
    let start = (rng.next() % n as u64) as usize;
    for i in 0..n {
        let victim = &shared.stealers[(start + i) % n];
        loop {
            let steal = victim.steal();
            if steal.is_retry() {
                continue;
            }
            if let Some(task) = steal.success() {
                return Some(task);
            }
            break;
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn bind_affinity(config: &ProcessorConfig, worker_index: usize) {
    use crate::config::AffinityPolicy;

    let cores: Vec<usize> = (0..64).filter(|i| config.affinity_mask & (1 << i) != 0).collect();
    if cores.is_empty() {
        return;
    }
    let selected: Vec<usize> = match config.affinity_policy {
        AffinityPolicy::Any => cores,
        AffinityPolicy::One => vec![cores[worker_index % cores.len()]],
    };

    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for core in selected {
            libc::CPU_SET(core, &mut set);
        }
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            log::warn!("failed to set affinity for worker {worker_index}");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn bind_affinity(config: &ProcessorConfig, _worker_index: usize) {
    if config.affinity_mask != u64::MAX {
        log::debug!("thread affinity is not supported on this platform");
    }
}
