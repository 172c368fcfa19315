//! Counter for waiting on a group of tasks

use std::sync::{Arc, Condvar, Mutex};

struct Data {
    count: Mutex<u32>,
    condition: Condvar,
}

/// Waits for a counted set of tasks to finish.
///
/// Clones share the counter. Every `add` must be balanced by a `done`;
/// `wait` returns once the counter reaches zero.
#[derive(Clone)]
pub struct WaitGroup {
    data: Arc<Data>,
}

impl WaitGroup {
    /// Creates a wait group with an initial count.
    #[must_use]
    pub fn new(initial_count: u32) -> Self {
        Self {
            data: Arc::new(Data {
                count: Mutex::new(initial_count),
                condition: Condvar::new(),
            }),
        }
    }

    /// Increments the counter by `count`.
    pub fn add(&self, count: u32) {
        let mut current = self
            .data
            .count
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *current += count;
    }

    /// Decrements the counter. Returns `true` when the counter hit zero.
    ///
    /// # Panics
    ///
    /// Panics if called more times than the counter was incremented.
    pub fn done(&self) -> bool {
        let mut current = self
            .data
            .count
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert!(*current > 0, "WaitGroup::done() called too many times");
        *current -= 1;
        if *current == 0 {
            drop(current);
            self.data.condition.notify_all();
            true
        } else {
            false
        }
    }

    /// Blocks until the counter reaches zero.
    pub fn wait(&self) {
        let mut current = self
            .data
            .count
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while *current != 0 {
            current = self
                .data
                .condition
                .wait(current)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_returns_once_all_done() {
        let group = WaitGroup::new(2);
        let worker = {
            let group = group.clone();
            std::thread::spawn(move || {
                group.done();
                group.done();
            })
        };
        group.wait();
        worker.join().unwrap();
    }

    #[test]
    fn done_reports_reaching_zero() {
        let group = WaitGroup::new(2);
        assert!(!group.done());
        assert!(group.done());
    }

    #[test]
    #[should_panic(expected = "called too many times")]
    fn unbalanced_done_panics() {
        let group = WaitGroup::new(0);
        group.done();
    }
}
