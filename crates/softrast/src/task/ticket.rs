//! Dependency-ordered ticket queue
//!
//! A [`TicketQueue`] hands out [`Ticket`]s in order. A ticket is *called*
//! exactly when every earlier ticket from the same queue is done, and *done*
//! once the work it represents finishes. Callers either block on
//! [`Ticket::wait`] or register a continuation with [`Ticket::on_call`];
//! continuations run on the queue's scheduler.
//!
//! Tickets are reference counted: if the last handle to a ticket drops
//! without an explicit [`Ticket::done`], it is marked done automatically, so
//! a chain can never stall on a forgotten release.

use slab::Slab;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::task::{Scheduler, Task};

struct Record {
    prev: Option<usize>,
    next: Option<usize>,
    called: bool,
    done: bool,
    on_call: Vec<Task>,
    refs: u32,
}

struct QueueState {
    records: Slab<Record>,
    tail: Option<usize>,
}

struct QueueShared {
    scheduler: Arc<Scheduler>,
    state: Mutex<QueueState>,
    called: Condvar,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// An ordered queue of tickets.
pub struct TicketQueue {
    shared: Arc<QueueShared>,
}

impl TicketQueue {
    /// Creates a queue whose continuations run on `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                scheduler,
                state: Mutex::new(QueueState {
                    records: Slab::new(),
                    tail: None,
                }),
                called: Condvar::new(),
            }),
        }
    }

    /// Takes a single ticket at the tail of the queue.
    pub fn take(&self) -> Ticket {
        let mut out = None;
        self.take_n(1, |ticket| out = Some(ticket));
        out.expect("take_n(1) must deliver one ticket")
    }

    /// Takes `n` consecutive tickets, invoking `f` with each in order.
    pub fn take_n(&self, n: usize, mut f: impl FnMut(Ticket)) {
        if n == 0 {
            return;
        }
        let mut to_schedule = Vec::new();
        let mut keys = Vec::with_capacity(n);
        {
            let mut state = self.shared.lock();
            let mut prev = state.tail;
            let chain_start_is_head = prev.is_none();
            for _ in 0..n {
                let key = state.records.insert(Record {
                    prev,
                    next: None,
                    called: false,
                    done: false,
                    on_call: Vec::new(),
                    refs: 1,
                });
                if let Some(p) = prev {
                    state.records[p].next = Some(key);
                }
                keys.push(key);
                prev = Some(key);
            }
            state.tail = prev;
            if chain_start_is_head {
                call_record(&mut state, keys[0], &mut to_schedule);
            }
        }
        self.shared.called.notify_all();
        for task in to_schedule {
            self.shared.scheduler.spawn(task);
        }
        for key in keys {
            f(Ticket {
                shared: Arc::clone(&self.shared),
                key,
            });
        }
    }
}

/// Marks `key` as called and collects its pending continuations.
fn call_record(state: &mut QueueState, key: usize, to_schedule: &mut Vec<Task>) {
    let record = &mut state.records[key];
    if record.called {
        return;
    }
    record.called = true;
    to_schedule.append(&mut record.on_call);
}

/// Unlinks `key` after it is done and promotes its successor to head if the
/// record was at the head of the chain.
fn finish_record(state: &mut QueueState, key: usize, to_schedule: &mut Vec<Task>) {
    let record = &mut state.records[key];
    if record.done {
        return;
    }
    record.done = true;
    record.called = true;
    // Continuations registered but never called are discarded; running them
    // here would break the ordering contract.
    record.on_call.clear();
    let prev = record.prev.take();
    let next = record.next.take();

    if let Some(p) = prev {
        state.records[p].next = next;
    }
    if let Some(n) = next {
        state.records[n].prev = prev;
    }
    if state.tail == Some(key) {
        state.tail = prev;
    }
    if prev.is_none() {
        if let Some(n) = next {
            call_record(state, n, to_schedule);
        }
    }
}

/// A position in a [`TicketQueue`].
pub struct Ticket {
    shared: Arc<QueueShared>,
    key: usize,
}

impl Ticket {
    /// Blocks until this ticket is called.
    pub fn wait(&self) {
        let mut state = self.shared.lock();
        while !state.records[self.key].called {
            state = self
                .shared
                .called
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Runs `f` on the scheduler when this ticket becomes callable.
    ///
    /// If the ticket is already called, `f` is scheduled immediately.
    /// Multiple continuations on one ticket all run, in registration order.
    pub fn on_call(&self, f: impl FnOnce() + Send + 'static) {
        let run_now = {
            let mut state = self.shared.lock();
            let record = &mut state.records[self.key];
            if record.called {
                true
            } else {
                record.on_call.push(Box::new(f));
                return;
            }
        };
        if run_now {
            self.shared.scheduler.spawn(f);
        }
    }

    /// Releases the ticket, making its successor callable. Idempotent.
    pub fn done(&self) {
        let mut to_schedule = Vec::new();
        {
            let mut state = self.shared.lock();
            finish_record(&mut state, self.key, &mut to_schedule);
        }
        self.shared.called.notify_all();
        for task in to_schedule {
            self.shared.scheduler.spawn(task);
        }
    }
}

impl Clone for Ticket {
    fn clone(&self) -> Self {
        self.shared.lock().records[self.key].refs += 1;
        Self {
            shared: Arc::clone(&self.shared),
            key: self.key,
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut to_schedule = Vec::new();
        let notify = {
            let mut state = self.shared.lock();
            let record = &mut state.records[self.key];
            record.refs -= 1;
            if record.refs > 0 {
                false
            } else {
                // A forgotten done() must not stall the chain.
                let was_done = record.done;
                finish_record(&mut state, self.key, &mut to_schedule);
                state.records.remove(self.key);
                !was_done
            }
        };
        if notify {
            self.shared.called.notify_all();
        }
        for task in to_schedule {
            self.shared.scheduler.spawn(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queue() -> TicketQueue {
        TicketQueue::new(Arc::new(Scheduler::single_threaded()))
    }

    #[test]
    fn first_ticket_is_called_immediately() {
        let queue = queue();
        let ticket = queue.take();
        ticket.wait();
        ticket.done();
    }

    #[test]
    fn tickets_are_called_in_fifo_order() {
        let queue = queue();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tickets = Vec::new();
        queue.take_n(3, |t| tickets.push(t));
        for (i, ticket) in tickets.iter().enumerate() {
            let order = Arc::clone(&order);
            ticket.on_call(move || order.lock().unwrap().push(i));
        }
        // Only the head has been called so far.
        assert_eq!(order.lock().unwrap().as_slice(), &[0]);
        tickets[0].done();
        assert_eq!(order.lock().unwrap().as_slice(), &[0, 1]);
        tickets[1].done();
        tickets[2].done();
        assert_eq!(order.lock().unwrap().as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn on_call_after_called_runs_immediately() {
        let queue = queue();
        let ticket = queue.take();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        ticket.on_call(move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_continuations_all_run() {
        let queue = queue();
        let mut tickets = Vec::new();
        queue.take_n(2, |t| tickets.push(t));
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            tickets[1].on_call(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tickets[0].done();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn done_is_idempotent() {
        let queue = queue();
        let mut tickets = Vec::new();
        queue.take_n(2, |t| tickets.push(t));
        tickets[0].done();
        tickets[0].done();
        tickets[1].wait();
    }

    #[test]
    fn dropping_the_last_handle_releases_the_ticket() {
        let queue = queue();
        let mut tickets = Vec::new();
        queue.take_n(2, |t| tickets.push(t));
        let second = tickets.pop().unwrap();
        let first = tickets.pop().unwrap();
        let clone = first.clone();
        drop(first);
        // Still referenced by the clone, so the successor stays blocked.
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        second.on_call(move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        drop(clone);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        second.wait();
    }

    #[test]
    fn later_chains_append_after_existing_tail() {
        let queue = queue();
        let a = queue.take();
        let b = queue.take();
        let called = Arc::new(AtomicUsize::new(0));
        let called2 = Arc::clone(&called);
        b.on_call(move || {
            called2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(called.load(Ordering::SeqCst), 0);
        a.done();
        assert_eq!(called.load(Ordering::SeqCst), 1);
        b.done();
    }
}
