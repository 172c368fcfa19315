//! # Task Execution Primitives
//!
//! The concurrency layer the draw pipeline is built on:
//!
//! - **Scheduler**: a work-stealing worker pool with an injectable
//!   single-threaded mode for deterministic tests
//! - **Pools**: bounded and unbounded object pools handing out
//!   reference-counted loans that return automatically on drop
//! - **TicketQueue**: an ordered queue of tickets; each ticket becomes
//!   callable exactly when its predecessor is done
//! - **WaitGroup**: a counter the renderer uses to wait for in-flight draws
//!
//! Tasks run to completion; the only blocking points are explicit waits on
//! tickets, wait groups, and empty fixed-size pools. Ordering between
//! dependent pieces of work is expressed by chaining: a task enqueues its
//! successor, or registers it as a ticket continuation.

pub mod pool;
pub mod scheduler;
pub mod ticket;
pub mod wait_group;

pub use pool::{FixedPool, Loan, UnboundedPool};
pub use scheduler::Scheduler;
pub use ticket::{Ticket, TicketQueue};
pub use wait_group::WaitGroup;

/// A unit of work executed by the scheduler.
pub(crate) type Task = Box<dyn FnOnce() + Send>;
