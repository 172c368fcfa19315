//! Draw queries
//!
//! Queries attach to the renderer and are added to every draw created while
//! active. Occlusion results accumulate the per-cluster counters a draw
//! gathers; timestamps record when a draw retires.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// What a query measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Samples passing the depth test.
    Occlusion,
    /// Wall-clock time at draw retirement, in nanoseconds.
    Timestamp,
}

/// An asynchronous query resolved at draw retirement.
pub struct Query {
    query_type: QueryType,
    value: AtomicU64,
    finished: AtomicBool,
}

impl Query {
    /// Creates a reset query.
    #[must_use]
    pub const fn new(query_type: QueryType) -> Self {
        Self {
            query_type,
            value: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    /// What this query measures.
    #[must_use]
    pub const fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// The accumulated value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Whether at least one draw has resolved into this query.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Clears the value and the finished flag.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Release);
        self.finished.store(false, Ordering::Release);
    }

    /// Folds one draw's result into the query.
    pub(crate) fn resolve(&self, occlusion: u64) {
        match self.query_type {
            QueryType::Occlusion => {
                self.value.fetch_add(occlusion, Ordering::AcqRel);
            }
            QueryType::Timestamp => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos() as u64);
                self.value.store(now, Ordering::Release);
            }
        }
        self.finished.store(true, Ordering::Release);
    }
}
