//! Object pools with reference-counted loans
//!
//! A [`Loan`] is a shared handle to a pool item. Clones share the same item;
//! when the last clone drops, the item returns to its pool and wakes one
//! blocked borrower. Items keep their state between loans, so pools can hold
//! pre-sized scratch structures that are reused draw after draw.

use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex};

struct Shared<T> {
    free: Mutex<Vec<T>>,
    returned: Condvar,
}

impl<T> Shared<T> {
    fn restore(&self, value: T) {
        let mut free = self.free.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        free.push(value);
        drop(free);
        self.returned.notify_one();
    }
}

struct LoanInner<T> {
    value: T,
    shared: Arc<Shared<T>>,
}

/// A reference-counted loan of a pool item.
///
/// Dereferences to the item. [`Loan::get_mut`] gives mutable access while the
/// loan has not been cloned, which is how a stage prepares an item before
/// handing it to concurrent successors.
pub struct Loan<T> {
    inner: Option<Arc<LoanInner<T>>>,
}

impl<T> Loan<T> {
    fn new(value: T, shared: Arc<Shared<T>>) -> Self {
        Self {
            inner: Some(Arc::new(LoanInner { value, shared })),
        }
    }

    /// Mutable access to the loaned item, available only while this is the
    /// sole handle to it.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let inner = self.inner.as_mut()?;
        Arc::get_mut(inner).map(|i| &mut i.value)
    }
}

impl<T> Deref for Loan<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // The option is only empty mid-drop.
        &self.inner.as_ref().unwrap().value
    }
}

impl<T> Clone for Loan<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Loan<T> {
    fn drop(&mut self) {
        if let Some(arc) = self.inner.take() {
            // The last clone returns the item to its pool.
            if let Ok(inner) = Arc::try_unwrap(arc) {
                inner.shared.restore(inner.value);
            }
        }
    }
}

/// A pool holding a fixed number of items.
///
/// [`FixedPool::borrow`] blocks until an item is available, which is the
/// back-pressure mechanism bounding how much pipeline work can be in flight.
pub struct FixedPool<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
}

impl<T> FixedPool<T> {
    /// Creates a pool owning the given items.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let free: Vec<T> = items.into_iter().collect();
        let capacity = free.len();
        Self {
            shared: Arc::new(Shared {
                free: Mutex::new(free),
                returned: Condvar::new(),
            }),
            capacity,
        }
    }

    /// Creates a pool of `capacity` default-constructed items.
    pub fn with_capacity(capacity: usize) -> Self
    where
        T: Default,
    {
        Self::new((0..capacity).map(|_| T::default()))
    }

    /// Borrows an item, blocking until one is available.
    pub fn borrow(&self) -> Loan<T> {
        let mut free = self
            .shared
            .free
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if let Some(value) = free.pop() {
                return Loan::new(value, Arc::clone(&self.shared));
            }
            free = self
                .shared
                .returned
                .wait(free)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Borrows an item if one is available right now.
    pub fn try_borrow(&self) -> Option<Loan<T>> {
        let mut free = self
            .shared
            .free
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        free.pop().map(|value| Loan::new(value, Arc::clone(&self.shared)))
    }

    /// The number of items not currently loaned out.
    pub fn available(&self) -> usize {
        self.shared
            .free
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// The total number of items the pool owns.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A pool that grows on demand instead of blocking.
pub struct UnboundedPool<T: Default> {
    shared: Arc<Shared<T>>,
}

impl<T: Default> UnboundedPool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                free: Mutex::new(Vec::new()),
                returned: Condvar::new(),
            }),
        }
    }

    /// Borrows an item, constructing a new one when none are free.
    pub fn borrow(&self) -> Loan<T> {
        let value = {
            let mut free = self
                .shared
                .free
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            free.pop()
        };
        Loan::new(value.unwrap_or_default(), Arc::clone(&self.shared))
    }
}

impl<T: Default> Default for UnboundedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn borrow_and_drop_restore_pool_count() {
        let pool: FixedPool<Vec<u8>> = FixedPool::with_capacity(4);
        assert_eq!(pool.available(), 4);
        let a = pool.borrow();
        let b = pool.borrow();
        assert_eq!(pool.available(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn clones_share_one_item() {
        let pool: FixedPool<u32> = FixedPool::new([7]);
        let a = pool.borrow();
        let b = a.clone();
        assert_eq!(pool.available(), 0);
        drop(a);
        // Still loaned through the clone.
        assert_eq!(pool.available(), 0);
        assert_eq!(*b, 7);
        drop(b);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn get_mut_requires_a_unique_handle() {
        let pool: FixedPool<u32> = FixedPool::new([0]);
        let mut a = pool.borrow();
        *a.get_mut().unwrap() = 42;
        let b = a.clone();
        assert!(a.get_mut().is_none());
        drop(b);
        assert!(a.get_mut().is_some());
    }

    #[test]
    fn items_preserve_state_between_loans() {
        let pool: FixedPool<Vec<u8>> = FixedPool::with_capacity(1);
        {
            let mut loan = pool.borrow();
            loan.get_mut().unwrap().push(9);
        }
        let loan = pool.borrow();
        assert_eq!(loan.as_slice(), &[9]);
    }

    #[test]
    fn borrow_blocks_until_an_item_returns() {
        let pool = Arc::new(FixedPool::<u32>::new([1]));
        let loan = pool.borrow();
        let observed = Arc::new(AtomicBool::new(false));

        let thread = {
            let pool = Arc::clone(&pool);
            let observed = Arc::clone(&observed);
            std::thread::spawn(move || {
                let _loan = pool.borrow();
                observed.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!observed.load(Ordering::SeqCst));
        drop(loan);
        thread.join().unwrap();
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn unbounded_pool_grows_instead_of_blocking() {
        let pool: UnboundedPool<Vec<u8>> = UnboundedPool::new();
        let a = pool.borrow();
        let b = pool.borrow();
        drop(a);
        drop(b);
        let _c = pool.borrow();
    }
}
