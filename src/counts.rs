//! Atomic reference counters.
//!
//! A control block carries two of these: the strong count and the weak
//! count. `put` reports the transition to zero, which is the only point
//! where the caller may tear anything down.

use std::sync::atomic::{fence, AtomicUsize, Ordering};

/// Counts above this abort the process, matching `std::sync::Arc`.
const MAX_REFCOUNT: usize = isize::MAX as usize;

#[derive(Debug)]
pub(crate) struct AtomicCount {
    count: AtomicUsize,
}

impl AtomicCount {
    pub(crate) const fn new(initial: usize) -> Self {
        Self {
            count: AtomicUsize::new(initial),
        }
    }

    /// Acquire one counted reference.
    ///
    /// A new reference can only be minted from an existing one, so no
    /// ordering with other operations is needed here.
    #[inline]
    pub(crate) fn get(&self) {
        let old = self.count.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    /// Return one counted reference. Returns true if the count is now zero.
    ///
    /// The release decrement publishes this holder's writes; the acquire
    /// fence on the zero transition makes all of them visible to the caller
    /// that is about to destroy or deallocate.
    #[inline]
    pub(crate) fn put(&self) -> bool {
        let old = self.count.fetch_sub(1, Ordering::Release);
        debug_assert!(old > 0, "AtomicCount underflow");
        if old != 1 {
            return false;
        }
        fence(Ordering::Acquire);
        true
    }

    /// Acquire one counted reference unless the count already reached zero.
    #[inline]
    pub(crate) fn try_get(&self) -> bool {
        let mut n = self.count.load(Ordering::Relaxed);
        loop {
            if n == 0 {
                return false;
            }
            if n > MAX_REFCOUNT {
                std::process::abort();
            }
            match self
                .count
                .compare_exchange_weak(n, n + 1, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(seen) => n = seen,
            }
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::AtomicCount;

    #[test]
    fn put_reports_zero_transition() {
        let c = AtomicCount::new(1);
        c.get();
        assert_eq!(c.load(), 2);
        assert!(!c.put());
        assert!(c.put());
        assert_eq!(c.load(), 0);
    }

    #[test]
    fn try_get_fails_once_zero() {
        let c = AtomicCount::new(1);
        assert!(c.try_get());
        assert!(!c.put());
        assert!(c.put());
        assert!(!c.try_get());
        assert_eq!(c.load(), 0);
    }

    #[test]
    fn concurrent_get_put_balances() {
        let c = AtomicCount::new(1);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        c.get();
                        assert!(!c.put());
                    }
                });
            }
        });
        assert_eq!(c.load(), 1);
    }
}
