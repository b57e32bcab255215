//! Global admission control over queued work.
//!
//! Every admitted item holds one unit of capacity from submission until it
//! reaches a terminal status. Reservations fail fast; nothing here blocks.

use std::sync::atomic::{AtomicUsize, Ordering};

use chemaudit_core::error::AdmissionError;

/// Counts pending and running items across every live batch.
#[derive(Debug)]
pub struct AdmissionControl {
    capacity: usize,
    reserved: AtomicUsize,
}

impl AdmissionControl {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            reserved: AtomicUsize::new(0),
        }
    }

    /// Reserve `n` units, or fail with `TooLarge` carrying the remaining room.
    pub fn try_reserve(&self, n: usize) -> Result<(), AdmissionError> {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(n)
                    .filter(|next| *next <= self.capacity)
            })
            .map(|_| ())
            .map_err(|current| AdmissionError::TooLarge {
                requested: n,
                limit: self.capacity.saturating_sub(current),
            })
    }

    /// Return `n` units. Saturates at zero.
    pub fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let _ = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(n))
            });
    }

    pub fn in_use(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.in_use())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn reserve_within_capacity() {
        let admission = AdmissionControl::new(10);
        admission.try_reserve(6).unwrap();
        admission.try_reserve(4).unwrap();
        assert_eq!(admission.in_use(), 10);
        assert_eq!(admission.available(), 0);
    }

    #[test]
    fn reserve_beyond_capacity_fails_fast() {
        let admission = AdmissionControl::new(10);
        admission.try_reserve(7).unwrap();

        assert_matches!(
            admission.try_reserve(4),
            Err(AdmissionError::TooLarge {
                requested: 4,
                limit: 3
            })
        );
        assert_eq!(admission.in_use(), 7);
    }

    #[test]
    fn release_frees_capacity() {
        let admission = AdmissionControl::new(5);
        admission.try_reserve(5).unwrap();
        admission.release(2);
        admission.try_reserve(2).unwrap();
        assert_eq!(admission.in_use(), 5);
    }

    #[test]
    fn release_saturates_at_zero() {
        let admission = AdmissionControl::new(5);
        admission.try_reserve(1).unwrap();
        admission.release(3);
        assert_eq!(admission.in_use(), 0);
    }
}
