//! Bounded permit pool for outstanding asynchronous transmits.

use crate::PoolError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counted permit pool bounding concurrently outstanding transmits.
///
/// A `None` limit leaves the pool unbounded. Reservation never blocks:
/// a capped pool that is full fails fast with [`PoolError::Exhausted`],
/// which is a local, recoverable condition for the submitting caller.
pub struct TxPermits {
    semaphore: Option<Arc<Semaphore>>,
}

impl TxPermits {
    /// Creates the pool with an optional cap.
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Reserves one permit, failing fast when the cap is reached.
    pub fn try_reserve(&self) -> Result<TxPermit, PoolError> {
        let permit = match &self.semaphore {
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .try_acquire_owned()
                    .map_err(|_| PoolError::Exhausted)?,
            ),
            None => None,
        };
        Ok(TxPermit { _permit: permit })
    }

    /// Currently available permits; `None` for an unbounded pool.
    #[must_use]
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }
}

/// RAII transmit permit; returns to the pool on drop.
pub struct TxPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_pool_exhausts_and_recovers() {
        let permits = TxPermits::new(Some(2));

        let a = permits.try_reserve().unwrap();
        let _b = permits.try_reserve().unwrap();
        assert_eq!(permits.try_reserve().err(), Some(PoolError::Exhausted));

        drop(a);
        assert!(permits.try_reserve().is_ok());
    }

    #[test]
    fn unbounded_pool_never_exhausts() {
        let permits = TxPermits::new(None);
        let held: Vec<_> = (0..64).map(|_| permits.try_reserve().unwrap()).collect();
        assert_eq!(permits.available(), None);
        drop(held);
    }
}
