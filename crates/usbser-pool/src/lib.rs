//! Generation-checked resource pools for the USB-to-serial host class
//! subsystem.
//!
//! This crate provides the two pools the class subsystem is built on:
//!
//! - [`FnctPool<T>`]: a slot arena handing out opaque, generation-tagged
//!   [`Handle`]s with shared/exclusive timed acquisition. Every public
//!   operation of the class subsystem brackets its work between an acquire
//!   and the RAII release of the returned guard, so a free racing with an
//!   in-progress operation is serialized by the pool itself rather than by
//!   ad-hoc flags.
//! - [`TxPermits`]: a counted permit pool bounding the number of
//!   concurrently outstanding asynchronous transmits.
//!
//! # Handle validity
//!
//! A [`Handle`] is only valid while the slot it refers to holds the same
//! occupant it was issued for. [`FnctPool::free`] bumps the slot generation,
//! so a stale handle is rejected with [`PoolError::InvalidHandle`] even if
//! the slot index has since been reissued to a different resource.
//!
//! # Example
//!
//! ```
//! use usbser_pool::FnctPool;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let pool: FnctPool<String> = FnctPool::new(Some(4));
//!
//! let handle = pool.allocate("port".to_string()).await.unwrap();
//! {
//!     let port = pool.acquire(handle, Some(Duration::from_secs(1))).await.unwrap();
//!     assert_eq!(*port, "port");
//! } // guard dropped, slot released
//!
//! pool.free(handle).await.unwrap();
//! assert!(pool.acquire(handle, None).await.is_err());
//! # });
//! ```

use crossbeam_queue::SegQueue;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;

mod permits;

pub use permits::{TxPermit, TxPermits};

/// Errors produced by the pools in this crate.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The handle does not refer to a live resource (never issued, freed,
    /// or the slot has been reissued since).
    #[error("handle does not refer to a live resource")]
    InvalidHandle,

    /// A zero-duration acquisition could not complete immediately.
    #[error("acquisition would block")]
    WouldBlock,

    /// The acquisition wait expired.
    #[error("timed out waiting for resource")]
    Timeout,

    /// A bounded pool has no free slots or permits left.
    #[error("pool exhausted")]
    Exhausted,
}

/// Opaque reference to a pool slot.
///
/// Handles are cheap to copy and remain safe to present after the
/// underlying resource is gone; stale handles fail acquisition with
/// [`PoolError::InvalidHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index, for diagnostics only.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }
}

struct SlotInner<T> {
    generation: u32,
    occupant: Option<T>,
}

type SlotCell<T> = Arc<RwLock<SlotInner<T>>>;

/// Slot arena with generation-tagged handles and shared/exclusive timed
/// acquisition.
///
/// Bounded pools (`new(Some(n))`) preallocate `n` slots and fail allocation
/// with [`PoolError::Exhausted`] beyond that. Growable pools (`new(None)`)
/// append slots on demand; growth is logged as backpressure.
///
/// The slot table only ever appends, so indices stay stable for the pool's
/// lifetime and recycled slots keep their lock state across occupants.
pub struct FnctPool<T> {
    slots: parking_lot::RwLock<Vec<SlotCell<T>>>,
    free: SegQueue<u32>,
    capacity: Option<usize>,
}

impl<T: Send + Sync + 'static> FnctPool<T> {
    /// Creates a pool. `Some(n)` bounds it to `n` slots (preallocated);
    /// `None` grows on demand.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        let prealloc = capacity.unwrap_or(0);
        let slots = (0..prealloc).map(|_| Self::empty_slot()).collect();

        let free = SegQueue::new();
        for index in 0..prealloc {
            free.push(index as u32);
        }

        Self {
            slots: parking_lot::RwLock::new(slots),
            free,
            capacity,
        }
    }

    fn empty_slot() -> SlotCell<T> {
        Arc::new(RwLock::new(SlotInner {
            generation: 0,
            occupant: None,
        }))
    }

    /// Total number of slots (live and free).
    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.read().len()
    }

    /// Stores `value` in a free slot and returns its handle.
    ///
    /// Fails with [`PoolError::Exhausted`] when a bounded pool has no slot
    /// left.
    pub async fn allocate(&self, value: T) -> Result<Handle, PoolError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.capacity.is_some() {
                    return Err(PoolError::Exhausted);
                }
                let mut slots = self.slots.write();
                let index = slots.len() as u32;
                slots.push(Self::empty_slot());
                warn!(size = slots.len(), "function pool grew; backpressure");
                index
            }
        };

        let cell = self.cell(index).ok_or(PoolError::InvalidHandle)?;
        let mut inner = cell.write_owned().await;
        inner.occupant = Some(value);

        Ok(Handle {
            index,
            generation: inner.generation,
        })
    }

    /// Acquires the resource in shared mode.
    ///
    /// `timeout` semantics: `None` waits indefinitely, `Some(ZERO)` fails
    /// with [`PoolError::WouldBlock`] unless the slot is immediately
    /// available, any other duration bounds the wait
    /// ([`PoolError::Timeout`] on expiry).
    pub async fn acquire(
        &self,
        handle: Handle,
        timeout: Option<Duration>,
    ) -> Result<FnctRef<T>, PoolError> {
        let cell = self.cell(handle.index).ok_or(PoolError::InvalidHandle)?;

        let guard = match timeout {
            Some(t) if t.is_zero() => cell
                .try_read_owned()
                .map_err(|_| PoolError::WouldBlock)?,
            Some(t) => tokio::time::timeout(t, cell.read_owned())
                .await
                .map_err(|_| PoolError::Timeout)?,
            None => cell.read_owned().await,
        };

        if guard.generation != handle.generation || guard.occupant.is_none() {
            return Err(PoolError::InvalidHandle);
        }

        Ok(FnctRef { guard })
    }

    /// Acquires the resource in exclusive mode.
    ///
    /// Waits for all shared guards to drain. Timeout semantics as
    /// [`FnctPool::acquire`].
    pub async fn acquire_mut(
        &self,
        handle: Handle,
        timeout: Option<Duration>,
    ) -> Result<FnctMut<T>, PoolError> {
        let cell = self.cell(handle.index).ok_or(PoolError::InvalidHandle)?;

        let guard = match timeout {
            Some(t) if t.is_zero() => cell
                .try_write_owned()
                .map_err(|_| PoolError::WouldBlock)?,
            Some(t) => tokio::time::timeout(t, cell.write_owned())
                .await
                .map_err(|_| PoolError::Timeout)?,
            None => cell.write_owned().await,
        };

        if guard.generation != handle.generation || guard.occupant.is_none() {
            return Err(PoolError::InvalidHandle);
        }

        Ok(FnctMut { guard })
    }

    /// Removes the resource and recycles the slot.
    ///
    /// Waits for every outstanding guard to drain, so an operation that
    /// already holds the slot completes before the resource is torn down;
    /// acquisitions that lose the race observe the bumped generation and
    /// fail with [`PoolError::InvalidHandle`].
    pub async fn free(&self, handle: Handle) -> Result<T, PoolError> {
        let cell = self.cell(handle.index).ok_or(PoolError::InvalidHandle)?;

        let mut inner = cell.write_owned().await;
        if inner.generation != handle.generation {
            return Err(PoolError::InvalidHandle);
        }
        let value = inner.occupant.take().ok_or(PoolError::InvalidHandle)?;
        inner.generation = inner.generation.wrapping_add(1);
        drop(inner);

        self.free.push(handle.index);
        Ok(value)
    }

    fn cell(&self, index: u32) -> Option<SlotCell<T>> {
        self.slots.read().get(index as usize).cloned()
    }
}

/// Shared RAII guard over a pooled resource.
///
/// Releases the slot exactly once when dropped.
pub struct FnctRef<T> {
    guard: OwnedRwLockReadGuard<SlotInner<T>>,
}

impl<T> Deref for FnctRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard
            .occupant
            .as_ref()
            .expect("occupant vanished while shared guard held")
    }
}

/// Exclusive RAII guard over a pooled resource.
pub struct FnctMut<T> {
    guard: OwnedRwLockWriteGuard<SlotInner<T>>,
}

impl<T> Deref for FnctMut<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard
            .occupant
            .as_ref()
            .expect("occupant vanished while exclusive guard held")
    }
}

impl<T> DerefMut for FnctMut<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard
            .occupant
            .as_mut()
            .expect("occupant vanished while exclusive guard held")
    }
}
