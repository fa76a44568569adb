//! [`PublishChannel`] – one guarded sample plus its dirty flag.
//!
//! Producers overwrite the sample and raise the flag; the publish scheduler
//! takes a copy and lowers the flag in the same critical section, so a
//! publish never sees half of one update and half of another, and a burst of
//! updates between two ticks is coalesced into the latest value.

use std::sync::{Mutex, MutexGuard, PoisonError};

struct Slot<T> {
    sample: T,
    dirty: bool,
}

/// A single-value mailbox with "unpublished changes" tracking.
pub struct PublishChannel<T> {
    slot: Mutex<Slot<T>>,
}

impl<T: Clone> PublishChannel<T> {
    /// Create a clean channel seeded with `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            slot: Mutex::new(Slot {
                sample: initial,
                dirty: false,
            }),
        }
    }

    /// Mutate the sample in place and mark the channel dirty.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut slot = self.lock();
        let out = f(&mut slot.sample);
        slot.dirty = true;
        out
    }

    /// Copy of the current sample; the dirty flag is untouched.
    pub fn snapshot(&self) -> T {
        self.lock().sample.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// If dirty, clear the flag and return the sample; otherwise `None`.
    pub fn take_dirty(&self) -> Option<T> {
        let mut slot = self.lock();
        if !slot.dirty {
            return None;
        }
        slot.dirty = false;
        Some(slot.sample.clone())
    }

    /// Replace the sample and clear the flag.
    pub fn reset(&self, value: T) {
        let mut slot = self.lock();
        slot.sample = value;
        slot.dirty = false;
    }

    // A panic while holding the lock leaves a fully-written or untouched
    // sample, so a poisoned slot is still usable.
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Default> Default for PublishChannel<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
