//! # Fixed Slab
//!
//! Typed fixed-capacity storage for objects that are not plain data
//! (entities and views hold handles, so they cannot live in byte pools).

use super::slots::SlotAllocator;
use crate::error::EcsResult;

/// A slab of `Option<T>` slots with lowest-free-first reuse.
///
/// All slots are created up front; inserting and removing never grows the
/// storage.
///
/// # Thread Safety
///
/// This slab is NOT thread-safe. Use one per owner or wrap in a mutex.
///
/// # Example
///
/// ```rust,ignore
/// let mut slab: FixedSlab<ViewObject> = FixedSlab::new(1024);
///
/// let index = slab.insert(view)?;
/// slab.remove(index);
/// ```
#[derive(Debug)]
pub struct FixedSlab<T> {
    /// The storage array.
    storage: Box<[Option<T>]>,
    /// Slot bookkeeping.
    slots: SlotAllocator,
}

impl<T> FixedSlab<T> {
    /// Creates a slab with the specified capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let storage: Vec<Option<T>> = (0..capacity).map(|_| None).collect();
        Self {
            storage: storage.into_boxed_slice(),
            slots: SlotAllocator::new(capacity),
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Returns the number of stored objects.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.live_count()
    }

    /// Returns `true` if nothing is stored.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.live_count() == 0
    }

    /// Returns the high-water mark.
    #[inline]
    #[must_use]
    pub const fn high_water(&self) -> usize {
        self.slots.size()
    }

    /// Stores `value` in the lowest free slot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::CapacityExceeded`] if the slab is full.
    pub fn insert(&mut self, value: T) -> EcsResult<usize> {
        let index = self.slots.allocate()?;
        self.storage[index] = Some(value);
        Ok(index)
    }

    /// Takes the object out of a slot, freeing it.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.storage.get_mut(index)?.take()?;
        // Occupancy mirrors `storage`, so this cannot fail.
        let _ = self.slots.deallocate(index);
        Some(value)
    }

    /// Gets a stored object.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.storage.get(index)?.as_ref()
    }

    /// Gets a mutable stored object.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.storage.get_mut(index)?.as_mut()
    }

    /// Iterates over stored objects with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.storage
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|v| (index, v)))
    }
}
