//! # Slot Bookkeeping
//!
//! Index allocation shared by every pool:
//! - A high-water mark of slots ever handed out
//! - A min-heap of freed slots below that mark
//! - An occupancy table so double frees are caught

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::{EcsError, EcsResult};

/// Identity of one allocation of a pool slot.
///
/// The key is split into two parts:
/// - Lower 32 bits: slot index
/// - Upper 32 bits: generation, bumped each time the slot is freed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SlotKey(u64);

impl SlotKey {
    /// Creates a key from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation the slot had when this key was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

/// Fixed-capacity slot index allocator.
///
/// `allocate` always prefers the lowest previously freed index over
/// extending the high-water mark, so reuse is deterministic.
///
/// # Thread Safety
///
/// Not internally synchronized. Owners serialize access with their own lock.
#[derive(Debug)]
pub struct SlotAllocator {
    /// Total capacity.
    capacity: usize,
    /// High-water mark: slots `0..size` have been handed out at least once.
    size: usize,
    /// Freed slots below the high-water mark, lowest first.
    free: BinaryHeap<Reverse<usize>>,
    /// Which slots are currently allocated.
    occupied: Box<[bool]>,
    /// Number of currently allocated slots.
    live: usize,
}

impl SlotAllocator {
    /// Creates an allocator for `capacity` slots.
    ///
    /// The free heap is pre-sized so freeing never reallocates.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            size: 0,
            free: BinaryHeap::with_capacity(capacity),
            occupied: vec![false; capacity].into_boxed_slice(),
            live: 0,
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the high-water mark.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of currently allocated slots.
    #[inline]
    #[must_use]
    pub const fn live_count(&self) -> usize {
        self.live
    }

    /// Checks whether a slot is currently allocated.
    #[inline]
    #[must_use]
    pub fn is_allocated(&self, index: usize) -> bool {
        self.occupied.get(index).copied().unwrap_or(false)
    }

    /// Hands out a free slot index.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CapacityExceeded`] when every slot is live.
    pub fn allocate(&mut self) -> EcsResult<usize> {
        let index = if let Some(Reverse(index)) = self.free.pop() {
            index
        } else if self.size < self.capacity {
            self.size += 1;
            self.size - 1
        } else {
            return Err(EcsError::CapacityExceeded {
                resource: "pool",
                capacity: self.capacity,
            });
        };

        self.occupied[index] = true;
        self.live += 1;
        Ok(index)
    }

    /// Returns a slot to the free set.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::SlotNotAllocated`] if the slot is out of range or
    /// already free.
    pub fn deallocate(&mut self, index: usize) -> EcsResult<()> {
        if !self.is_allocated(index) {
            return Err(EcsError::SlotNotAllocated { index });
        }
        self.occupied[index] = false;
        self.live -= 1;
        self.free.push(Reverse(index));
        Ok(())
    }

    /// Forgets every allocation.
    pub fn clear(&mut self) {
        self.free.clear();
        self.occupied.fill(false);
        self.size = 0;
        self.live = 0;
    }

    /// Iterates over currently allocated indices in ascending order.
    pub fn iter_allocated(&self) -> impl Iterator<Item = usize> + '_ {
        self.occupied[..self.size]
            .iter()
            .enumerate()
            .filter_map(|(index, live)| live.then_some(index))
    }
}
