//! # Object Pool
//!
//! Fixed-size block allocator for plain-old-data objects.
//!
//! The pool is configured in two steps: [`ObjectPool::new`] records the
//! geometry, [`ObjectPool::allocate_memory`] reserves and zero-fills one
//! word-aligned block per slot. After that, slots are handed out and returned
//! without touching the heap.
//!
//! ## Locking
//!
//! Slot bookkeeping and slot data are locked separately. `allocate` and
//! `deallocate` hold the bookkeeping lock only while the index moves, and
//! every slot's bytes sit behind their own mutex:
//!
//! ```text
//! slots: Mutex<SlotAllocator>        memory: [Mutex<MemoryBlock>; capacity]
//!        (index bookkeeping)                  (one lock per object)
//! ```
//!
//! A slot lock may be held while taking the bookkeeping lock, never the
//! other way round.

use bytemuck::Pod;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use super::slots::SlotAllocator;
use crate::config::limits::MAX_COMPONENT_ALIGN;
use crate::error::{EcsError, EcsResult};

const WORD: usize = std::mem::size_of::<u64>();
/// Zero-filled, word-aligned byte block.
///
/// Backed by `u64` words so the start of the block is aligned for any type
/// with alignment up to [`MAX_COMPONENT_ALIGN`].
#[derive(Debug)]
pub struct MemoryBlock {
    words: Box<[u64]>,
    len: usize,
}

impl MemoryBlock {
    /// Allocates `len` zeroed bytes.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        let word_count = len.div_ceil(std::mem::size_of::<u64>());
        Self {
            words: vec![0u64; word_count].into_boxed_slice(),
            len,
        }
    }

    /// Returns the size in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-byte block.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the block as bytes.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    /// Returns the block as mutable bytes.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }
}

/// Snapshot of a pool's occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total slots.
    pub capacity: usize,
    /// Currently allocated slots.
    pub live: usize,
    /// Slots handed out at least once.
    pub high_water: usize,
}

/// A pool of equally sized, zero-initialized object slots.
///
/// # Thread Safety
///
/// Every runtime operation takes `&self`. Locking one slot's data blocks
/// only other access to that slot.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = ObjectPool::new(16, 4, 128)?;
/// pool.allocate_memory()?;
///
/// let index = pool.allocate()?;
/// pool.get::<Position>(index).unwrap().x = 1.0;
/// pool.deallocate(index)?; // slot bytes are zeroed again
/// ```
#[derive(Debug)]
pub struct ObjectPool {
    /// Size of one object in bytes.
    object_size: usize,
    /// Bytes reserved per slot, rounded up to whole words.
    stride: usize,
    /// Slot bookkeeping.
    slots: Mutex<SlotAllocator>,
    /// One block per slot, present after `allocate_memory`.
    memory: Option<Box<[Mutex<MemoryBlock>]>>,
}

impl ObjectPool {
    /// Configures pool geometry without reserving memory.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnsupportedAlignment`] if `align` is not a power
    /// of two or exceeds [`MAX_COMPONENT_ALIGN`].
    pub fn new(object_size: usize, align: usize, capacity: usize) -> EcsResult<Self> {
        if !align.is_power_of_two() || align > MAX_COMPONENT_ALIGN {
            return Err(EcsError::UnsupportedAlignment {
                name: format!("{object_size}-byte object"),
                align,
                max: MAX_COMPONENT_ALIGN,
            });
        }
        Ok(Self {
            object_size,
            stride: object_size.next_multiple_of(WORD),
            slots: Mutex::new(SlotAllocator::new(capacity)),
            memory: None,
        })
    }

    /// Returns the size of one object in bytes.
    #[inline]
    #[must_use]
    pub const fn object_size(&self) -> usize {
        self.object_size
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.lock().capacity()
    }

    /// Bytes this pool needs once memory is allocated.
    #[inline]
    #[must_use]
    pub fn mem_size(&self) -> usize {
        self.stride * self.capacity()
    }

    /// Returns `true` once backing memory exists.
    #[inline]
    #[must_use]
    pub const fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    /// Reserves and zero-fills the backing memory.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::PoolAlreadyAllocated`] if memory already exists.
    pub fn allocate_memory(&mut self) -> EcsResult<()> {
        if self.memory.is_some() {
            return Err(EcsError::PoolAlreadyAllocated);
        }
        let capacity = self.slots.get_mut().capacity();
        self.memory = Some(
            (0..capacity)
                .map(|_| Mutex::new(MemoryBlock::zeroed(self.object_size)))
                .collect(),
        );
        Ok(())
    }

    /// Frees the backing memory and forgets every slot.
    pub fn release_memory(&mut self) {
        self.memory = None;
        self.slots.get_mut().clear();
    }

    /// Hands out a zeroed slot.
    ///
    /// # Errors
    ///
    /// - [`EcsError::PoolNotAllocated`] before `allocate_memory`
    /// - [`EcsError::CapacityExceeded`] when every slot is live
    pub fn allocate(&self) -> EcsResult<usize> {
        if self.memory.is_none() {
            return Err(EcsError::PoolNotAllocated);
        }
        self.slots.lock().allocate()
    }

    /// Zero-fills a slot and returns it to the free set.
    ///
    /// Waits for any guard on the slot to drop first.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::SlotNotAllocated`] if the slot is not live.
    pub fn deallocate(&self, index: usize) -> EcsResult<()> {
        if !self.is_allocated(index) {
            return Err(EcsError::SlotNotAllocated { index });
        }
        if let Some(slot) = self.slot(index) {
            slot.lock().bytes_mut().fill(0);
        }
        self.slots.lock().deallocate(index)
    }

    /// Checks whether a slot is currently allocated.
    #[inline]
    #[must_use]
    pub fn is_allocated(&self, index: usize) -> bool {
        self.slots.lock().is_allocated(index)
    }

    /// Locks the bytes of a live slot.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<MappedMutexGuard<'_, [u8]>> {
        let block = self.slot(index)?.lock();
        if !self.is_allocated(index) {
            return None;
        }
        Some(MutexGuard::map(block, MemoryBlock::bytes_mut))
    }

    /// Locks a live slot as `T`.
    ///
    /// Returns `None` if the slot is free or `T` does not match the pool's
    /// object size.
    #[must_use]
    pub fn get<T: Pod>(&self, index: usize) -> Option<MappedMutexGuard<'_, T>> {
        if std::mem::size_of::<T>() != self.object_size {
            return None;
        }
        MappedMutexGuard::try_map(self.at(index)?, |bytes| bytemuck::try_from_bytes_mut(bytes).ok()).ok()
    }

    /// Returns occupancy counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let slots = self.slots.lock();
        PoolStats {
            capacity: slots.capacity(),
            live: slots.live_count(),
            high_water: slots.size(),
        }
    }

    fn slot(&self, index: usize) -> Option<&Mutex<MemoryBlock>> {
        self.memory.as_ref()?.get(index)
    }
}
