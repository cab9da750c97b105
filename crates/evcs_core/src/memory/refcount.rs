//! # Pooled Reference Counting
//!
//! Strong and weak handles to pool slots without any per-object heap
//! allocation. Each slot has one atomic word:
//!
//! ```text
//! ┌──────────────── 64 bits ────────────────┐
//! │ generation (32)     │ strong count (32) │
//! └─────────────────────┴───────────────────┘
//! ```
//!
//! - Cloning a strong handle increments the count.
//! - Dropping the last strong handle calls [`SlotOwner::destroy`], which
//!   bumps the generation and then frees the slot.
//! - A weak handle remembers `(index, generation)` and upgrades with a CAS
//!   that only succeeds while the count is non-zero and the generation still
//!   matches. A weak handle can therefore never resolve to a reissued slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::slots::SlotKey;

const COUNT_MASK: u64 = 0xFFFF_FFFF;
const GENERATION_ONE: u64 = 1 << 32;

#[inline]
const fn count_of(word: u64) -> u32 {
    (word & COUNT_MASK) as u32
}

#[inline]
const fn generation_of(word: u64) -> u32 {
    (word >> 32) as u32
}

/// Per-slot generation and strong counts for one pool.
#[derive(Debug)]
pub struct SlotCounts {
    words: Box<[AtomicU64]>,
}

impl SlotCounts {
    /// Creates counters for `capacity` slots, all dead at generation 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Marks a freshly allocated slot as owned by one strong handle.
    ///
    /// Only the allocating caller may touch a slot between allocation and
    /// activation.
    pub fn activate(&self, index: usize) -> SlotKey {
        let word = self.words[index].load(Ordering::Acquire);
        debug_assert_eq!(count_of(word), 0, "activating a live slot");
        self.words[index].store(word | 1, Ordering::Release);
        SlotKey::new(index as u32, generation_of(word))
    }

    /// Adds a strong reference. The caller must already hold one.
    #[inline]
    pub fn retain(&self, index: usize) {
        let previous = self.words[index].fetch_add(1, Ordering::Relaxed);
        debug_assert!(count_of(previous) > 0, "retain on a dead slot");
    }

    /// Drops a strong reference, returning `true` if it was the last one.
    #[inline]
    pub fn release(&self, index: usize) -> bool {
        let previous = self.words[index].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(count_of(previous) > 0, "release on a dead slot");
        count_of(previous) == 1
    }

    /// Tries to add a strong reference to the slot generation named by `key`.
    pub fn upgrade(&self, key: SlotKey) -> bool {
        let Some(word) = self.words.get(key.index() as usize) else {
            return false;
        };
        let mut current = word.load(Ordering::Acquire);
        loop {
            if count_of(current) == 0 || generation_of(current) != key.generation() {
                return false;
            }
            match word.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Invalidates every key issued for the slot's current generation.
    ///
    /// Called once the count is zero and before the slot is freed.
    pub fn retire(&self, index: usize) {
        // Generation wraps after 2^32 reuses; the count is zero here.
        self.words[index].fetch_add(GENERATION_ONE, Ordering::Release);
    }

    /// Returns the key of the slot's current generation, if it is live.
    #[must_use]
    pub fn live_key(&self, index: usize) -> Option<SlotKey> {
        let word = self.words.get(index)?.load(Ordering::Acquire);
        (count_of(word) > 0).then(|| SlotKey::new(index as u32, generation_of(word)))
    }

    /// Checks whether `key` still names a live slot.
    #[must_use]
    pub fn is_live(&self, key: SlotKey) -> bool {
        self.live_key(key.index() as usize) == Some(key)
    }

    /// Returns the strong count of a slot.
    #[must_use]
    pub fn strong_count(&self, index: usize) -> u32 {
        self.words
            .get(index)
            .map_or(0, |word| count_of(word.load(Ordering::Acquire)))
    }
}

/// A pool that hands out reference-counted slots.
///
/// `class` lets one owner host several pools (one per component type).
pub(crate) trait SlotOwner: Send + Sync + 'static {
    /// Returns the counters for one pool.
    fn counts(&self, class: usize) -> &SlotCounts;

    /// Frees a slot whose last strong reference was just dropped.
    ///
    /// Implementations must not hold their lock while dropping anything the
    /// freed object owned.
    fn destroy(&self, class: usize, key: SlotKey);
}

/// Strong reference to a pool slot.
pub(crate) struct PoolRef<O: SlotOwner> {
    owner: Arc<O>,
    class: u16,
    key: SlotKey,
}

impl<O: SlotOwner> PoolRef<O> {
    /// Wraps a slot that was just [`SlotCounts::activate`]d.
    pub(crate) fn adopt(owner: Arc<O>, class: u16, key: SlotKey) -> Self {
        Self { owner, class, key }
    }

    /// Upgrades to the slot named by `key` if it is still alive.
    pub(crate) fn upgrade(owner: &Arc<O>, class: u16, key: SlotKey) -> Option<Self> {
        owner
            .counts(usize::from(class))
            .upgrade(key)
            .then(|| Self::adopt(Arc::clone(owner), class, key))
    }

    #[inline]
    pub(crate) fn owner(&self) -> &O {
        &self.owner
    }

    #[inline]
    pub(crate) const fn class(&self) -> u16 {
        self.class
    }

    #[inline]
    pub(crate) const fn key(&self) -> SlotKey {
        self.key
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.key.index() as usize
    }

    pub(crate) fn strong_count(&self) -> u32 {
        self.owner.counts(usize::from(self.class)).strong_count(self.index())
    }

    pub(crate) fn downgrade(&self) -> WeakPoolRef<O> {
        WeakPoolRef {
            owner: Arc::clone(&self.owner),
            class: self.class,
            key: self.key,
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.owner, &other.owner) && self.class == other.class && self.key == other.key
    }
}

impl<O: SlotOwner> Clone for PoolRef<O> {
    fn clone(&self) -> Self {
        self.owner.counts(usize::from(self.class)).retain(self.index());
        Self {
            owner: Arc::clone(&self.owner),
            class: self.class,
            key: self.key,
        }
    }
}

impl<O: SlotOwner> Drop for PoolRef<O> {
    fn drop(&mut self) {
        let class = usize::from(self.class);
        if self.owner.counts(class).release(self.index()) {
            self.owner.destroy(class, self.key);
        }
    }
}

/// Non-owning reference to a pool slot that detects expiry.
pub(crate) struct WeakPoolRef<O: SlotOwner> {
    owner: Arc<O>,
    class: u16,
    key: SlotKey,
}

impl<O: SlotOwner> WeakPoolRef<O> {
    pub(crate) fn upgrade(&self) -> Option<PoolRef<O>> {
        PoolRef::upgrade(&self.owner, self.class, self.key)
    }

    pub(crate) fn is_expired(&self) -> bool {
        !self.owner.counts(usize::from(self.class)).is_live(self.key)
    }

    #[inline]
    pub(crate) const fn class(&self) -> u16 {
        self.class
    }

    #[inline]
    pub(crate) const fn key(&self) -> SlotKey {
        self.key
    }
}

impl<O: SlotOwner> Clone for WeakPoolRef<O> {
    fn clone(&self) -> Self {
        Self {
            owner: Arc::clone(&self.owner),
            class: self.class,
            key: self.key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::memory::SlotAllocator;

    /// Minimal owner that records destroyed slots.
    struct TestPool {
        counts: SlotCounts,
        slots: Mutex<SlotAllocator>,
        destroyed: Mutex<Vec<SlotKey>>,
    }

    impl TestPool {
        fn new(capacity: usize) -> Arc<Self> {
            Arc::new(Self {
                counts: SlotCounts::new(capacity),
                slots: Mutex::new(SlotAllocator::new(capacity)),
                destroyed: Mutex::new(Vec::new()),
            })
        }

        fn create(self: &Arc<Self>) -> PoolRef<Self> {
            let key = {
                let mut slots = self.slots.lock();
                let index = slots.allocate().unwrap();
                self.counts.activate(index)
            };
            PoolRef::adopt(Arc::clone(self), 0, key)
        }
    }

    impl SlotOwner for TestPool {
        fn counts(&self, _class: usize) -> &SlotCounts {
            &self.counts
        }

        fn destroy(&self, _class: usize, key: SlotKey) {
            let mut slots = self.slots.lock();
            self.counts.retire(key.index() as usize);
            slots.deallocate(key.index() as usize).unwrap();
            self.destroyed.lock().push(key);
        }
    }

    #[test]
    fn test_last_release_destroys_once() {
        let pool = TestPool::new(2);
        let a = pool.create();
        let b = a.clone();
        assert_eq!(a.strong_count(), 2);

        drop(a);
        assert!(pool.destroyed.lock().is_empty());
        drop(b);
        assert_eq!(pool.destroyed.lock().len(), 1);
    }

    #[test]
    fn test_weak_expires() {
        let pool = TestPool::new(2);
        let strong = pool.create();
        let weak = strong.downgrade();

        assert!(!weak.is_expired());
        assert!(weak.upgrade().is_some());

        drop(strong);
        assert!(weak.is_expired());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_weak_never_resolves_reissued_slot() {
        let pool = TestPool::new(1);
        let first = pool.create();
        let weak = first.downgrade();
        drop(first);

        // Same index, next generation.
        let second = pool.create();
        assert_eq!(second.index(), weak.key().index() as usize);
        assert_ne!(second.key().generation(), weak.key().generation());
        assert!(weak.upgrade().is_none());
        assert!(weak.is_expired());
    }

    #[test]
    fn test_concurrent_clone_drop() {
        let pool = TestPool::new(1);
        let root = pool.create();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = root.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let extra = handle.clone();
                        let weak = extra.downgrade();
                        drop(extra);
                        assert!(weak.upgrade().is_some());
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(root.strong_count(), 1);
        drop(root);
        assert_eq!(pool.destroyed.lock().len(), 1);
    }
}
