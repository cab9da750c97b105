//! # Sorted Slot Array
//!
//! A fixed-capacity inline array kept sorted by `T`'s ordering.
//!
//! Used for per-entity component and view tables and for the view registry's
//! record list. Lookup is a binary search, insertion and removal shift the
//! tail in place. Nothing here touches the heap.

use std::cmp::Ordering;
use std::ops::Index;

use crate::error::{EcsError, EcsResult};

/// Fixed-capacity sorted array of `N` entries.
///
/// # Invariants
///
/// - Slots `0..len` are occupied, slots `len..N` are empty.
/// - Occupied slots are in non-decreasing order.
#[derive(Clone, Debug)]
pub struct SortedSlotArray<T, const N: usize> {
    slots: [Option<T>; N],
    len: usize,
}

impl<T: Ord, const N: usize> SortedSlotArray<T, N> {
    /// Creates an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            len: 0,
        }
    }

    /// Returns the fixed capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if no more entries fit.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Inserts in order and returns the index the item landed at.
    ///
    /// Items equal to existing entries go after them.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CapacityExceeded`] if the array is full.
    pub fn insert(&mut self, item: T) -> EcsResult<usize> {
        if self.is_full() {
            return Err(EcsError::CapacityExceeded {
                resource: "sorted slot array",
                capacity: N,
            });
        }
        let index = self.slots[..self.len].partition_point(|entry| {
            entry.as_ref().is_some_and(|entry| *entry <= item)
        });
        self.slots[self.len] = Some(item);
        self.slots[index..=self.len].rotate_right(1);
        self.len += 1;
        Ok(index)
    }

    /// Binary search with a three-way comparator.
    ///
    /// `compare` reports how the wanted key orders relative to `entry`:
    /// `Less` means the key sorts before `entry`.
    pub fn search<F>(&self, mut compare: F) -> Option<usize>
    where
        F: FnMut(&T) -> Ordering,
    {
        let (mut low, mut high) = (0, self.len);
        while low < high {
            let middle = low + (high - low) / 2;
            let entry = self.slots[middle].as_ref()?;
            match compare(entry) {
                Ordering::Less => high = middle,
                Ordering::Greater => low = middle + 1,
                Ordering::Equal => return Some(middle),
            }
        }
        None
    }

    /// Removes and returns the entry at `index`, shifting the tail down.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        assert!(index < self.len, "remove index {index} out of bounds (len {})", self.len);
        self.slots[index..self.len].rotate_left(1);
        self.len -= 1;
        match self.slots[self.len].take() {
            Some(item) => item,
            None => unreachable!("occupied prefix has a hole"),
        }
    }

    /// Gets the entry at `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots[..self.len].get(index)?.as_ref()
    }

    /// Gets the mutable entry at `index`.
    ///
    /// Callers must not change the entry's ordering key.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots[..self.len].get_mut(index)?.as_mut()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        for slot in &mut self.slots[..self.len] {
            *slot = None;
        }
        self.len = 0;
    }

    /// Iterates over entries in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + Clone + '_ {
        self.slots[..self.len].iter().flatten()
    }

    /// Iterates mutably over entries in ascending order.
    ///
    /// Callers must not change ordering keys.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots[..self.len].iter_mut().flatten()
    }
}

impl<T: Ord, const N: usize> Default for SortedSlotArray<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord, const N: usize> Index<usize> for SortedSlotArray<T, N> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(entry) => entry,
            None => panic!("index {index} out of bounds (len {})", self.len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_insert_keeps_order() {
        let mut array: SortedSlotArray<u32, 8> = SortedSlotArray::new();
        for value in [5, 1, 4, 1, 9] {
            array.insert(value).unwrap();
        }
        assert_eq!(array.iter().copied().collect::<Vec<_>>(), vec![1, 1, 4, 5, 9]);
        assert_eq!(array[2], 4);
    }

    #[test]
    fn test_insert_returns_index() {
        let mut array: SortedSlotArray<u32, 4> = SortedSlotArray::new();
        assert_eq!(array.insert(10).unwrap(), 0);
        assert_eq!(array.insert(30).unwrap(), 1);
        assert_eq!(array.insert(20).unwrap(), 1);
        assert_eq!(array.insert(5).unwrap(), 0);
    }

    #[test]
    fn test_full() {
        let mut array: SortedSlotArray<u8, 2> = SortedSlotArray::new();
        array.insert(1).unwrap();
        array.insert(2).unwrap();
        assert!(array.is_full());
        assert_eq!(
            array.insert(3),
            Err(EcsError::CapacityExceeded { resource: "sorted slot array", capacity: 2 })
        );
    }

    #[test]
    fn test_search_hit_and_miss() {
        let mut array: SortedSlotArray<u32, 8> = SortedSlotArray::new();
        for value in [2, 4, 6, 8] {
            array.insert(value).unwrap();
        }
        assert_eq!(array.search(|entry| 6.cmp(entry)), Some(2));
        assert_eq!(array.search(|entry| 5.cmp(entry)), None);
        assert_eq!(array.search(|entry| 0.cmp(entry)), None);
        assert_eq!(array.search(|entry| 9.cmp(entry)), None);
    }

    #[test]
    fn test_remove_shifts() {
        let mut array: SortedSlotArray<u32, 8> = SortedSlotArray::new();
        for value in [1, 2, 3, 4] {
            array.insert(value).unwrap();
        }
        assert_eq!(array.remove(1), 2);
        assert_eq!(array.iter().copied().collect::<Vec<_>>(), vec![1, 3, 4]);
        assert!(array.get(3).is_none());
    }

    #[test]
    fn test_clear() {
        let mut array: SortedSlotArray<u32, 4> = SortedSlotArray::new();
        array.insert(1).unwrap();
        array.clear();
        assert!(array.is_empty());
        assert_eq!(array.iter().count(), 0);
    }

    #[test]
    fn test_matches_reference_under_random_ops() {
        const CAPACITY: usize = 32;
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let mut array: SortedSlotArray<u16, CAPACITY> = SortedSlotArray::new();
        let mut reference: Vec<u16> = Vec::new();

        for _ in 0..5_000 {
            if !reference.is_empty() && (reference.len() == CAPACITY || rng.gen_bool(0.4)) {
                let index = rng.gen_range(0..reference.len());
                assert_eq!(array.remove(index), reference.remove(index));
            } else {
                let value = rng.gen_range(0..64);
                array.insert(value).unwrap();
                let at = reference.partition_point(|v| *v <= value);
                reference.insert(at, value);
            }

            let contents: Vec<u16> = array.iter().copied().collect();
            assert_eq!(contents, reference);
            assert!(contents.windows(2).all(|w| w[0] <= w[1]));

            let probe = rng.gen_range(0..64);
            match array.search(|entry| probe.cmp(entry)) {
                Some(index) => assert_eq!(reference[index], probe),
                None => assert!(reference.binary_search(&probe).is_err()),
            }
        }
    }
}
