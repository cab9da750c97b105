//! # Fixed-Capacity Collections

mod sorted;

pub use sorted::SortedSlotArray;
