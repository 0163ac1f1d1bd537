//! Fixed-capacity object pool (the "out-of-scope collaborator" object-pool
//! allocator from spec §1). Grounded on the teacher's
//! `ejcineque::pools::DiskIOBufferPool`: a fixed array of slots with a
//! bitmask free list, generalized here from raw page-aligned buffers to
//! arbitrary `T`, and without the physical-frame allocator fallback (a
//! pool exhausted here is a filesystem resource limit, not something to
//! paper over with a heap allocation).
//!
//! Handles are plain indices, never references, per Design Notes §9: an
//! inode's block list and a block's owning-inode link are both handles
//! into these pools, so the cyclic inode↔block relationship never needs
//! a two-way owning pointer.

use crate::error::FfsError;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u32);

pub struct Pool<T> {
    slots: Vec<Option<T>>,
    capacity: usize,
    free: Vec<u32>,
}

impl<T> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            capacity,
            free: (0..capacity as u32).rev().collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.capacity - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocates a slot for `value`, returning [`FfsError::OutOfResources`]
    /// if the pool is already at capacity.
    pub fn alloc(&mut self, value: T) -> Result<Handle, FfsError> {
        let idx = self.free.pop().ok_or(FfsError::OutOfResources)?;
        self.slots[idx as usize] = Some(value);
        Ok(Handle(idx))
    }

    pub fn free(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.0 as usize)?;
        let value = slot.take();
        if value.is_some() {
            self.free.push(handle.0);
        }
        value
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots.get_mut(handle.0 as usize)?.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (Handle(i as u32), v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|v| (Handle(i as u32), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_reuse() {
        let mut pool: Pool<u32> = Pool::new(2);
        let a = pool.alloc(10).unwrap();
        let b = pool.alloc(20).unwrap();
        assert!(pool.alloc(30).is_err());
        assert_eq!(pool.free(a), Some(10));
        let c = pool.alloc(30).unwrap();
        assert_eq!(pool.get(c), Some(&30));
        assert_eq!(pool.get(b), Some(&20));
    }

    #[test]
    fn exhaustion_is_out_of_resources() {
        let mut pool: Pool<()> = Pool::new(0);
        assert_eq!(pool.alloc(()).unwrap_err(), FfsError::OutOfResources);
    }

    #[test]
    fn iter_skips_freed_slots() {
        let mut pool: Pool<u32> = Pool::new(3);
        let a = pool.alloc(1).unwrap();
        let _b = pool.alloc(2).unwrap();
        pool.free(a);
        let remaining: Vec<u32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(remaining, alloc::vec![2]);
    }
}
