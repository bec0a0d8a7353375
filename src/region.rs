// SPDX-License-Identifier: GPL-2.0-or-later
//
// Per-endpoint user region table: pinned send/receive
// segments the pull engine reads from and writes into. Every mutation
// -- registration, deregistration, and the pull engine's refcount and
// byte-copy operations -- takes the table's writer side, so the set of
// slots and each region's refcount and contents change atomically with
// respect to one another. `total_length`/lookup-only queries take the
// reader side.

use crate::error::Status;
use crate::sync::RwLock;

/// One contiguous pinned segment, described as (offset, length) pairs the
/// caller vouches for; this crate does not itself perform memory pinning.
#[derive(Debug, Clone)]
pub struct Segment {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone)]
pub struct UserRegion {
    pub id: u32,
    pub segments: Vec<Segment>,
    /// Sum of `segments[..].length`, cached for bounds checks.
    pub total_length: u64,
    /// Flat backing store the pull engine actually copies bytes into and
    /// out of, indexed by the same offset space as `contains`. This
    /// crate does not pin real application memory, so registration
    /// allocates this in place of it.
    data: Vec<u8>,
    /// Outstanding pull references keeping this region from being freed.
    refs: u32,
}

impl UserRegion {
    fn contains(&self, offset: u64, length: u64) -> bool {
        if length == 0 {
            return true;
        }
        let end = match offset.checked_add(length) {
            Some(e) => e,
            None => return false,
        };
        let mut cursor = 0u64;
        for seg in &self.segments {
            let seg_end = cursor + seg.length;
            if offset >= cursor && end <= seg_end {
                return true;
            }
            cursor = seg_end;
        }
        false
    }
}

/// Table of registered regions for one endpoint, indexed by region id.
pub struct RegionTable {
    lock: RwLock,
    // Guarded by `lock`: every mutator (register, deregister,
    // acquire_range, release_range, write_at) takes the exclusive side;
    // read-only queries (total_length, read_at) take the shared side.
    slots: std::cell::UnsafeCell<Vec<Option<UserRegion>>>,
}

unsafe impl Send for RegionTable {}
unsafe impl Sync for RegionTable {}

impl RegionTable {
    pub fn new(region_max: usize) -> Self {
        let mut slots = Vec::with_capacity(region_max);
        slots.resize_with(region_max, || None);
        Self {
            lock: RwLock::new(),
            slots: std::cell::UnsafeCell::new(slots),
        }
    }

    /// Register a new region, returning its id. Takes the table's writer
    /// side so two concurrent registrations can never pick the same free
    /// slot.
    pub fn register(&self, segments: Vec<Segment>) -> Result<u32, Status> {
        let total_length = segments.iter().map(|s| s.length).sum();
        self.lock.lock();
        let slots = unsafe { &mut *self.slots.get() };
        let free = slots.iter().position(|s| s.is_none());
        let result = match free {
            Some(idx) => {
                slots[idx] = Some(UserRegion {
                    id: idx as u32,
                    segments,
                    total_length,
                    data: vec![0u8; total_length as usize],
                    refs: 0,
                });
                Ok(idx as u32)
            }
            None => Err(Status::NoResources),
        };
        self.lock.unlock();
        result
    }

    /// Deregister a region. Takes the table's writer side, which blocks
    /// until no pull reference is outstanding on it.
    pub fn deregister(&self, id: u32) -> Result<(), Status> {
        self.lock.lock();
        let slots = unsafe { &mut *self.slots.get() };
        let result = match slots.get_mut(id as usize) {
            Some(slot @ Some(_)) => {
                let refs = slot.as_ref().unwrap().refs;
                if refs > 0 {
                    Err(Status::Busy)
                } else {
                    *slot = None;
                    Ok(())
                }
            }
            _ => Err(Status::Invalid),
        };
        self.lock.unlock();
        result
    }

    /// Validate that `[offset, offset+length)` falls within region `id`'s
    /// pinned segments, and bump its pull refcount on success. Takes the
    /// writer side: the refcount bump must be serialized against other
    /// acquires/releases and against `deregister`.
    pub fn acquire_range(&self, id: u32, offset: u64, length: u64) -> Result<(), Status> {
        self.lock.lock();
        let slots = unsafe { &mut *self.slots.get() };
        let result = match slots.get_mut(id as usize) {
            Some(Some(region)) if region.contains(offset, length) => {
                region.refs += 1;
                Ok(())
            }
            Some(Some(_)) => Err(Status::Invalid),
            _ => Err(Status::BadEndpoint),
        };
        self.lock.unlock();
        result
    }

    /// Release a reference previously taken by `acquire_range`.
    pub fn release_range(&self, id: u32) {
        self.lock.lock();
        let slots = unsafe { &mut *self.slots.get() };
        if let Some(Some(region)) = slots.get_mut(id as usize) {
            region.refs = region.refs.saturating_sub(1);
        }
        self.lock.unlock();
    }

    pub fn total_length(&self, id: u32) -> Option<u64> {
        self.lock.lock_shared();
        let slots = unsafe { &*self.slots.get() };
        let len = slots.get(id as usize).and_then(|s| s.as_ref()).map(|r| r.total_length);
        self.lock.unlock_shared();
        len
    }

    /// Copy `length` bytes out of region `id`'s backing store starting at
    /// `offset`. The caller is expected to have already validated the
    /// range with `acquire_range`.
    pub fn read_at(&self, id: u32, offset: u64, length: u64) -> Result<Vec<u8>, Status> {
        self.lock.lock_shared();
        let slots = unsafe { &*self.slots.get() };
        let result = match slots.get(id as usize).and_then(|s| s.as_ref()) {
            Some(region) => {
                let start = offset as usize;
                let end = start + length as usize;
                if end > region.data.len() {
                    Err(Status::Invalid)
                } else {
                    Ok(region.data[start..end].to_vec())
                }
            }
            None => Err(Status::BadEndpoint),
        };
        self.lock.unlock_shared();
        result
    }

    /// Copy `data` into region `id`'s backing store starting at `offset`,
    /// taking the writer side so it never races a concurrent read or
    /// another write into the same region.
    pub fn write_at(&self, id: u32, offset: u64, data: &[u8]) -> Result<(), Status> {
        self.lock.lock();
        let slots = unsafe { &mut *self.slots.get() };
        let result = match slots.get_mut(id as usize).and_then(|s| s.as_mut()) {
            Some(region) => {
                let start = offset as usize;
                let end = start + data.len();
                if end > region.data.len() {
                    Err(Status::Invalid)
                } else {
                    region.data[start..end].copy_from_slice(data);
                    Ok(())
                }
            }
            None => Err(Status::BadEndpoint),
        };
        self.lock.unlock();
        result
    }
}
