// SPDX-License-Identifier: GPL-2.0-or-later
//
// Fixed-size slot pool backing `sendq`/`recvq`: a flat
// byte array sliced into `slot_size`-byte pages, handed out by a
// free-list allocator, simplified to a single in-process pool with no
// cross-process ownership handshake.

use crate::error::Status;
use crate::sync::Guarded;

struct SlotPoolInner {
    data: Vec<u8>,
    free: Vec<usize>,
}

pub struct SlotPool {
    slot_size: usize,
    inner: Guarded<SlotPoolInner>,
}

impl SlotPool {
    pub fn new(num_slots: usize, slot_size: usize) -> Self {
        let free = (0..num_slots).rev().collect();
        Self {
            slot_size,
            inner: Guarded::new(SlotPoolInner {
                data: vec![0u8; num_slots * slot_size],
                free,
            }),
        }
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Reserve a free slot.
    pub fn alloc(&self) -> Result<usize, Status> {
        self.inner.lock().free.pop().ok_or(Status::NoResources)
    }

    /// Return a slot to the free list once the consumer has drained it.
    pub fn free(&self, slot: usize) {
        self.inner.lock().free.push(slot);
    }

    /// Copy `data` into `slot`.
    pub fn write(&self, slot: usize, data: &[u8]) -> Result<(), Status> {
        if data.len() > self.slot_size {
            return Err(Status::Invalid);
        }
        let mut inner = self.inner.lock();
        let start = slot * self.slot_size;
        inner.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copy `len` bytes out of `slot`.
    pub fn read(&self, slot: usize, len: usize) -> Vec<u8> {
        let inner = self.inner.lock();
        let start = slot * self.slot_size;
        inner.data[start..start + len].to_vec()
    }
}
