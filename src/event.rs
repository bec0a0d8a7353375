// SPDX-License-Identifier: GPL-2.0-or-later
//
// Completion event queues. Each endpoint owns two queues,
// "expected" (a receive already matched by a posted request) and
// "unexpected" (arrived with no waiting request), both built on the same
// fixed-capacity ring.
//
// The producer side is receive-path code running under the endpoint's
// status lock; the consumer side is the application thread calling
// wait/poll/probe. A bounded ring guarded by a single spin lock gives the
// same reserve -> fill -> publish / type-check -> clear contract as the
// teacher's lock-free ring (`channel.rs`) without its cross-process epoch
// bookkeeping, which this in-process queue has no use for.

use std::collections::VecDeque;

use crate::error::Status;
use crate::sync::Guarded;

/// Tag identifying an event's shape without requiring a full match,
/// used by `probe`/`wait` to test for a particular completion kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RecvTiny,
    RecvSmall,
    RecvMedium,
    RecvRendezvous,
    RecvNotify,
    RecvConnect,
    SendMediumFragDone,
    PullDone,
    RecvTruc,
    RecvNackLib,
}

/// A completion record posted by the receive or send-completion path and
/// consumed by the application via `wait`/`poll`.
#[derive(Debug, Clone)]
pub enum Event {
    RecvTiny {
        match_info: u64,
        data: Vec<u8>,
    },
    RecvSmall {
        match_info: u64,
        data: Vec<u8>,
    },
    RecvMedium {
        match_info: u64,
        msg_length: u32,
        frag_seqnum: u8,
        frag_pipeline: u8,
        data: Vec<u8>,
    },
    RecvRendezvous {
        match_info: u64,
        msg_length: usize,
        peer_rdma_id: u8,
    },
    RecvNotify {
        match_info: u64,
    },
    RecvConnect {
        connect_seqnum: u32,
        result: Result<u32, Status>,
    },
    SendMediumFragDone {
        lib_seqnum: u16,
        status: Status,
    },
    PullDone {
        handle_id: u32,
        result: Result<(), Status>,
    },
    RecvTruc {
        data: Vec<u8>,
    },
    RecvNackLib {
        lib_seqnum: u16,
        status: Status,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::RecvTiny { .. } => EventKind::RecvTiny,
            Event::RecvSmall { .. } => EventKind::RecvSmall,
            Event::RecvMedium { .. } => EventKind::RecvMedium,
            Event::RecvRendezvous { .. } => EventKind::RecvRendezvous,
            Event::RecvNotify { .. } => EventKind::RecvNotify,
            Event::RecvConnect { .. } => EventKind::RecvConnect,
            Event::SendMediumFragDone { .. } => EventKind::SendMediumFragDone,
            Event::PullDone { .. } => EventKind::PullDone,
            Event::RecvTruc { .. } => EventKind::RecvTruc,
            Event::RecvNackLib { .. } => EventKind::RecvNackLib,
        }
    }
}

/// Fixed-capacity FIFO of pending completions.
pub struct EventQueue {
    capacity: usize,
    slots: Guarded<VecDeque<Event>>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Guarded::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Reserve a slot and publish `event` in one step. Returns
    /// `Err(Status::NoResources)` if the queue is full, which the caller
    /// must treat as admission control: drop the frame, let the sender's
    /// retransmit timer recover it.
    pub fn publish(&self, event: Event) -> Result<(), Status> {
        let mut guard = self.slots.lock();
        if guard.len() >= self.capacity {
            return Err(Status::NoResources);
        }
        guard.push_back(event);
        Ok(())
    }

    /// Remove and return the oldest event, regardless of kind.
    pub fn poll(&self) -> Option<Event> {
        self.slots.lock().pop_front()
    }

    /// Remove and return the oldest event whose kind matches `kind`,
    /// leaving events of other kinds in place (type-check then clear).
    pub fn poll_kind(&self, kind: EventKind) -> Option<Event> {
        let mut guard = self.slots.lock();
        let pos = guard.iter().position(|e| e.kind() == kind)?;
        guard.remove(pos)
    }

    pub fn peek_kind(&self) -> Option<EventKind> {
        self.slots.lock().front().map(Event::kind)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }
}
