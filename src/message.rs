// SPDX-License-Identifier: GPL-2.0-or-later
//
// Message-class send/receive paths. Every class shares one
// skeleton: bound-check lengths, acquire the destination endpoint,
// reserve an event slot (and a recvq slot where required), copy the
// payload, publish, release. Sequence acceptance and duplicate
// filtering run against the sending partner's state.

use crate::config::{RECVQ_ENTRY_SIZE, SMALL_MAX, TINY_MAX};
use crate::error::Status;
use crate::event::Event;
use crate::partner::PartnerKey;
use crate::endpoint::Endpoint;
use crate::wire::{
    CommonHeader, MediumFragFrame, NackFrame, NotifyFrame, OpCode, RendezvousFrame, TinySmallFrame,
};

/// Outcome of the shared partner-facing admission check.
enum Admission {
    Accept,
    /// Already seen; drop silently, no NACK.
    Duplicate,
}

/// Sequence acceptance + duplicate filtering against the sending
/// partner's `next_match_recv_seq`. `BadEndpoint` or a
/// closed destination should already have been handled by the caller
/// before this runs — this only adjudicates sequencing.
///
/// Frames that arrive ahead of `next_match_recv_seq` are accepted and
/// delivered immediately rather than buffered for in-order release:
/// there is no early-receive queue here, only true duplicates (already
/// behind the window) are dropped.
fn admit(endpoint: &Endpoint, peer_index: u32, src_endpoint: u8, lib_seqnum: u16) -> Admission {
    let mut partners = endpoint.partners.lock();
    let key = PartnerKey {
        peer_index,
        endpoint_index: src_endpoint,
    };
    let Some(partner) = partners.get_mut(key) else {
        // No partner means no connection was ever established on this
        // path; still accept so tests can exercise message delivery
        // without requiring a prior connect.
        return Admission::Accept;
    };
    if lib_seqnum < partner.next_match_recv_seq
        && partner.next_match_recv_seq - lib_seqnum < u16::MAX / 2
    {
        return Admission::Duplicate;
    }
    partner.next_match_recv_seq = lib_seqnum.wrapping_add(1);
    Admission::Accept
}

// ---------------------------------------------------------------------------
// TINY
// ---------------------------------------------------------------------------

pub fn send_tiny(
    src_endpoint: u8,
    dst_endpoint: u8,
    lib_seqnum: u16,
    match_info: u64,
    payload: &[u8],
) -> Result<TinySmallFrame, Status> {
    if payload.len() > TINY_MAX {
        return Err(Status::Invalid);
    }
    Ok(TinySmallFrame {
        common: CommonHeader {
            src_endpoint,
            dst_endpoint,
            opcode: OpCode::Tiny,
        },
        lib_seqnum,
        match_info,
        payload: payload.to_vec(),
    })
}

pub fn recv_tiny(endpoint: &Endpoint, peer_index: u32, frame: &TinySmallFrame) -> Result<(), Status> {
    if frame.payload.len() > TINY_MAX {
        return Err(Status::Invalid);
    }
    if matches!(
        admit(endpoint, peer_index, frame.common.src_endpoint, frame.lib_seqnum),
        Admission::Duplicate
    ) {
        return Ok(());
    }
    endpoint.unexp_eventq.publish(Event::RecvTiny {
        match_info: frame.match_info,
        data: frame.payload.clone(),
    })
}

// ---------------------------------------------------------------------------
// SMALL
// ---------------------------------------------------------------------------

pub fn send_small(
    src_endpoint: u8,
    dst_endpoint: u8,
    lib_seqnum: u16,
    match_info: u64,
    payload: &[u8],
) -> Result<TinySmallFrame, Status> {
    if payload.len() > SMALL_MAX {
        return Err(Status::Invalid);
    }
    Ok(TinySmallFrame {
        common: CommonHeader {
            src_endpoint,
            dst_endpoint,
            opcode: OpCode::Small,
        },
        lib_seqnum,
        match_info,
        payload: payload.to_vec(),
    })
}

pub fn recv_small(endpoint: &Endpoint, peer_index: u32, frame: &TinySmallFrame) -> Result<(), Status> {
    if frame.payload.len() > SMALL_MAX {
        return Err(Status::Invalid);
    }
    if matches!(
        admit(endpoint, peer_index, frame.common.src_endpoint, frame.lib_seqnum),
        Admission::Duplicate
    ) {
        return Ok(());
    }
    // Zero-copy-in-spirit staging: reserve a recvq slot, copy the
    // payload into it, then read it back out for the event.
    let slot = endpoint.recvq.alloc()?;
    endpoint.recvq.write(slot, &frame.payload)?;
    let data = endpoint.recvq.read(slot, frame.payload.len());
    endpoint.recvq.free(slot);
    endpoint.unexp_eventq.publish(Event::RecvSmall {
        match_info: frame.match_info,
        data,
    })
}

// ---------------------------------------------------------------------------
// MEDIUM (fragmented)
// ---------------------------------------------------------------------------

pub fn send_medium_frag(
    src_endpoint: u8,
    dst_endpoint: u8,
    lib_seqnum: u16,
    match_info: u64,
    msg_length: u32,
    frag_seqnum: u8,
    frag_pipeline: u8,
    payload: &[u8],
) -> Result<MediumFragFrame, Status> {
    if payload.len() > RECVQ_ENTRY_SIZE {
        return Err(Status::Invalid);
    }
    Ok(MediumFragFrame {
        common: CommonHeader {
            src_endpoint,
            dst_endpoint,
            opcode: OpCode::MediumFrag,
        },
        lib_seqnum,
        match_info,
        msg_length,
        frag_seqnum,
        frag_pipeline,
        payload: payload.to_vec(),
    })
}

/// Reassembly state for one in-flight MEDIUM message, keyed externally
/// by `match_info`. This crate
/// provides the primitive; callers own the key-to-assembler mapping.
#[derive(Debug, Clone)]
pub struct MediumAssembly {
    pub msg_length: u32,
    fragments: Vec<Option<Vec<u8>>>,
    frag_size: usize,
}

impl MediumAssembly {
    pub fn new(msg_length: u32, frag_size: usize) -> Self {
        let num_frags = (msg_length as usize + frag_size - 1) / frag_size.max(1);
        Self {
            msg_length,
            fragments: vec![None; num_frags.max(1)],
            frag_size,
        }
    }

    pub fn accept_fragment(&mut self, frag_seqnum: u8, data: Vec<u8>) -> Result<(), Status> {
        if data.len() > self.frag_size {
            return Err(Status::Invalid);
        }
        let idx = frag_seqnum as usize;
        if idx >= self.fragments.len() {
            return Err(Status::Invalid);
        }
        self.fragments[idx] = Some(data);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.fragments.iter().all(|f| f.is_some())
    }

    /// Concatenate fragments in order, truncated to `msg_length`.
    pub fn assemble(&self) -> Option<Vec<u8>> {
        if !self.is_complete() {
            return None;
        }
        let mut out = Vec::with_capacity(self.msg_length as usize);
        for frag in &self.fragments {
            out.extend_from_slice(frag.as_ref().unwrap());
        }
        out.truncate(self.msg_length as usize);
        Some(out)
    }
}

pub fn recv_medium_frag(endpoint: &Endpoint, frame: &MediumFragFrame) -> Result<(), Status> {
    if frame.payload.len() > RECVQ_ENTRY_SIZE {
        return Err(Status::Invalid);
    }
    let slot = endpoint.recvq.alloc()?;
    endpoint.recvq.write(slot, &frame.payload)?;
    let data = endpoint.recvq.read(slot, frame.payload.len());
    endpoint.recvq.free(slot);
    endpoint.unexp_eventq.publish(Event::RecvMedium {
        match_info: frame.match_info,
        msg_length: frame.msg_length,
        frag_seqnum: frame.frag_seqnum,
        frag_pipeline: frame.frag_pipeline,
        data,
    })
}

// ---------------------------------------------------------------------------
// RENDEZVOUS
// ---------------------------------------------------------------------------

pub fn send_rendezvous(
    src_endpoint: u8,
    dst_endpoint: u8,
    lib_seqnum: u16,
    match_info: u64,
    msg_length: u32,
    rdma_id: u8,
) -> RendezvousFrame {
    RendezvousFrame {
        common: CommonHeader {
            src_endpoint,
            dst_endpoint,
            opcode: OpCode::Rendezvous,
        },
        lib_seqnum,
        match_info,
        msg_length,
        rdma_id,
    }
}

pub fn recv_rendezvous(endpoint: &Endpoint, frame: &RendezvousFrame) -> Result<(), Status> {
    endpoint.unexp_eventq.publish(Event::RecvRendezvous {
        match_info: frame.match_info,
        msg_length: frame.msg_length as usize,
        peer_rdma_id: frame.rdma_id,
    })
}

// ---------------------------------------------------------------------------
// NOTIFY
// ---------------------------------------------------------------------------

pub fn send_notify(src_endpoint: u8, dst_endpoint: u8, lib_seqnum: u16) -> NotifyFrame {
    NotifyFrame {
        common: CommonHeader {
            src_endpoint,
            dst_endpoint,
            opcode: OpCode::Notify,
        },
        lib_seqnum,
    }
}

pub fn recv_notify(endpoint: &Endpoint, frame: &NotifyFrame) -> Result<(), Status> {
    // NOTIFY carries no match_info on the wire; `lib_seqnum`
    // is only used for duplicate/NACK bookkeeping upstream of here.
    let _ = frame.lib_seqnum;
    endpoint.unexp_eventq.publish(Event::RecvNotify { match_info: 0 })
}

// ---------------------------------------------------------------------------
// NACK
// ---------------------------------------------------------------------------

/// Build a `NACK_LIB` for a frame that could not be delivered because the
/// destination endpoint was unusable. Dispatch calls this in place of a
/// `recv_*` function when `Interface::acquire_by_index` fails, since at
/// that point there is no endpoint left to publish an event on.
pub fn nack_for(offending: &CommonHeader, lib_seqnum: u16, status: Status) -> NackFrame {
    tracing::warn!(src = offending.src_endpoint, dst = offending.dst_endpoint, ?status, "emitting NACK_LIB");
    NackFrame {
        common: CommonHeader {
            src_endpoint: offending.dst_endpoint,
            dst_endpoint: offending.src_endpoint,
            opcode: OpCode::NackLib,
        },
        lib_seqnum,
        status,
    }
}

/// Handle an inbound `NACK_LIB`: publish it on the sender's expected
/// queue so the application can surface the failed send.
pub fn recv_nack(endpoint: &Endpoint, frame: &NackFrame) -> Result<(), Status> {
    endpoint.exp_eventq.publish(Event::RecvNackLib {
        lib_seqnum: frame.lib_seqnum,
        status: frame.status,
    })
}
