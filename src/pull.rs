// SPDX-License-Identifier: GPL-2.0-or-later
//
// Rendezvous pull engine: the hardest subsystem. A puller
// opens a handle against a remote region; frames arrive as `PULL_REPLY`
// messages in any order, each clearing one missing bit and one
// transferring bit; retransmission and completion follow the release
// table below.

use std::collections::HashMap;
use std::time::Instant;

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::Status;
use crate::event::Event;
use crate::sync::Guarded;
use crate::wire::{CommonHeader, OpCode, PullReplyFrame, PullRequestFrame};

const MAGIC_XOR: u32 = 0x2211_1867;
const MAGIC_SHIFT: u32 = 13;

/// Encode an endpoint index into the per-frame integrity check carried
/// on `PULL_REQUEST`/`PULL_REPLY`. Constants are taken
/// verbatim from the original kernel driver's pull handling.
pub fn encode_magic(endpoint_index: u8) -> u32 {
    ((endpoint_index as u32) << MAGIC_SHIFT) ^ MAGIC_XOR
}

/// Invert `encode_magic`, rejecting any value that doesn't decode to a
/// plausible 8-bit endpoint index.
pub fn decode_magic(magic: u32) -> Result<u8, Status> {
    let v = (magic ^ MAGIC_XOR) >> MAGIC_SHIFT;
    if v <= 0xFF {
        Ok(v as u8)
    } else {
        Err(Status::Invalid)
    }
}

/// Outcome of clearing a frame's transferring bit: what the caller
/// should do with the endpoint reference and handle lock it is holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAction {
    /// Other frames are still in flight; keep the endpoint reference.
    KeepRef,
    /// No copy is running but frames remain missing; drop the
    /// reference and let the retransmit path re-acquire it later.
    DropRef,
    /// Both masks are zero: deliver `PULL_DONE` and free the handle.
    Complete,
}

struct PullHandleState {
    frame_missing: u64,
    frame_transferring: u64,
    last_activity: Instant,
    retransmits: u32,
}

pub struct PullHandle {
    pub id: u32,
    pub magic: u32,
    pub region_id: u32,
    pub region_offset: u64,
    pub target_length: u64,
    pub frame_len: usize,
    pub num_frames: u32,
    state: Guarded<PullHandleState>,
}

impl PullHandle {
    pub fn frame_missing(&self) -> u64 {
        self.state.lock().frame_missing
    }

    pub fn frame_transferring(&self) -> u64 {
        self.state.lock().frame_transferring
    }

    pub fn is_done(&self) -> bool {
        let s = self.state.lock();
        s.frame_missing == 0 && s.frame_transferring == 0
    }

    /// A reply for `frame_index` arrived: clear its missing bit. Called
    /// before the payload copy.
    pub fn clear_missing(&self, frame_index: u32) {
        let mut s = self.state.lock();
        s.frame_missing &= !(1u64 << frame_index);
    }

    /// The payload copy for `frame_index` finished: clear its
    /// transferring bit and decide what the caller should do with its
    /// endpoint reference, per the release-semantics table.
    pub fn clear_transferring(&self, frame_index: u32) -> ReleaseAction {
        let mut s = self.state.lock();
        s.frame_transferring &= !(1u64 << frame_index);
        s.last_activity = Instant::now();
        if s.frame_missing == 0 && s.frame_transferring == 0 {
            ReleaseAction::Complete
        } else if s.frame_missing != s.frame_transferring {
            ReleaseAction::KeepRef
        } else {
            ReleaseAction::DropRef
        }
    }

    /// `true` if this handle has missing frames and its last activity
    /// predates `resend_delay`; the progress loop uses this to decide
    /// whether to re-emit `PULL_REQUEST`.
    pub fn due_for_retransmit(&self, resend_delay: std::time::Duration) -> bool {
        let s = self.state.lock();
        s.frame_missing != 0 && s.last_activity.elapsed() >= resend_delay
    }

    /// Record a retransmit attempt. Returns `Err(Status::Timeout)` once
    /// `retransmits_max` is exceeded; the caller must then complete the
    /// handle with a timeout and free it.
    pub fn record_retransmit(&self, retransmits_max: u32) -> Result<(), Status> {
        let mut s = self.state.lock();
        s.retransmits += 1;
        s.last_activity = Instant::now();
        if s.retransmits > retransmits_max {
            Err(Status::Timeout)
        } else {
            Ok(())
        }
    }

    /// Which frame indices are still outstanding, for re-request.
    pub fn missing_frame_indices(&self) -> Vec<u32> {
        let missing = self.frame_missing();
        (0..self.num_frames)
            .filter(|i| missing & (1u64 << i) != 0)
            .collect()
    }
}

/// Per-endpoint table of active pull handles.
/// This lock nests the per-handle lock: callers take the table lock to
/// find a handle, then the handle's own lock to update its masks.
pub struct PullTable {
    handles: HashMap<u32, std::sync::Arc<PullHandle>>,
    next_id: u32,
    max: usize,
}

impl PullTable {
    pub fn new(config: &Config) -> Self {
        Self {
            handles: HashMap::new(),
            next_id: 1,
            max: config.pull_handle_max,
        }
    }

    /// Open a new pull handle covering `target_length` bytes from
    /// `region_id` at `region_offset`, split into `frame_len`-sized
    /// frames.
    pub fn allocate(
        &mut self,
        endpoint_index: u8,
        region_id: u32,
        region_offset: u64,
        target_length: u64,
        frame_len: usize,
    ) -> Result<std::sync::Arc<PullHandle>, Status> {
        if self.handles.len() >= self.max {
            return Err(Status::NoResources);
        }
        let num_frames = (target_length + frame_len as u64 - 1) / frame_len as u64;
        if num_frames == 0 || num_frames > 64 {
            return Err(Status::NoResources);
        }
        let num_frames = num_frames as u32;
        let all_bits = if num_frames == 64 {
            u64::MAX
        } else {
            (1u64 << num_frames) - 1
        };

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let handle = std::sync::Arc::new(PullHandle {
            id,
            magic: encode_magic(endpoint_index),
            region_id,
            region_offset,
            target_length,
            frame_len,
            num_frames,
            state: Guarded::new(PullHandleState {
                frame_missing: all_bits,
                frame_transferring: all_bits,
                last_activity: Instant::now(),
                retransmits: 0,
            }),
        });
        self.handles.insert(id, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, id: u32) -> Option<std::sync::Arc<PullHandle>> {
        self.handles.get(&id).cloned()
    }

    pub fn remove(&mut self, id: u32) -> Option<std::sync::Arc<PullHandle>> {
        self.handles.remove(&id)
    }

    pub fn active_ids(&self) -> Vec<u32> {
        self.handles.keys().copied().collect()
    }
}

/// Rendezvous-to-pull handoff: once the application has
/// consumed a `RecvRendezvous` completion and chosen where the message
/// should land, this opens the puller-side handle and builds the
/// initial batch of `PULL_REQUEST` frames (every frame starts missing).
pub fn begin_pull(
    puller: &Endpoint,
    remote_endpoint: u8,
    local_region_id: u32,
    local_offset: u64,
    remote_rdma_id: u8,
    remote_offset: u64,
    target_length: u64,
    frame_len: usize,
) -> Result<(std::sync::Arc<PullHandle>, Vec<PullRequestFrame>), Status> {
    let handle = {
        let mut handles = puller.pull_handles.lock();
        handles.allocate(puller.endpoint_index, local_region_id, local_offset, target_length, frame_len)?
    };

    let requests = handle
        .missing_frame_indices()
        .into_iter()
        .map(|frame_index| PullRequestFrame {
            common: CommonHeader {
                src_endpoint: puller.endpoint_index,
                dst_endpoint: remote_endpoint,
                opcode: OpCode::PullRequest,
            },
            length: frame_len as u32,
            puller_rdma_id: local_region_id as u8,
            puller_offset: (local_offset + frame_index as u64 * frame_len as u64) as u32,
            pulled_rdma_id: remote_rdma_id,
            pulled_offset: (remote_offset + frame_index as u64 * frame_len as u64) as u32,
            src_pull_handle: handle.id,
            src_magic: handle.magic,
        })
        .collect();

    Ok((handle, requests))
}

/// Pullee handling: validate the request
/// against the target region, copy the requested bytes out of its
/// backing store, and build the reply frame. The magic carried back as
/// `dst_magic` is an echo of `src_magic`; there is no separate
/// pullee-side state to track since the region table already guards
/// against out-of-bounds access.
pub fn on_pull_request(
    pullee: &Endpoint,
    frame: &PullRequestFrame,
) -> Result<PullReplyFrame, Status> {
    decode_magic(frame.src_magic)?;
    pullee.regions.acquire_range(
        frame.pulled_rdma_id as u32,
        frame.pulled_offset as u64,
        frame.length as u64,
    )?;
    let payload = pullee.regions.read_at(
        frame.pulled_rdma_id as u32,
        frame.pulled_offset as u64,
        frame.length as u64,
    );
    pullee.regions.release_range(frame.pulled_rdma_id as u32);
    let payload = payload?;

    Ok(PullReplyFrame {
        common: CommonHeader {
            src_endpoint: frame.common.dst_endpoint,
            dst_endpoint: frame.common.src_endpoint,
            opcode: OpCode::PullReply,
        },
        puller_rdma_id: frame.puller_rdma_id,
        puller_offset: frame.puller_offset,
        dst_pull_handle: frame.src_pull_handle,
        dst_magic: frame.src_magic,
        payload,
    })
}

/// Puller handling: verify the magic,
/// copy the reply's payload into the puller's own region at
/// `puller_offset`, then locate the handle, clear the frame's
/// missing/transferring bits, and act on the release table. A handle
/// reaching `Complete` is removed from the table and a `PullDone`
/// completion is published here; the caller need not track completion
/// separately.
pub fn on_pull_reply(puller: &Endpoint, frame: &PullReplyFrame) -> Result<ReleaseAction, Status> {
    let endpoint_index = decode_magic(frame.dst_magic)?;
    if endpoint_index != puller.endpoint_index {
        return Err(Status::Invalid);
    }

    let handle = {
        let handles = puller.pull_handles.lock();
        handles.get(frame.dst_pull_handle).ok_or(Status::Invalid)?
    };
    if handle.frame_len == 0 {
        return Err(Status::Invalid);
    }
    let frame_index = ((frame.puller_offset as u64 - handle.region_offset) / handle.frame_len as u64) as u32;

    puller
        .regions
        .write_at(handle.region_id, frame.puller_offset as u64, &frame.payload)?;

    handle.clear_missing(frame_index);
    let action = handle.clear_transferring(frame_index);
    if action == ReleaseAction::Complete {
        let mut handles = puller.pull_handles.lock();
        handles.remove(handle.id);
        drop(handles);
        let _ = puller.exp_eventq.publish(Event::PullDone {
            handle_id: handle.id,
            result: Ok(()),
        });
    }
    Ok(action)
}
