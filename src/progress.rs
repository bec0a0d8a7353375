// SPDX-License-Identifier: GPL-2.0-or-later
//
// Tick-driven progress loop: walks the connect
// pending state and active pull handles for retransmission. In the
// kernel source this runs on every inbound frame and every user call;
// here it is an explicit function the caller invokes at the same
// points (see `demos/` for a worked loopback driver).

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::event::Event;
use crate::wire::{CommonHeader, OpCode, PullRequestFrame};

/// Requests worth re-sending this tick: connect requests whose
/// `connect_seqnum` is still pending, and pull requests for handles
/// with outstanding missing frames.
pub struct DueWork {
    pub pull_requests: Vec<PullRequestFrame>,
}

/// Walk `endpoint`'s pull-handle table, expiring handles that blew
/// through `retransmits_max` and re-requesting frames that are still
/// missing and idle past `resend_delay`.
pub fn tick_pull_handles(endpoint: &Endpoint, config: &Config) -> DueWork {
    let mut pull_requests = Vec::new();
    let mut expired = Vec::new();

    {
        let mut handles = endpoint.pull_handles.lock();
        for id in handles.active_ids() {
            let Some(handle) = handles.get(id) else {
                continue;
            };
            if !handle.due_for_retransmit(config.resend_delay) {
                continue;
            }
            match handle.record_retransmit(config.retransmits_max) {
                Ok(()) => {
                    for frame_index in handle.missing_frame_indices() {
                        pull_requests.push(PullRequestFrame {
                            common: CommonHeader {
                                src_endpoint: endpoint.endpoint_index,
                                dst_endpoint: 0, // filled in by the caller, which knows the pullee.
                                opcode: OpCode::PullRequest,
                            },
                            length: handle.frame_len as u32,
                            puller_rdma_id: 0,
                            puller_offset: handle.region_offset as u32
                                + frame_index * handle.frame_len as u32,
                            pulled_rdma_id: 0,
                            pulled_offset: frame_index * handle.frame_len as u32,
                            src_pull_handle: handle.id,
                            src_magic: handle.magic,
                        });
                    }
                }
                Err(status) => expired.push((id, status)),
            }
        }
        for (id, _) in &expired {
            handles.remove(*id);
        }
    }

    for (id, status) in expired {
        tracing::warn!(handle_id = id, ?status, "pull handle timed out, giving up");
        let _ = endpoint.exp_eventq.publish(Event::PullDone {
            handle_id: id,
            result: Err(status),
        });
    }

    DueWork { pull_requests }
}

/// Walk `endpoint`'s partner table, re-emitting `CONNECT` requests that
/// have gone unanswered past `resend_delay`.
/// Returns the `(peer_index, connect_seqnum, attempts)` of requests due
/// for resend; the caller reconstructs and re-sends the frame via
/// `connect::initiate`-equivalent state already stored on the partner.
pub fn tick_connect_pending(endpoint: &Endpoint, config: &Config) -> Vec<u32> {
    let mut timed_out = Vec::new();
    let mut due = Vec::new();

    {
        let mut partners = endpoint.partners.lock();
        for (_key, partner) in partners.iter_mut() {
            let Some(pending) = partner.pending_connect.as_mut() else {
                continue;
            };
            if pending.last_sent.elapsed() < config.resend_delay {
                continue;
            }
            pending.attempts += 1;
            pending.last_sent = std::time::Instant::now();
            if pending.attempts > config.retransmits_max {
                timed_out.push(pending.connect_seqnum);
            } else {
                due.push(pending.connect_seqnum);
            }
        }
        for seqnum in &timed_out {
            if let Some((_, partner)) = partners
                .iter_mut()
                .find(|(_, p)| p.pending_connect.as_ref().map(|c| c.connect_seqnum) == Some(*seqnum))
            {
                partner.pending_connect = None;
            }
        }
    }

    for seqnum in timed_out {
        tracing::warn!(connect_seqnum = seqnum, "connect request timed out");
        let _ = endpoint.exp_eventq.publish(Event::RecvConnect {
            connect_seqnum: seqnum,
            result: Err(crate::error::Status::Timeout),
        });
    }

    due
}
