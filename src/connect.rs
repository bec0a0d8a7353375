// SPDX-License-Identifier: GPL-2.0-or-later
//
// Connect FSM: turns an (interface, endpoint) pair into a
// sequenced, session-scoped partner. Receiver-paced: the initiator
// posts a request, the remote replies synchronously, and the progress
// loop (src/progress.rs) retransmits requests that go too long unanswered.

use std::time::Instant;

use crate::endpoint::Endpoint;
use crate::error::Status;
use crate::event::Event;
use crate::interface::Interface;
use crate::partner::{reply_matches_pending, BoardAddr, PartnerKey, PendingConnect};
use crate::wire::{CommonHeader, ConnectBody, ConnectFrame, OpCode};

/// Status codes carried in a `CONNECT` reply body.
const STATUS_OK: u8 = 0;
const STATUS_BAD_KEY: u8 = 1;
const STATUS_ENDPOINT_CLOSED: u8 = 2;

/// Build and register a `CONNECT` request. The
/// returned frame is the caller's responsibility to hand to the wire;
/// this function only updates local partner/endpoint state.
pub fn initiate(
    endpoint: &Endpoint,
    iface: &Interface,
    peer_index: u32,
    remote_endpoint_index: u8,
    board_addr: BoardAddr,
    app_key: u32,
) -> ConnectFrame {
    let connect_seqnum = iface.next_connect_seqnum();
    {
        let mut partners = endpoint.partners.lock();
        let partner = partners.lookup_or_create(peer_index, remote_endpoint_index, board_addr);
        partner.connect_seqnum = connect_seqnum;
        partner.pending_connect = Some(PendingConnect {
            connect_seqnum,
            app_key,
            attempts: 1,
            last_sent: Instant::now(),
        });
    }

    ConnectFrame {
        common: CommonHeader {
            src_endpoint: endpoint.endpoint_index,
            dst_endpoint: remote_endpoint_index,
            opcode: OpCode::Connect,
        },
        seqnum: endpoint.next_lib_seqnum(),
        body: ConnectBody::Request {
            src_session_id: endpoint.session_id,
            app_key,
            connect_seqnum,
        },
    }
}

/// Handle an inbound `CONNECT` request:
/// lookup/create the partner, verify `app_key`, detect peer restart,
/// and build the synchronous reply.
pub fn on_request(
    endpoint: &Endpoint,
    peer_index: u32,
    board_addr: BoardAddr,
    frame: &ConnectFrame,
) -> ConnectFrame {
    let ConnectBody::Request {
        src_session_id,
        app_key,
        connect_seqnum,
    } = frame.body
    else {
        panic!("on_request called with a reply frame");
    };

    let status_code = if app_key != endpoint.app_key {
        STATUS_BAD_KEY
    } else {
        STATUS_OK
    };

    let target_recv_seqnum_start = {
        let mut partners = endpoint.partners.lock();
        let partner =
            partners.lookup_or_create(peer_index, frame.common.src_endpoint, board_addr);
        if status_code == STATUS_OK {
            if partner.observes_restart(src_session_id) {
                tracing::info!(peer_index, src_session_id, "peer restart detected, resetting partner state");
                partner.reset_on_new_session(src_session_id);
            } else if partner.session_id.is_none() {
                partner.reset_on_new_session(src_session_id);
            }
        }
        partner.next_match_recv_seq
    };

    ConnectFrame {
        common: CommonHeader {
            src_endpoint: frame.common.dst_endpoint,
            dst_endpoint: frame.common.src_endpoint,
            opcode: OpCode::Connect,
        },
        seqnum: endpoint.next_lib_seqnum(),
        body: ConnectBody::Reply {
            src_session_id: endpoint.session_id,
            target_session_id: src_session_id,
            connect_seqnum,
            target_recv_seqnum_start,
            status_code,
        },
    }
}

/// Handle an inbound `CONNECT` reply. Matches by
/// `(partner, connect_seqnum)`; a non-matching reply is dropped
/// silently. On success the partner's session and send sequence are
/// seeded and a `RecvConnect` completion is published; on failure the
/// appropriate `Status` is published instead.
pub fn on_reply(endpoint: &Endpoint, peer_index: u32, frame: &ConnectFrame) {
    let ConnectBody::Reply {
        target_session_id,
        connect_seqnum,
        target_recv_seqnum_start,
        status_code,
        ..
    } = frame.body
    else {
        return;
    };

    let mut partners = endpoint.partners.lock();
    let key = PartnerKey {
        peer_index,
        endpoint_index: frame.common.src_endpoint,
    };
    let Some(partner) = partners.get_mut(key) else {
        return;
    };
    if !reply_matches_pending(partner, &frame.body) {
        return;
    }
    partner.pending_connect = None;

    let result = match status_code {
        STATUS_OK => {
            if partner.session_id.is_none() {
                partner.session_id = Some(target_session_id);
            }
            partner.next_send_seq = target_recv_seqnum_start;
            tracing::debug!(peer_index, connect_seqnum, "connect established");
            Ok(connect_seqnum)
        }
        STATUS_BAD_KEY => {
            tracing::warn!(peer_index, connect_seqnum, "connect rejected: bad app key");
            Err(Status::BadConnectionKey)
        }
        STATUS_ENDPOINT_CLOSED => {
            tracing::warn!(peer_index, connect_seqnum, "connect rejected: remote endpoint closed");
            Err(Status::ConnectionFailed)
        }
        _ => Err(Status::ConnectionFailed),
    };
    drop(partners);

    let _ = endpoint.exp_eventq.publish(Event::RecvConnect {
        connect_seqnum,
        result,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::interface::MacAddr;
    use crate::event::EventKind;
    use std::sync::Arc;

    fn iface() -> Arc<Interface> {
        Arc::new(Interface::new(0, MacAddr([0; 6]), "eth0", Config::default()))
    }

    #[test]
    fn connect_round_trip_succeeds() {
        let iface_a = iface();
        let iface_b = iface();
        let a = iface_a.open_endpoint(0, 10, 1).unwrap();
        let b = iface_b.open_endpoint(1, 20, 1).unwrap();

        let req = initiate(&a, &iface_a, 1, b.endpoint_index, [1; 6], 1);
        let reply = on_request(&b, 0, [0; 6], &req);
        on_reply(&a, 1, &reply);

        let event = a.exp_eventq.poll_kind(EventKind::RecvConnect).unwrap();
        match event {
            Event::RecvConnect { result, .. } => assert!(result.is_ok()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn connect_key_mismatch_fails() {
        let iface_a = iface();
        let iface_b = iface();
        let a = iface_a.open_endpoint(0, 10, 1).unwrap();
        let b = iface_b.open_endpoint(1, 20, 2).unwrap();

        let req = initiate(&a, &iface_a, 1, b.endpoint_index, [1; 6], 1);
        let reply = on_request(&b, 0, [0; 6], &req);
        on_reply(&a, 1, &reply);

        let event = a.exp_eventq.poll_kind(EventKind::RecvConnect).unwrap();
        match event {
            Event::RecvConnect { result, .. } => {
                assert_eq!(result, Err(Status::BadConnectionKey))
            }
            _ => unreachable!(),
        }
        // No partner carries a valid session after a failed connect.
        let partners = a.partners.lock();
        let key = PartnerKey {
            peer_index: 1,
            endpoint_index: b.endpoint_index,
        };
        assert!(partners.get(key).unwrap().session_id.is_none());
    }
}
