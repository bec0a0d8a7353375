// SPDX-License-Identifier: GPL-2.0-or-later
//
// Partner table: per-endpoint knowledge of a remote
// `(peer_index, endpoint_index)`, its negotiated session, and the
// sequence-number state that makes delivery in-order per partner.

use std::collections::HashMap;

use crate::wire::ConnectBody;

/// Remote NIC address as carried in a `CONNECT` request.
pub type BoardAddr = [u8; 6];

/// Key identifying one partner row: the remote peer and its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartnerKey {
    pub peer_index: u32,
    pub endpoint_index: u8,
}

/// A pending outbound connect request, retried by the progress loop
/// until it completes or the retransmit cap is reached.
#[derive(Debug, Clone)]
pub struct PendingConnect {
    pub connect_seqnum: u32,
    pub app_key: u32,
    pub attempts: u32,
    pub last_sent: std::time::Instant,
}

#[derive(Debug, Clone)]
pub struct Partner {
    pub board_addr: BoardAddr,
    pub peer_index: u32,
    pub endpoint_index: u8,
    /// `None` until the first successful connect reply.
    pub session_id: Option<u32>,
    pub next_send_seq: u16,
    pub last_acked_send_seq: u16,
    pub next_match_recv_seq: u16,
    pub next_frag_recv_seq: u16,
    pub connect_seqnum: u32,
    pub pending_connect: Option<PendingConnect>,
}

impl Partner {
    fn new(board_addr: BoardAddr, peer_index: u32, endpoint_index: u8) -> Self {
        Self {
            board_addr,
            peer_index,
            endpoint_index,
            session_id: None,
            next_send_seq: 0,
            last_acked_send_seq: 0,
            next_match_recv_seq: 0,
            next_frag_recv_seq: 0,
            connect_seqnum: 0,
            pending_connect: None,
        }
    }

    /// Reset receive sequence state after observing a new session id from
    /// the remote: this is how a peer restart is detected and recovered.
    pub fn reset_on_new_session(&mut self, session_id: u32) {
        self.session_id = Some(session_id);
        self.next_match_recv_seq = 0;
        self.next_frag_recv_seq = 0;
    }

    /// `true` if `remote_session_id` indicates the peer restarted since
    /// we last heard from it.
    pub fn observes_restart(&self, remote_session_id: u32) -> bool {
        matches!(self.session_id, Some(existing) if existing != remote_session_id)
    }
}

/// Flat `peer_max x endpoint_max`-sized table, implemented
/// as a sparse map since most partner slots are never touched in a test
/// process; the invariant (at most one row per key) is identical.
pub struct PartnerTable {
    rows: HashMap<PartnerKey, Partner>,
}

impl PartnerTable {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    /// Return the existing row, or create one with zero sequence state
    /// and a deferred session if `board_addr` is supplied for the first
    /// time.
    pub fn lookup_or_create(
        &mut self,
        peer_index: u32,
        endpoint_index: u8,
        board_addr: BoardAddr,
    ) -> &mut Partner {
        self.rows
            .entry(PartnerKey {
                peer_index,
                endpoint_index,
            })
            .or_insert_with(|| Partner::new(board_addr, peer_index, endpoint_index))
    }

    pub fn get(&self, key: PartnerKey) -> Option<&Partner> {
        self.rows.get(&key)
    }

    pub fn get_mut(&mut self, key: PartnerKey) -> Option<&mut Partner> {
        self.rows.get_mut(&key)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PartnerKey, &mut Partner)> {
        self.rows.iter_mut()
    }
}

impl Default for PartnerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Decide whether an incoming `CONNECT` reply matches an outstanding
/// request on `partner`: match by `(session_id, partner, connect_seqnum)`,
/// silently drop otherwise.
pub fn reply_matches_pending(partner: &Partner, body: &ConnectBody) -> bool {
    let ConnectBody::Reply { connect_seqnum, .. } = body else {
        return false;
    };
    match &partner.pending_connect {
        Some(pending) => pending.connect_seqnum == *connect_seqnum,
        None => false,
    }
}
