// SPDX-License-Identifier: GPL-2.0-or-later
//
// Tunable limits and timeouts. Grouped into one struct rather than scattered
// `const`s so tests can build a `Context` with tiny limits (e.g. to exercise
// queue-full admission control) without touching global state.

use std::time::Duration;

/// Maximum payload length for a TINY message, inlined into the event slot.
pub const TINY_MAX: usize = 32;
/// Maximum payload length for a SMALL message, copied into a recvq slot.
pub const SMALL_MAX: usize = 256;
/// Bytes per `sendq`/`recvq` staging slot (also the MEDIUM fragment cap).
pub const RECVQ_ENTRY_SIZE: usize = 4096;
/// Frames per pull request / reply block.
pub const PULL_REPLY_PER_BLOCK: u32 = 32;
/// Maximum bytes carried by a single pull reply frame.
pub const PULL_REPLY_LENGTH_MAX: usize = RECVQ_ENTRY_SIZE;
/// Minimum Ethernet frame length; shorter frames are zero-padded on encode.
pub const MIN_FRAME_LEN: usize = 60;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Endpoint slots per interface.
    pub endpoint_max: usize,
    /// Registered user regions per endpoint.
    pub region_max: usize,
    /// Partner-table rows per remote peer (`peer_max x endpoint_max`).
    pub peer_max: usize,
    /// Event queue (exp/unexp) slot count, each a power of two.
    pub eventq_len: usize,
    /// sendq/recvq slot count.
    pub dataq_len: usize,
    /// Active pull handles per endpoint.
    pub pull_handle_max: usize,
    /// How long a connect/pull request waits before it is eligible for resend.
    pub resend_delay: Duration,
    /// Maximum resend attempts before a request fails with `Timeout`.
    pub retransmits_max: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_max: 8,
            region_max: 16,
            peer_max: 1024,
            eventq_len: 64,
            dataq_len: 64,
            pull_handle_max: 16,
            resend_delay: Duration::from_millis(100),
            retransmits_max: 1000,
        }
    }
}
