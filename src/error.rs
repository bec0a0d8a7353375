// SPDX-License-Identifier: GPL-2.0-or-later
//
// User-visible status taxonomy. `SUCCESS` is represented by
// `Ok(())`; everything else is a `Status` variant carried in `Err`.

use thiserror::Error;

/// A user-visible completion / failure status.
///
/// Propagation policy:
/// - length/identity/session mismatches at the receive path are dropped
///   silently or answered with a `NACK_LIB`; they never tear down the
///   endpoint.
/// - queue-full is transient congestion: the frame is dropped, the sender
///   retransmits.
/// - allocation failure on send returns `NoResources`/`NoMem` immediately.
/// - interface unregistration forces every endpoint on it to `EndpointClosed`.
/// - peer restart surfaces as `BadSession` on the stale partner state.
/// - retransmit-cap exhaustion completes the owning request with `Timeout`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[error("no such endpoint")]
    BadEndpoint,
    #[error("endpoint is closed")]
    EndpointClosed,
    #[error("session id mismatch (peer restarted)")]
    BadSession,
    #[error("connection key mismatch")]
    BadConnectionKey,
    #[error("connection attempt failed")]
    ConnectionFailed,
    #[error("insufficient resources (queue/handle/slot exhausted)")]
    NoResources,
    #[error("out of memory")]
    NoMem,
    #[error("resource busy")]
    Busy,
    #[error("invalid argument")]
    Invalid,
    #[error("operation timed out")]
    Timeout,
    #[error("operation aborted")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, Status>;
