// SPDX-License-Identifier: GPL-2.0-or-later
//
// Interface registry: maps a local NIC to a board index
// and an endpoint slot array. `Interface::acquire_endpoint` is the only
// path into an endpoint from outside its own `Arc`, and it enforces the
// required lock order at the type level: the interface slot lock is
// always taken before the endpoint status lock it nests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::Status;
use crate::sync::Guarded;

/// A 48-bit Ethernet MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

/// A local NIC attached to this transport and assigned a board index.
pub struct Interface {
    pub index: u8,
    pub mac: MacAddr,
    pub name: String,
    config: Config,
    // Guarded by the interface lock: occupancy and the `Arc` handing out
    // endpoint ownership both live behind the same lock so `open`/`close`
    // never race a concurrent `acquire_by_index`.
    slots: Guarded<Vec<Option<Arc<Endpoint>>>>,
    next_connect_seqnum: AtomicU32,
}

impl Interface {
    pub fn new(index: u8, mac: MacAddr, name: impl Into<String>, config: Config) -> Self {
        let mut slots = Vec::with_capacity(config.endpoint_max);
        slots.resize_with(config.endpoint_max, || None);
        Self {
            index,
            mac,
            name: name.into(),
            config,
            slots: Guarded::new(slots),
            next_connect_seqnum: AtomicU32::new(1),
        }
    }

    pub fn endpoint_max(&self) -> usize {
        self.config.endpoint_max
    }

    pub fn next_connect_seqnum(&self) -> u32 {
        self.next_connect_seqnum.fetch_add(1, Ordering::Relaxed)
    }

    /// `open(board, index)`: fails with `Busy` if the slot is
    /// occupied, `Invalid` if `index` is out of range.
    pub fn open_endpoint(
        self: &Arc<Self>,
        index: u8,
        session_id: u32,
        app_key: u32,
    ) -> Result<Arc<Endpoint>, Status> {
        let mut guard = self.slots.lock();
        let slot = guard.get_mut(index as usize).ok_or(Status::Invalid)?;
        if slot.is_some() {
            return Err(Status::Busy);
        }
        let endpoint = Arc::new(Endpoint::new(self.index, index, session_id, app_key, &self.config));
        *slot = Some(endpoint.clone());
        Ok(endpoint)
    }

    /// `acquire_by_index(iface, i)`: interface lock, slot
    /// load, then the endpoint's own status-lock check — never the
    /// reverse order.
    pub fn acquire_by_index(&self, index: u8) -> Result<Arc<Endpoint>, Status> {
        let guard = self.slots.lock();
        let endpoint = guard.get(index as usize).and_then(|s| s.clone()).ok_or(Status::BadEndpoint)?;
        drop(guard);
        endpoint.acquire()?;
        Ok(endpoint)
    }

    /// Detach a `FREE` (fully torn down) endpoint from its slot. Called
    /// at the tail end of `Endpoint::close`, never before the endpoint
    /// has drained to a zero refcount.
    pub fn detach(&self, index: u8) {
        let mut guard = self.slots.lock();
        if let Some(slot) = guard.get_mut(index as usize) {
            *slot = None;
        }
    }

    /// Force every endpoint on this interface to `EndpointClosed`: used
    /// when the interface itself is unregistered while endpoints are
    /// still open.
    pub fn teardown_all(&self) {
        let guard = self.slots.lock();
        for slot in guard.iter().flatten() {
            slot.force_closed();
        }
    }
}
