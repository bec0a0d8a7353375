// SPDX-License-Identifier: GPL-2.0-or-later
//
// Explicit context object: the interface
// registry and driver descriptor are owned here rather than living as
// process-wide globals, so tests can spin up multiple independent
// contexts in one process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;

use crate::config::Config;
use crate::error::Status;
use crate::interface::{Interface, MacAddr};
use crate::sync::Guarded;

/// Driver-level constants mirrored from the original kernel module:
/// a clock rate, an ABI version, and a monotonic tick counter standing
/// in for a jiffies counter.
pub struct Driver {
    pub hz: u32,
    pub abi_version: u32,
    started_at: Instant,
    ticks: AtomicU64,
}

impl Driver {
    fn new() -> Self {
        Self {
            hz: 1000,
            abi_version: 1,
            started_at: Instant::now(),
            ticks: AtomicU64::new(0),
        }
    }

    /// Advance and return the tick counter.
    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Process-wide (but explicit, not global) registry of attached
/// interfaces, plus the shared driver descriptor and configuration.
pub struct Context {
    pub config: Config,
    pub driver: Driver,
    interfaces: Guarded<Vec<Option<Arc<Interface>>>>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let board_max = config.endpoint_max.max(1);
        let mut interfaces = Vec::with_capacity(board_max);
        interfaces.resize_with(board_max, || None);
        Self {
            config,
            driver: Driver::new(),
            interfaces: Guarded::new(interfaces),
        }
    }

    /// Attach a NIC by name, assigning it the next free board index.
    pub fn attach_interface(&self, name: impl Into<String>) -> Result<Arc<Interface>, Status> {
        let mac = random_mac();
        let mut guard = self.interfaces.lock();
        let index = guard.iter().position(|s| s.is_none()).ok_or(Status::NoResources)?;
        let iface = Arc::new(Interface::new(index as u8, mac, name, self.config));
        guard[index] = Some(iface.clone());
        Ok(iface)
    }

    /// Detach an interface: force-close every endpoint it still holds,
    /// then drop it from the registry.
    pub fn detach_interface(&self, index: u8) {
        let mut guard = self.interfaces.lock();
        if let Some(slot) = guard.get_mut(index as usize) {
            if let Some(iface) = slot.take() {
                iface.teardown_all();
            }
        }
    }

    pub fn get_board_count(&self) -> usize {
        self.interfaces.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn get_board_id(&self, index: u8) -> Result<(MacAddr, String), Status> {
        let guard = self.interfaces.lock();
        let iface = guard.get(index as usize).and_then(|s| s.as_ref()).ok_or(Status::Invalid)?;
        Ok((iface.mac, iface.name.clone()))
    }

    pub fn interface(&self, index: u8) -> Result<Arc<Interface>, Status> {
        let guard = self.interfaces.lock();
        guard.get(index as usize).and_then(|s| s.clone()).ok_or(Status::Invalid)
    }

    pub fn get_board_max(&self) -> usize {
        self.interfaces.lock().len()
    }

    pub fn get_endpoint_max(&self) -> usize {
        self.config.endpoint_max
    }

    pub fn get_peer_max(&self) -> usize {
        self.config.peer_max
    }
}

fn random_mac() -> MacAddr {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; 6];
    rng.fill(&mut bytes);
    bytes[0] &= 0xFE; // clear multicast bit, locally-administered-looking address
    MacAddr(bytes)
}
