// SPDX-License-Identifier: GPL-2.0-or-later
//
// Concurrency primitives shared by every stateful component: a leaf spin
// lock, a single-word reader/writer lock, and a condvar-backed waiter.

mod rw_lock;
mod spin_lock;
mod waiter;

pub use rw_lock::RwLock;
pub use spin_lock::{Guarded, SpinLock};
pub use waiter::Waiter;
