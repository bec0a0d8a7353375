// SPDX-License-Identifier: GPL-2.0-or-later
//
// Condition-variable + mutex wrapper used to sleep/wake threads blocked on
// a predicate: endpoint close() waiting for refcount to drain,
// and user-facing wait/probe waiting for a completion event.
//
// Built on std::sync::{Mutex, Condvar} rather than a pthread_cond_t in
// shared memory, since this crate has no cross-process mapping to
// coordinate -- everything lives in one address space.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A waiter combining a condition variable, a mutex, and a quit flag.
pub struct Waiter {
    cond: Condvar,
    lock: Mutex<()>,
    quit: AtomicBool,
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            cond: Condvar::new(),
            lock: Mutex::new(()),
            quit: AtomicBool::new(false),
        }
    }

    /// Block until `pred` returns `false` or quit is signalled.
    /// Returns `false` on timeout, `true` otherwise.
    pub fn wait_if<F>(&self, pred: F, timeout_ms: Option<u64>) -> bool
    where
        F: Fn() -> bool,
    {
        let mut guard = self.lock.lock().unwrap();
        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        while !self.quit.load(Ordering::Relaxed) && pred() {
            match deadline {
                None => {
                    guard = self.cond.wait(guard).unwrap();
                }
                Some(dl) => {
                    let remaining = dl.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    let (g, res) = self.cond.wait_timeout(guard, remaining).unwrap();
                    guard = g;
                    if res.timed_out() && pred() {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Wake one waiter.
    pub fn notify(&self) {
        let _guard = self.lock.lock().unwrap();
        self.cond.notify_one();
    }

    /// Wake all waiters.
    pub fn broadcast(&self) {
        let _guard = self.lock.lock().unwrap();
        self.cond.notify_all();
    }

    /// Signal quit and broadcast to wake all waiters.
    pub fn quit_waiting(&self) {
        self.quit.store(true, Ordering::Release);
        self.broadcast();
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}
