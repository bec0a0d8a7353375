// SPDX-License-Identifier: GPL-2.0-or-later
//
// Lock-free spin lock with adaptive backoff: pause -> yield -> sleep.
// This is the leaf lock used for the endpoint status word and
// other per-object state that must never nest another lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// Adaptive backoff.
///
/// - k < 4:  busy spin (do nothing)
/// - k < 16: CPU pause hint
/// - k < 32: thread yield
/// - k >= 32: sleep 1ms
#[inline]
fn adaptive_yield(k: &mut u32) {
    if *k < 4 {
        // busy spin
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(std::time::Duration::from_millis(1));
        return;
    }
    *k += 1;
}

/// A simple spin lock with adaptive backoff.
///
/// Uses an `AtomicU32` exchanged to 1 on lock, stored to 0 on unlock, with
/// adaptive yield between retries.
pub struct SpinLock {
    lc: AtomicU32,
}

impl SpinLock {
    /// Create a new unlocked spin lock.
    pub const fn new() -> Self {
        Self {
            lc: AtomicU32::new(0),
        }
    }

    /// Acquire the lock (spinning with adaptive backoff).
    pub fn lock(&self) {
        let mut k = 0u32;
        while self.lc.swap(1, Ordering::Acquire) != 0 {
            adaptive_yield(&mut k);
        }
    }

    /// Try to acquire without blocking.
    pub fn try_lock(&self) -> bool {
        self.lc.swap(1, Ordering::Acquire) == 0
    }

    /// Release the lock.
    pub fn unlock(&self) {
        self.lc.store(0, Ordering::Release);
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: SpinLock is designed for concurrent access.
unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}

/// A `SpinLock` paired with the data it protects, in the shape of
/// `std::sync::Mutex`: `lock()` returns a RAII handle that unlocks on drop.
/// Most tables in this crate (event queues, region tables, partner rows)
/// are guarded this way rather than through bare `lock()`/`unlock()` pairs.
pub struct Guarded<T> {
    lock: SpinLock,
    data: std::cell::UnsafeCell<T>,
}

impl<T> Guarded<T> {
    pub const fn new(value: T) -> Self {
        Self {
            lock: SpinLock::new(),
            data: std::cell::UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> GuardedHandle<'_, T> {
        self.lock.lock();
        GuardedHandle { owner: self }
    }

    pub fn try_lock(&self) -> Option<GuardedHandle<'_, T>> {
        if self.lock.try_lock() {
            Some(GuardedHandle { owner: self })
        } else {
            None
        }
    }

    /// Bypass locking; only safe when the caller already holds exclusive
    /// access (e.g. during single-threaded construction).
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

unsafe impl<T: Send> Send for Guarded<T> {}
unsafe impl<T: Send> Sync for Guarded<T> {}

pub struct GuardedHandle<'a, T> {
    owner: &'a Guarded<T>,
}

impl<'a, T> std::ops::Deref for GuardedHandle<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.owner.data.get() }
    }
}

impl<'a, T> std::ops::DerefMut for GuardedHandle<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.owner.data.get() }
    }
}

impl<'a, T> Drop for GuardedHandle<'a, T> {
    fn drop(&mut self) {
        self.owner.lock.unlock();
    }
}
