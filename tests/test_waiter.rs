// SPDX-License-Identifier: GPL-2.0-or-later

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use open_mx::sync::Waiter;

#[test]
fn wait_if_returns_immediately_when_predicate_is_false() {
    let waiter = Waiter::new();
    assert!(waiter.wait_if(|| false, None));
}

#[test]
fn wait_if_times_out() {
    let waiter = Waiter::new();
    let ready = AtomicBool::new(false);
    let woke = waiter.wait_if(|| !ready.load(Ordering::Relaxed), Some(20));
    assert!(!woke);
}

#[test]
fn notify_wakes_a_waiting_thread() {
    let waiter = Arc::new(Waiter::new());
    let flag = Arc::new(AtomicBool::new(false));

    let w = waiter.clone();
    let f = flag.clone();
    let handle = thread::spawn(move || {
        w.wait_if(|| !f.load(Ordering::Acquire), None);
    });

    thread::sleep(Duration::from_millis(20));
    flag.store(true, Ordering::Release);
    waiter.notify();

    handle.join().unwrap();
}

#[test]
fn broadcast_wakes_all_waiters() {
    let waiter = Arc::new(Waiter::new());
    let done = Arc::new(AtomicBool::new(false));
    let awake = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let w = waiter.clone();
            let d = done.clone();
            let a = awake.clone();
            thread::spawn(move || {
                w.wait_if(|| !d.load(Ordering::Acquire), None);
                a.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    done.store(true, Ordering::Release);
    waiter.broadcast();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(awake.load(Ordering::Relaxed), 4);
}

#[test]
fn quit_waiting_unblocks_without_predicate_change() {
    let waiter = Arc::new(Waiter::new());
    let w = waiter.clone();
    let handle = thread::spawn(move || w.wait_if(|| true, None));

    thread::sleep(Duration::from_millis(20));
    waiter.quit_waiting();
    handle.join().unwrap();
}
