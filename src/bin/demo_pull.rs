// SPDX-License-Identifier: GPL-2.0-or-later
//
// Single-process demo of a rendezvous pull: the puller opens a handle
// against a region registered on the pullee's endpoint, then drives the
// request/reply exchange directly (no network, both endpoints live in
// this process).
//
// Usage:
//   demo_pull

use open_mx::event::{Event, EventKind};
use open_mx::region::Segment;
use open_mx::{pull, Config, Context};

fn main() {
    let ctx = Context::new(Config::default());
    let iface_a = ctx.attach_interface("eth0").expect("attach eth0");
    let iface_b = ctx.attach_interface("eth1").expect("attach eth1");
    let puller = iface_a.open_endpoint(0, 1, 1).expect("open puller");
    let pullee = iface_b.open_endpoint(0, 2, 1).expect("open pullee");

    let region_len = 3 * 4096u64;
    puller
        .regions
        .register(vec![Segment { offset: 0, length: region_len }])
        .expect("register puller region");
    pullee
        .regions
        .register(vec![Segment { offset: 0, length: region_len }])
        .expect("register pullee region");

    println!("opening pull handle for {region_len} bytes");
    let (handle, requests) = pull::begin_pull(
        &puller,
        pullee.endpoint_index,
        0,
        0,
        0,
        0,
        region_len,
        4096,
    )
    .expect("begin_pull");
    println!("{} frames to pull", requests.len());

    for request in &requests {
        let reply = pull::on_pull_request(&pullee, request).expect("on_pull_request");
        pull::on_pull_reply(&puller, &reply).expect("on_pull_reply");
    }

    assert!(handle.is_done());
    match puller.exp_eventq.poll_kind(EventKind::PullDone) {
        Some(Event::PullDone { handle_id, result }) => {
            println!("pull {handle_id} finished: {result:?}");
        }
        _ => unreachable!(),
    }

    puller.close(&iface_a).expect("close puller");
    pullee.close(&iface_b).expect("close pullee");
}
