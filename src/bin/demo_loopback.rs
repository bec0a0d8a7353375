// SPDX-License-Identifier: GPL-2.0-or-later
//
// Single-process demo of a TINY and a CONNECT round trip between two
// endpoints on two interfaces attached to the same context.
//
// Usage:
//   demo_loopback

use open_mx::{connect, message};
use open_mx::event::{Event, EventKind};
use open_mx::{Config, Context};

fn main() {
    let ctx = Context::new(Config::default());
    let iface_a = ctx.attach_interface("eth0").expect("attach eth0");
    let iface_b = ctx.attach_interface("eth1").expect("attach eth1");
    let a = iface_a.open_endpoint(0, 1, 42).expect("open endpoint a");
    let b = iface_b.open_endpoint(0, 2, 42).expect("open endpoint b");

    println!("connecting a -> b");
    let req = connect::initiate(&a, &iface_a, iface_b.index as u32, b.endpoint_index, [1; 6], 42);
    let reply = connect::on_request(&b, iface_a.index as u32, [0; 6], &req);
    connect::on_reply(&a, iface_b.index as u32, &reply);

    match a.exp_eventq.poll_kind(EventKind::RecvConnect) {
        Some(Event::RecvConnect { result: Ok(seq), .. }) => println!("connected, seqnum={seq}"),
        Some(Event::RecvConnect { result: Err(status), .. }) => {
            println!("connect failed: {status:?}");
            return;
        }
        _ => unreachable!(),
    }

    println!("sending TINY a -> b");
    let frame = message::send_tiny(a.endpoint_index, b.endpoint_index, a.next_lib_seqnum(), 0xC0FFEE, b"hello, open-mx")
        .expect("send_tiny");
    message::recv_tiny(&b, iface_a.index as u32, &frame).expect("recv_tiny");

    match b.unexp_eventq.poll_kind(EventKind::RecvTiny) {
        Some(Event::RecvTiny { match_info, data }) => {
            println!(
                "received: match_info={match_info:#x} payload={:?}",
                String::from_utf8_lossy(&data)
            );
        }
        _ => unreachable!(),
    }

    a.close(&iface_a).expect("close a");
    b.close(&iface_b).expect("close b");
}
