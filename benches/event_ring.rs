// SPDX-License-Identifier: GPL-2.0-or-later
//
// EventQueue publish/poll throughput.
//
// Run with:
//   cargo bench --bench event_ring
//
// Groups:
//   publish_poll — alternating publish/poll at increasing queue depth
//   poll_kind    — type-checked poll against a queue mixing several kinds

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use open_mx::event::{Event, EventKind, EventQueue};

const DEPTHS: &[usize] = &[8, 64, 512];

fn bench_publish_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_poll");

    for &depth in DEPTHS {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let queue = EventQueue::new(depth);
            b.iter(|| {
                for i in 0..depth {
                    queue
                        .publish(Event::RecvTiny {
                            match_info: i as u64,
                            data: vec![0xAB; 32],
                        })
                        .unwrap();
                }
                for _ in 0..depth {
                    black_box(queue.poll());
                }
            });
        });
    }

    group.finish();
}

fn bench_poll_kind(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll_kind");

    for &depth in DEPTHS {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let queue = EventQueue::new(depth);
            b.iter(|| {
                for i in 0..depth {
                    let event = if i % 4 == 0 {
                        Event::PullDone {
                            handle_id: i as u32,
                            result: Ok(()),
                        }
                    } else {
                        Event::RecvNotify { match_info: i as u64 }
                    };
                    queue.publish(event).unwrap();
                }
                while let Some(event) = queue.poll_kind(EventKind::PullDone) {
                    black_box(event);
                }
                while let Some(event) = queue.poll() {
                    black_box(event);
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_publish_poll, bench_poll_kind);
criterion_main!(benches);
