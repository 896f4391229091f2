//! Microbenchmarks over the framing + filter-VM hot paths.
//!
//! Grounded on the teacher's `benches/internals.rs` (criterion, harness =
//! false), minus the teacher's external compressed-archive fixtures: this
//! crate's scope has no bundled corpus to decompress, so messages are
//! synthesized in memory instead.

use bgp_vm_parser::iters::AsPathView;
use bgp_vm_parser::message::{Message, MsgFlags};
use bgp_vm_parser::vm::{Bgpvm, PrefixSet, ProgramBuilder};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::str::FromStr;
use std::time::Duration;

/// A single-prefix IPv4 UPDATE with `origin`/`as_path`/`next_hop` attributes
/// and one NLRI entry, sized like a typical route-collector feed message.
fn sample_update(prefix_octets: [u8; 3], prefix_len: u8, as_path: &[u32]) -> Vec<u8> {
    let mut origin = vec![0x40, 1, 1, 0];
    let mut as_path_attr = vec![0x40, 2];
    let mut segment = vec![2u8, as_path.len() as u8];
    for asn in as_path {
        segment.extend_from_slice(&asn.to_be_bytes());
    }
    as_path_attr.push(segment.len() as u8);
    as_path_attr.extend_from_slice(&segment);

    let next_hop = vec![0x40, 3, 4, 10, 0, 0, 1];

    let mut tpa = Vec::new();
    tpa.append(&mut origin);
    tpa.extend_from_slice(&as_path_attr);
    tpa.extend_from_slice(&next_hop);

    let mut nlri = vec![prefix_len];
    nlri.extend_from_slice(&prefix_octets);

    let mut body = Vec::new();
    body.extend_from_slice(&[0x00, 0x00]); // withdrawn len
    body.extend_from_slice(&(tpa.len() as u16).to_be_bytes());
    body.extend_from_slice(&tpa);
    body.extend_from_slice(&nlri);

    let mut msg = vec![0xFFu8; 16];
    let total = 19 + body.len();
    msg.extend_from_slice(&(total as u16).to_be_bytes());
    msg.push(0x02);
    msg.extend_from_slice(&body);
    msg
}

fn bench_framing(c: &mut Criterion) {
    let bytes = sample_update([10, 1, 0], 24, &[65000, 70000, 80000]);

    c.bench_function("message framing + attribute scan", |b| {
        b.iter(|| {
            let msg = Message::from_buffer(black_box(&bytes), MsgFlags::empty()).unwrap();
            black_box(AsPathView::build(&msg).unwrap());
        })
    });
}

fn bench_vm_prefix_filter(c: &mut Criterion) {
    let mut set = PrefixSet::new();
    set.insert(ipnet::IpNet::from_str("10.0.0.0/8").unwrap());
    let mut builder = ProgramBuilder::new();
    let idx = builder.add_prefix_set(set);
    builder.pfx_match(idx).end();
    let program = builder.build().unwrap();

    let accept_bytes = sample_update([10, 1, 0], 24, &[65000, 70000, 80000]);
    let reject_bytes = sample_update([192, 0, 2], 24, &[65000, 70000, 80000]);

    let mut vm = Bgpvm::new();
    vm.program(program);

    c.bench_function("vm prefix filter: 1000 messages", |b| {
        b.iter(|| {
            for _ in 0..500 {
                let accept_msg = Message::from_buffer(&accept_bytes, MsgFlags::empty()).unwrap();
                let reject_msg = Message::from_buffer(&reject_bytes, MsgFlags::empty()).unwrap();
                black_box(vm.run(&accept_msg).unwrap());
                black_box(vm.run(&reject_msg).unwrap());
            }
        })
    });
}

fn bench_as_path_merge(c: &mut Criterion) {
    let bytes = sample_update([172, 16, 0], 16, &[65000, 70000, 80000, 90000, 100000]);

    c.bench_function("merged AS-path iteration", |b| {
        b.iter(|| {
            let msg = Message::from_buffer(black_box(&bytes), MsgFlags::ASN32BIT).unwrap();
            let view = bgp_vm_parser::iters::AsPathView::build(&msg).unwrap();
            black_box(view.segments().len());
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = bench_framing, bench_vm_prefix_filter, bench_as_path_merge
}
criterion_main!(benches);
