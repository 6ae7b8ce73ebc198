//! Packet buffer fast-path benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use packet_pipeline::Packet;

fn benchmark_make(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet/make");

    group.bench_function("make_100", |b| {
        b.iter(|| {
            black_box(Packet::make(black_box(100)).unwrap());
        });
    });

    group.bench_function("make_from_1500", |b| {
        let frame = vec![0u8; 1500];
        b.iter(|| {
            black_box(Packet::make_from(black_box(&frame)).unwrap());
        });
    });

    group.finish();
}

fn benchmark_geometry(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet/geometry");

    group.bench_function("push_pull_fast_path", |b| {
        b.iter(|| {
            let p = Packet::make(100).unwrap();
            let mut p = p.push(14).unwrap().into_packet();
            p.pull(14);
            black_box(p);
        });
    });

    group.bench_function("put_take_fast_path", |b| {
        b.iter(|| {
            let p = Packet::make_with(0, None, 32, 64).unwrap();
            let mut w = p.put(16).unwrap();
            w.take(16);
            black_box(w);
        });
    });

    group.finish();
}

fn benchmark_sharing(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet/sharing");

    group.bench_function("clone", |b| {
        let p = Packet::make(1500).unwrap().into_packet();
        b.iter(|| {
            black_box(p.clone());
        });
    });

    group.bench_function("clone_then_uniqueify", |b| {
        let p = Packet::make(1500).unwrap().into_packet();
        b.iter(|| {
            let q = p.clone();
            black_box(q.uniqueify().unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_make, benchmark_geometry, benchmark_sharing);
criterion_main!(benches);
