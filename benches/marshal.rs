//! Marshalling benchmarks
//!
//! Measures packing cost across argument counts and lengths, with and
//! without the runtime call.

use argv_bridge::{marshal_and_start, pack};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::os::raw::{c_char, c_int};

fn generate_args(count: usize, width: usize) -> Vec<String> {
    (0..count)
        .map(|i| match i % 4 {
            0 => "node".to_string(),
            1 => format!("--flag-{}", i),
            2 => "x".repeat(width),
            _ => format!("/srv/app/{}/index.js", i),
        })
        .collect()
}

fn bench_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack");

    for count in [1, 8, 64, 1024].iter() {
        let args = generate_args(*count, 32);
        let bytes: usize = args.iter().map(|a| a.len() + 1).sum();
        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(BenchmarkId::new("count", count), &args, |b, args| {
            b.iter(|| pack(black_box(args)).unwrap());
        });
    }

    for width in [16, 256, 4096].iter() {
        let args = generate_args(16, *width);
        group.bench_with_input(BenchmarkId::new("width", width), &args, |b, args| {
            b.iter(|| pack(black_box(args)).unwrap());
        });
    }

    group.finish();
}

fn bench_marshal_and_start(c: &mut Criterion) {
    let args = generate_args(16, 32);

    c.bench_function("marshal_and_start/noop_entry", |b| {
        let mut entry = |argc: c_int, _: *mut *mut c_char| argc;
        b.iter(|| marshal_and_start(black_box(&args), &mut entry).unwrap());
    });
}

criterion_group!(benches, bench_pack, bench_marshal_and_start);
criterion_main!(benches);
