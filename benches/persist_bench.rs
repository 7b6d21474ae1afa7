//! Benchmarks for the pmembase durability and transfer primitives.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pmembase::{memcpy_persist, memset_persist, persist};

const SMALL_SIZE: usize = 64;
const MEDIUM_SIZE: usize = 4 * 1024;
const LARGE_SIZE: usize = 256 * 1024;

fn bench_persist(c: &mut Criterion) {
    let mut group = c.benchmark_group("Persist");

    for &size in &[SMALL_SIZE, MEDIUM_SIZE, LARGE_SIZE] {
        let buf = vec![0x5Au8; size];

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                unsafe { persist(buf.as_ptr(), size) };
                black_box(&buf);
            });
        });
    }

    group.finish();
}

fn bench_memcpy_persist(c: &mut Criterion) {
    let mut group = c.benchmark_group("Memcpy Persist");

    for &size in &[SMALL_SIZE, MEDIUM_SIZE, LARGE_SIZE] {
        let src = vec![0xA5u8; size];
        let mut dst = vec![0u8; size];

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                unsafe { memcpy_persist(dst.as_mut_ptr(), src.as_ptr(), size) };
                black_box(&dst);
            });
        });
    }

    group.finish();
}

fn bench_memcpy_std_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Memcpy + Persist (split steps)");

    for &size in &[SMALL_SIZE, MEDIUM_SIZE, LARGE_SIZE] {
        let src = vec![0xA5u8; size];
        let mut dst = vec![0u8; size];

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                dst.copy_from_slice(&src);
                unsafe { persist(dst.as_ptr(), size) };
                black_box(&dst);
            });
        });
    }

    group.finish();
}

fn bench_memset_persist(c: &mut Criterion) {
    let mut group = c.benchmark_group("Memset Persist");

    for &size in &[SMALL_SIZE, MEDIUM_SIZE, LARGE_SIZE] {
        let mut dst = vec![0u8; size];

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                unsafe { memset_persist(dst.as_mut_ptr(), 0x42, size) };
                black_box(&dst);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_persist,
    bench_memcpy_persist,
    bench_memcpy_std_baseline,
    bench_memset_persist,
);
criterion_main!(benches);
