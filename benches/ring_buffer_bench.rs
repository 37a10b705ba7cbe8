//! Criterion benchmarks for both ring buffer flavours
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use overwriting_ring::{RingBuffer, SpscRingBuffer};

const CAPACITY: usize = 65536;

fn bench_insert_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");
    group.throughput(Throughput::Elements(1));

    // Full buffer: every insert overwrites
    group.bench_function("insert_overwrite", |b| {
        let mut rb: RingBuffer<u64> = RingBuffer::new(CAPACITY);
        rb.extend(0..CAPACITY as u64);
        let mut i = 0u64;
        b.iter(|| {
            rb.insert(black_box(i));
            i = i.wrapping_add(1);
        });
    });

    group.bench_function("copy_backward", |b| {
        let mut rb: RingBuffer<u64> = RingBuffer::new(CAPACITY);
        rb.extend(0..CAPACITY as u64);
        let mut i = 0usize;
        b.iter(|| {
            let _ = black_box(rb.copy(black_box(i)));
            i = i.wrapping_add(7);
        });
    });

    group.bench_function("spsc_insert_copy_cycle", |b| {
        let mut rb: SpscRingBuffer<u64> = SpscRingBuffer::new(CAPACITY);
        let (mut producer, mut consumer) = rb.split();
        let mut i = 0u64;
        b.iter(|| {
            producer.insert(black_box(i));
            let _ = black_box(consumer.copy(0));
            i = i.wrapping_add(1);
        });
    });

    group.finish();
}

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");

    // Batch operations, wrapping across the physical end
    for batch_size in [100, 1000, 10000].iter() {
        let block: Vec<u64> = (0..*batch_size as u64).collect();
        group.throughput(Throughput::Elements(*batch_size as u64));

        group.bench_function(format!("insert_slice_{}", batch_size), |b| {
            let mut rb: RingBuffer<u64> = RingBuffer::new(CAPACITY - 1);
            b.iter(|| rb.insert_slice(black_box(&block)));
        });

        group.bench_function(format!("spsc_batch_{}", batch_size), |b| {
            let mut rb: SpscRingBuffer<u64> = SpscRingBuffer::new(CAPACITY - 1);
            let (mut producer, mut consumer) = rb.split();
            let mut out = vec![0u64; *batch_size];
            b.iter(|| {
                producer.insert_slice(black_box(&block));
                black_box(consumer.copy_to(&mut out, *batch_size));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert_copy, bench_throughput);
criterion_main!(benches);
