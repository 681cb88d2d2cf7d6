//! Criterion benchmarks for ring buffer window reads.
//!
//! The mirrored backend presents a window that crosses the end of the ring as
//! one slice; the copy-on-wrap backend has to stitch two halves together.
//! Each benchmark reads windows at a stride that makes every few windows wrap.
//!
//! Run with: cargo bench --bench ring_buffer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scan_core::Sample;
use scan_ring::{split, RingBuffer};

const WINDOW: usize = 4096;

fn power(samples: &[Sample]) -> f32 {
    samples.iter().map(|s| s.norm_sqr()).sum()
}

fn rings(capacity: usize) -> Vec<(&'static str, RingBuffer)> {
    let mut rings = vec![("copy_on_wrap", RingBuffer::copy_on_wrap(capacity).unwrap())];
    if let Ok(ring) = RingBuffer::mirrored(capacity) {
        rings.push(("mirrored", ring));
    }
    rings
}

fn window_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_window_read");
    let capacity = RingBuffer::capacity_for(WINDOW * 5 + 1);
    group.throughput(Throughput::Elements(WINDOW as u64));

    for (name, mut ring) in rings(capacity) {
        let fill: Vec<Sample> = (0..capacity).map(|i| Sample::new(i as f32, 0.0)).collect();
        ring.write(0, &fill).unwrap();

        // Odd stride so windows land on every alignment, wrapping included.
        let stride = WINDOW + 7;
        let mut offset = 0usize;
        group.bench_function(BenchmarkId::new(name, WINDOW), |b| {
            b.iter(|| {
                let total = ring.read(offset, WINDOW, power).unwrap();
                offset = (offset + stride) % capacity;
                black_box(total)
            });
        });
    }

    group.finish();
}

/// Write a window, then read it back through the shared reader.
fn writer_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_write_read");
    let capacity = RingBuffer::capacity_for(WINDOW * 8);
    group.throughput(Throughput::Elements(WINDOW as u64));

    for (name, ring) in rings(capacity) {
        let (mut writer, reader) = split(ring);
        let src = vec![Sample::new(0.5, -0.5); WINDOW];
        group.bench_function(BenchmarkId::new(name, WINDOW), |b| {
            b.iter(|| {
                let span = writer.write(black_box(&src)).unwrap();
                black_box(reader.read(span.position, span.len, power))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, window_reads, writer_reader);
criterion_main!(benches);
