use criterion::{criterion_group, criterion_main, Criterion};
use serial_transport::SyncBuffer;
use std::hint::black_box;
use std::time::Duration;

/// Terminator at the end of a 4 KiB burst.
pub fn bench_search_single_burst(c: &mut Criterion) {
    let mut burst = vec![b'x'; 4096];
    burst.extend_from_slice(b"\r\n");
    c.bench_function("search_single_burst", |b| {
        b.iter(|| {
            let buffer = SyncBuffer::new();
            buffer.append(&burst);
            black_box(buffer.search(b"\r\n", 0, Duration::ZERO));
        })
    });
}

/// Many small appends with a search after each; the cursor keeps rescans short.
pub fn bench_search_trickle(c: &mut Criterion) {
    let chunk = [b'y'; 16];
    c.bench_function("search_trickle_256_chunks", |b| {
        b.iter(|| {
            let buffer = SyncBuffer::new();
            for _ in 0..256 {
                buffer.append(&chunk);
                black_box(buffer.search(b"\r\n", 0, Duration::ZERO));
            }
            buffer.append(b"\r\n");
            black_box(buffer.search(b"\r\n", 0, Duration::ZERO));
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_search_single_burst, bench_search_trickle
}
criterion_main!(benches);
