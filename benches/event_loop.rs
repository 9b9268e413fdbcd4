use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use weir_io::{thread_pool::ThreadPool, BufferPool};

fn bench_threadpool_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("threadpool_latency");

    for pool_size in [1, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(pool_size),
            &pool_size,
            |b, &size| {
                let pool = ThreadPool::new(size);

                b.iter(|| {
                    let done = Arc::new(AtomicBool::new(false));
                    let d = done.clone();

                    pool.exec(move || {
                        d.store(true, Ordering::Release);
                    })
                    .unwrap();

                    while !done.load(Ordering::Acquire) {
                        thread::yield_now();
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_buffer_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool");
    group.throughput(Throughput::Elements(1));

    group.bench_function("acquire_release", |b| {
        let pool = BufferPool::new(16, 8192);
        b.iter(|| {
            let buf = pool.acquire();
            black_box(buf.len());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_threadpool_latency, bench_buffer_pool);
criterion_main!(benches);
