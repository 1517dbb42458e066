//! Throughput benchmarks for the delivery paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use demandflow::prelude::*;
use demandflow::testing::hide;

/// Counts values without recording them, so the sink stays out of the numbers.
struct Counter {
    batch: u64,
    seen: u64,
    upstream: Option<SubscriptionHandle<i64>>,
}

impl Counter {
    fn new(batch: u64) -> Self {
        Self {
            batch,
            seen: 0,
            upstream: None,
        }
    }
}

impl Subscriber<i64> for Counter {
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<i64>) {
        subscription.request(self.batch);
        self.upstream = Some(subscription);
    }

    fn on_next(&mut self, value: i64) {
        black_box(value);
        self.seen += 1;
        if self.seen % self.batch == 0 {
            if let Some(upstream) = &self.upstream {
                upstream.request(self.batch);
            }
        }
    }

    fn on_error(&mut self, error: FlowError) {
        panic!("unexpected error: {}", error);
    }

    fn on_complete(&mut self) {
        self.upstream = None;
    }
}

fn evens(v: i64, sink: &mut SynchronousSink<i64>) -> Result<(), BoxError> {
    if v % 2 == 0 {
        sink.next(v);
    }
    Ok(())
}

/// Benchmark plain request/emit against a bounded request batch
fn bench_range_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_batches");

    for batch in [1, 32, 1024] {
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &batch| {
            b.iter(|| range(0, 10_000).subscribe(Counter::new(batch)));
        });
    }

    group.finish();
}

/// Benchmark handle over each delivery path
fn bench_handle_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_filter");

    group.bench_function("conditional", |b| {
        b.iter(|| range(0, 10_000).handle(evens).subscribe(Counter::new(256)));
    });

    group.bench_function("hidden", |b| {
        b.iter(|| {
            hide(range(0, 10_000))
                .handle(evens)
                .subscribe(Counter::new(256))
        });
    });

    group.bench_function("sync_fused", |b| {
        b.iter(|| {
            let ts = TestSubscriber::new().fused(FusionMode::Sync);
            range(0, 10_000).handle(evens).subscribe(ts.clone());
            black_box(ts.is_complete());
        });
    });

    group.finish();
}

/// Benchmark skip_while with a long dropped prefix
fn bench_skip_while(c: &mut Criterion) {
    let mut group = c.benchmark_group("skip_while_prefix");

    for prefix in [100i64, 5_000] {
        group.bench_with_input(BenchmarkId::new("prefix", prefix), &prefix, |b, &prefix| {
            b.iter(|| {
                range(0, 10_000)
                    .skip_while(move |v| Ok(*v < prefix))
                    .subscribe(Counter::new(64))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_range_batches, bench_handle_paths, bench_skip_while);
criterion_main!(benches);
