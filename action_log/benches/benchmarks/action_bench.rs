use criterion::{black_box, criterion_group, Criterion};

use action_log::stats::{MomentAccumulator, P2QuantileAccumulator};
use action_log::{Level, Logger, Sink};

struct NoSink;
impl Sink for NoSink {
    fn on_end(&self, _event: &action_log::Event) {}
}

fn lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("Actions");

    let logger = Logger::new("bench");
    logger.add_sink(std::sync::Arc::new(NoSink));

    group.bench_function("begin and succeed", |bencher| {
        bencher.iter(|| {
            let mut action = logger.action(Level::INFO, "bench");
            action.begin();
            black_box(&mut action).success();
        })
    });

    group.bench_function("scoped with a child", |bencher| {
        bencher.iter(|| {
            let outer = logger.action(Level::INFO, "bench").enter();
            {
                let _inner = logger.action(Level::DEBUG, "subaction").enter();
            }
            black_box(outer.id())
        })
    });

    let async_logger = Logger::new("bench-async");
    async_logger.add_sink(std::sync::Arc::new(NoSink));
    async_logger.set_async(true);

    group.bench_function("queued terminal plus flush", |bencher| {
        bencher.iter(|| {
            let mut action = async_logger.action(Level::INFO, "bench");
            action.success();
            async_logger.flush();
        })
    });
}

fn accumulators(c: &mut Criterion) {
    let mut group = c.benchmark_group("Accumulators");

    group.bench_function("moment add", |bencher| {
        let mut acc = MomentAccumulator::new();
        let mut x = 0.0f64;
        bencher.iter(|| {
            x += 1.0;
            acc.add(black_box(x % 97.0));
        })
    });

    group.bench_function("p2 add", |bencher| {
        let mut acc = P2QuantileAccumulator::new(&[50.0, 99.0]).expect("valid quantiles");
        let mut x = 0.0f64;
        bencher.iter(|| {
            x += 1.0;
            acc.add(black_box(x % 97.0));
        })
    });
}

criterion_group!(benches, lifecycle, accumulators);
