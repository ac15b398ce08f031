//! Benchmarks for notification, batching and flush.
//!
//! Run with: cargo bench -p ripple-core --bench flush

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ripple_core::{observe_root, run_pending, watch, Memo, Record, Subscriber, Value, WatchOptions};
use serde_json::json;
use std::hint::black_box;

fn counter_state() -> Record {
    let value = Value::from(json!({"count": 0}));
    observe_root(&value);
    value.as_record().cloned().unwrap()
}

fn count(record: &Record) -> f64 {
    record.get("count").and_then(|v| v.as_number()).unwrap_or(0.0)
}

/// One write fanned out to `n` watchers, then one flush.
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush/fan_out");

    for n in [1usize, 10, 100, 1000] {
        group.throughput(Throughput::Elements(n as u64));
        let state = counter_state();
        let watchers: Vec<Subscriber> = (0..n)
            .map(|_| {
                let s = state.clone();
                watch(move || Ok(Value::from(count(&s))), |_, _| Ok(()), WatchOptions::default()).unwrap()
            })
            .collect();

        let mut next = 0.0;
        group.bench_with_input(BenchmarkId::new("write_and_flush", n), &n, |b, _| {
            b.iter(|| {
                next += 1.0;
                state.set("count", Value::from(next)).unwrap();
                black_box(run_pending())
            })
        });
        drop(watchers);
    }

    group.finish();
}

/// `n` writes to one property batched into a single re-run.
fn bench_batching(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush/batching");

    for n in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(n as u64));
        let state = counter_state();
        let s = state.clone();
        let _watcher = watch(move || Ok(Value::from(count(&s))), |_, _| Ok(()), WatchOptions::default()).unwrap();

        let mut next = 0.0;
        group.bench_with_input(BenchmarkId::new("burst", n), &n, |b, &n| {
            b.iter(|| {
                for _ in 0..n {
                    next += 1.0;
                    state.set("count", Value::from(next)).unwrap();
                }
                black_box(run_pending())
            })
        });
    }

    group.finish();
}

/// Chain of memos, each reading the previous one.
fn bench_memo_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("memo/chain");

    for depth in [1usize, 10, 50] {
        let state = counter_state();
        let s = state.clone();
        let mut tail = Memo::new(move || Value::from(count(&s)));
        for _ in 1..depth {
            let prev = tail.clone();
            tail = Memo::try_new(move || Ok(Value::from(prev.get()?.as_number().unwrap_or(0.0) + 1.0)));
        }

        let mut next = 0.0;
        group.bench_with_input(BenchmarkId::new("write_and_read", depth), &depth, |b, _| {
            b.iter(|| {
                next += 1.0;
                state.set("count", Value::from(next)).unwrap();
                black_box(tail.get().unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_batching, bench_memo_chain);
criterion_main!(benches);
