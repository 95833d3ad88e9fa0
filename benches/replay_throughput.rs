/// Replay throughput benchmarks
///
/// Measures events per second through the I/O state provider for a few
/// syscall mixes, and the cost of point queries on the resulting store.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use fdtrail::event::TraceEvent;
use fdtrail::query;
use fdtrail::replay::{replay_events, ReplayConfig};

fn entry(ts: i64, tid: i64, syscall: &str) -> TraceEvent {
    TraceEvent::new(format!("syscall_entry_{}", syscall), ts).with_context("tid", tid)
}

fn exit(ts: i64, tid: i64, syscall: &str, ret: i64) -> TraceEvent {
    TraceEvent::new(format!("syscall_exit_{}", syscall), ts)
        .with_context("tid", tid)
        .with_field("ret", ret)
}

/// One event per thread, consecutive timestamps
fn round(
    events: &mut Vec<TraceEvent>,
    ts: &mut i64,
    threads: i64,
    make: impl Fn(i64, i64) -> TraceEvent,
) {
    for tid in 1..=threads {
        events.push(make(*ts, tid));
        *ts += 1;
    }
}

/// `threads` threads, each opening a file, reading it `reads` times and
/// closing it, interleaved event by event
fn read_heavy_trace(threads: i64, reads: i64) -> Vec<TraceEvent> {
    let mut events = Vec::new();
    let mut ts = 0;

    round(&mut events, &mut ts, threads, |ts, tid| {
        let name = format!("/data/file-{}", tid);
        entry(ts, tid, "openat").with_field("filename", name.as_str())
    });
    round(&mut events, &mut ts, threads, |ts, tid| exit(ts, tid, "openat", 3));
    for _ in 0..reads {
        round(&mut events, &mut ts, threads, |ts, tid| {
            entry(ts, tid, "read")
                .with_field("fd", 3i64)
                .with_field("count", 4096i64)
        });
        round(&mut events, &mut ts, threads, |ts, tid| exit(ts, tid, "read", 4096));
    }
    round(&mut events, &mut ts, threads, |ts, tid| {
        entry(ts, tid, "close").with_field("fd", 3i64)
    });
    round(&mut events, &mut ts, threads, |ts, tid| exit(ts, tid, "close", 0));
    events
}

/// Short-lived fds: open/close churn with no data transfer
fn open_close_trace(count: i64) -> Vec<TraceEvent> {
    let mut events = Vec::with_capacity(count as usize * 4);
    for i in 0..count {
        let ts = i * 4;
        let name = format!("/tmp/churn-{}", i % 64);
        events.push(entry(ts, 1, "openat").with_field("filename", name.as_str()));
        events.push(exit(ts + 1, 1, "openat", 3 + i % 16));
        events.push(entry(ts + 2, 1, "close").with_field("fd", 3 + i % 16));
        events.push(exit(ts + 3, 1, "close", 0));
    }
    events
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    group.measurement_time(Duration::from_secs(5));
    let config = ReplayConfig::default();

    for threads in [1, 8, 64] {
        let events = read_heavy_trace(threads, 100);
        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("read_heavy", threads),
            &events,
            |b, events| b.iter(|| replay_events(black_box(events), &config)),
        );
    }

    let events = open_close_trace(10_000);
    group.throughput(Throughput::Elements(events.len() as u64));
    group.bench_function("open_close_churn", |b| {
        b.iter(|| replay_events(black_box(&events), &config))
    });

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let outcome = replay_events(&read_heavy_trace(64, 100), &ReplayConfig::default());
    let end = outcome.end_time.unwrap_or(0);
    let middle = end / 2;

    group.bench_function("file_at", |b| {
        b.iter(|| query::file_at(&outcome.state, black_box(32), 3, black_box(middle)))
    });
    group.bench_function("bytes_read_at", |b| {
        b.iter(|| query::bytes_read_at(&outcome.state, black_box(32), black_box(middle)))
    });
    group.bench_function("open_fds_at", |b| {
        b.iter(|| query::open_fds_at(&outcome.state, black_box(32), black_box(middle)))
    });

    group.finish();
}

criterion_group!(benches, bench_replay, bench_queries);
criterion_main!(benches);
