//! Benchmarks for lazy and eager evaluation
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshgraph_core::eval::{func, Derived, Value};
use meshgraph_core::graph::Scheduler;

type Link = Derived<func::Map<u64, u64>>;

/// A chain of `len` nodes, each adding one to the previous.
fn chain(len: usize) -> (Value<u64>, Vec<Link>) {
    let source = Value::named("source", 0_u64);
    let mut links: Vec<Link> = Vec::with_capacity(len);
    for i in 0..len {
        let input = match links.last() {
            Some(prev) => prev.port(),
            None => source.port(),
        };
        links.push(func::map(format!("link{i}"), input, |x| x + 1));
    }
    (source, links)
}

fn bench_lazy_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("lazy_chain");

    for len in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("set_then_read", len), len, |b, &len| {
            let (source, links) = chain(len);
            let tail = links[len - 1].port();
            let mut i = 0_u64;
            b.iter(|| {
                i += 1;
                source.set(i);
                black_box(tail.value().unwrap());
            });
        });

        group.bench_with_input(BenchmarkId::new("cached_read", len), len, |b, &len| {
            let (_source, links) = chain(len);
            let tail = links[len - 1].port();
            tail.value().unwrap();
            b.iter(|| black_box(tail.value().unwrap()));
        });
    }

    group.finish();
}

fn bench_eager_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("eager_chain");

    for len in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("set_then_process", len), len, |b, &len| {
            let (source, links) = chain(len);
            let mut scheduler = Scheduler::new();
            scheduler.add_process_node(links[len - 1].node());
            scheduler.process().unwrap();

            let mut i = 0_u64;
            b.iter(|| {
                i += 1;
                source.set(i);
                black_box(scheduler.process().unwrap().recomputed);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lazy_chain, bench_eager_chain);
criterion_main!(benches);
