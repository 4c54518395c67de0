//! Propagation benchmarks: write-then-flush fan-out and cached computed reads.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rill_core::reactive::{computed, effect, flush, signal, Effect};

fn fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let (source, set_source) = signal(0u64);
            let effects: Vec<Effect> = (0..width)
                .map(|_| {
                    let source = source.clone();
                    effect(move || {
                        black_box(source.get());
                    })
                })
                .collect();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                set_source.set(next);
                flush().unwrap();
            });

            for effect in effects {
                effect.dispose();
            }
        });
    }

    group.finish();
}

fn computed_reads(c: &mut Criterion) {
    let (a, set_a) = signal(1u64);
    let (b, _set_b) = signal(2u64);
    let sum = computed(move || a.get() + b.get());

    c.bench_function("computed_cached_read", |bench| {
        bench.iter(|| black_box(sum.get()));
    });

    c.bench_function("computed_invalidate_and_read", |bench| {
        let mut next = 1u64;
        bench.iter(|| {
            next += 1;
            set_a.set(next);
            flush().unwrap();
            black_box(sum.get())
        });
    });
}

criterion_group!(benches, fan_out, computed_reads);
criterion_main!(benches);
