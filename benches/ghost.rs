use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ghostkit::ghost::{GhostCache, SampledGhostCache};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const BENCH_SIZE: u32 = 64 * 1024;
const TICK: u32 = BENCH_SIZE / 32;
const SAMPLE_SHIFT: u32 = 5;

fn bench_ghost_fill(c: &mut Criterion) {
    c.bench_function("ghost_fill", |b| {
        b.iter_batched(
            || GhostCache::new(TICK, TICK, BENCH_SIZE),
            |mut ghost| {
                for i in 0..BENCH_SIZE {
                    ghost.access(std::hint::black_box(i));
                }
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_ghost_hit(c: &mut Criterion) {
    c.bench_function("ghost_hit", |b| {
        b.iter_batched(
            || {
                let mut ghost = GhostCache::new(TICK, TICK, BENCH_SIZE);
                for i in 0..BENCH_SIZE {
                    ghost.access(i);
                }
                ghost
            },
            |mut ghost| {
                for i in 0..BENCH_SIZE {
                    ghost.access(std::hint::black_box(i));
                }
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_ghost_miss(c: &mut Criterion) {
    c.bench_function("ghost_miss", |b| {
        b.iter_batched(
            || {
                let mut ghost = GhostCache::new(TICK, TICK, BENCH_SIZE);
                for i in 0..BENCH_SIZE {
                    ghost.access(i);
                }
                ghost
            },
            |mut ghost| {
                for i in BENCH_SIZE..2 * BENCH_SIZE {
                    ghost.access(std::hint::black_box(i));
                }
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_ghost_random(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(0x537);
    let reqs: Vec<u32> = (0..BENCH_SIZE)
        .map(|_| rng.random::<u32>() % BENCH_SIZE)
        .collect();

    c.bench_function("ghost_random_exact", |b| {
        b.iter_batched(
            || {
                let mut ghost = GhostCache::new(TICK, TICK, BENCH_SIZE);
                for i in 0..BENCH_SIZE {
                    ghost.access(i);
                }
                ghost
            },
            |mut ghost| {
                for &key in &reqs {
                    ghost.access(std::hint::black_box(key));
                }
            },
            BatchSize::LargeInput,
        )
    });

    c.bench_function("ghost_random_sampled", |b| {
        b.iter_batched(
            || {
                let mut ghost: SampledGhostCache<SAMPLE_SHIFT> =
                    SampledGhostCache::new(TICK, TICK, BENCH_SIZE);
                for i in 0..BENCH_SIZE {
                    ghost.access(i);
                }
                ghost
            },
            |mut ghost| {
                for &key in &reqs {
                    ghost.access(std::hint::black_box(key));
                }
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_ghost_fill,
    bench_ghost_hit,
    bench_ghost_miss,
    bench_ghost_random
);
criterion_main!(benches);
