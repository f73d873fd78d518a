use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use shared_owner::Shared;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn bench_new(c: &mut Criterion) {
    c.bench_function("shared_new_inline", |b| {
        b.iter(|| black_box(Shared::new(black_box(42u64))))
    });
    // Two allocations: the box and the control block.
    c.bench_function("shared_from_box", |b| {
        b.iter(|| black_box(Shared::from_box(Box::new(black_box(42u64)))))
    });
    c.bench_function("arc_new_baseline", |b| {
        b.iter(|| black_box(Arc::new(black_box(42u64))))
    });
}

fn bench_clone_drop(c: &mut Criterion) {
    c.bench_function("shared_clone_drop", |b| {
        let s = Shared::new(String::from("payload"));
        b.iter(|| {
            let x = s.clone();
            black_box(&x);
            drop(x);
        })
    });
    c.bench_function("arc_clone_drop_baseline", |b| {
        let s = Arc::new(String::from("payload"));
        b.iter(|| {
            let x = s.clone();
            black_box(&x);
            drop(x);
        })
    });
}

fn bench_upgrade(c: &mut Criterion) {
    c.bench_function("weak_upgrade_live", |b| {
        let s = Shared::new(7u32);
        let w = Shared::downgrade(&s);
        b.iter(|| black_box(w.upgrade()))
    });
    c.bench_function("weak_upgrade_expired", |b| {
        let w = Shared::downgrade(&Shared::new(7u32));
        b.iter(|| black_box(w.upgrade()))
    });
}

fn bench_slice(c: &mut Criterion) {
    c.bench_function("shared_slice_default_1k", |b| {
        b.iter_batched(
            || 1024usize,
            |len| black_box(Shared::<[u64]>::new_slice_default(len)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_contended_clone(c: &mut Criterion) {
    c.bench_function("shared_clone_drop_4_threads", |b| {
        let s = Shared::new(0u64);
        b.iter(|| {
            thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| {
                        for _ in 0..1_000 {
                            black_box(s.clone());
                        }
                    });
                }
            })
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_new, bench_clone_drop, bench_upgrade, bench_slice, bench_contended_clone
}
criterion_main!(benches);
