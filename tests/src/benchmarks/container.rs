//! # Container Resolution Benchmarks
//!
//! Claims to validate:
//! - Cached singleton lookup stays flat as the binding count grows
//! - Non-shared factory resolution is dominated by the recipe itself
//! - `make_with` overrides add little over a plain constructor call

use std::sync::Arc;

use conduit_container::{CapabilityKey, Concrete, Container, Params};
use criterion::{black_box, BenchmarkId, Criterion, Throughput};

trait Codec: Send + Sync {
    fn id(&self) -> usize;
}

struct Json(usize);

impl Codec for Json {
    fn id(&self) -> usize {
        self.0
    }
}

/// Container with `n` named singleton bindings of `dyn Codec`.
fn populated(n: usize) -> Container {
    let container = Container::new();
    for i in 0..n {
        container.singleton_key(
            CapabilityKey::named::<dyn Codec>(format!("codec-{i}")),
            Concrete::<dyn Codec>::factory(move |_c: &Container| Ok(Arc::new(Json(i)) as Arc<dyn Codec>)),
        );
    }
    container
}

pub fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("container-resolution");

    for size in [10usize, 100, 1_000] {
        let container = populated(size);
        let key = CapabilityKey::named::<dyn Codec>(format!("codec-{}", size / 2));
        // Warm the singleton cache.
        let _ = container.make_key::<dyn Codec>(&key);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("singleton_cached", size), &key, |b, key| {
            b.iter(|| black_box(container.make_key::<dyn Codec>(key).map(|c| c.id())))
        });
    }

    let container = Container::new();
    container.factory::<dyn Codec, _>(|_c| Ok(Arc::new(Json(7)) as Arc<dyn Codec>));
    group.bench_function("factory_fresh", |b| {
        b.iter(|| black_box(container.make::<dyn Codec>().map(|c| c.id())))
    });

    let container = Container::new();
    container.bind::<String>(Concrete::constructor(|args| {
        let base = args.get::<String>("base")?;
        Ok(Arc::new(format!("{base}/v1")))
    }));
    let params = Params::new().with_value("base", "https://example.invalid".to_string());
    group.bench_function("make_with_override", |b| {
        b.iter(|| black_box(container.make_with::<String>(&params).map(|s| s.len())))
    });

    group.finish();
}
