//! # Conduit Benchmarks
//!
//! | Area | Claim | Target |
//! |------|-------|--------|
//! | Container | Cached singleton lookup | < 1µs |
//! | Container | Factory resolution | < 2µs |
//! | Bus | `publish_sync` round trip, 1 handler | < 50µs |
//! | Bus | Async publish batch of 1000 | < 5ms |

use conduit_tests::benchmarks::{bus, container};
use criterion::{criterion_group, criterion_main};

criterion_group!(
    benches,
    container::bench_resolution,
    bus::bench_publish_sync,
    bus::bench_publish_async,
);
criterion_main!(benches);
