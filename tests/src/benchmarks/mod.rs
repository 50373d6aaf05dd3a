//! # Conduit Benchmarks
//!
//! Workloads shared by `benches/bus_benchmarks.rs`. Each function registers
//! one criterion group.

pub mod container;
