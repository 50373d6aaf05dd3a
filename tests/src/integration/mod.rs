//! # Integration Flows
//!
//! Each module drives the public API of more than one crate, the way an
//! application would.

pub mod container_flows;
pub mod runtime_flows;
pub mod shutdown_flows;
