//! # Conduit Runtime
//!
//! Process bootstrap for applications built on the container and the bus.
//! The `conduit` binary in `main.rs` is a thin shell around [`ConduitRuntime`].
//!
//! ## Modules
//!
//! - `config/` - TOML file plus `CONDUIT_*` environment overrides
//! - `registry/` - Components and their manifests
//! - `handlers/` - Built-in logging, metrics and instrumentation handlers
//! - `wiring/` - Manifest handlers into the container, then onto the bus
//! - `runtime/` - Startup and shutdown sequencing

#![allow(clippy::type_complexity)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod handlers;
pub mod registry;
pub mod runtime;
pub mod wiring;

pub use config::{ConfigError, RuntimeConfig};
pub use handlers::{InstrumentedHandler, LoggingHandler, MetricsHandler};
pub use registry::{Component, ComponentRegistry, HandlerDecl, RegistryError};
pub use runtime::ConduitRuntime;
pub use wiring::{handler_key, wire_components, HandlerCatalog, WiringError, WiringReport, HANDLER_TAG};
