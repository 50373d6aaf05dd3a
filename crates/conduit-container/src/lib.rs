//! # Conduit Container
//!
//! Capability resolver: turns requests for abstract capabilities (usually
//! `dyn Trait`) into concrete instances.
//!
//! ## Concepts
//!
//! | Concept | Type | Notes |
//! |---------|------|-------|
//! | Capability key | [`CapabilityKey`] | `TypeId` + optional name |
//! | Recipe | [`Concrete`] | instance, constructor or factory |
//! | Registry entry | [`Binding`] | recipe + `shared` flag + tags |
//! | Auto-wire plan | [`Injector`] | ordered `Option<Arc<T>>` slots |
//! | Grouped registration | [`ServiceProvider`] | register, then boot |
//!
//! ## Resolution
//!
//! ```text
//! make(key) ──► binding? ──no──► NotFound
//!                  │
//!                 yes
//!                  ▼
//!          shared && cached? ──yes──► cached instance
//!                  │
//!                  no
//!                  ▼
//!        build (factory / constructor / instance)
//!                  │
//!          shared? ──yes──► insert-if-absent into cache
//!                  ▼
//!               instance
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use conduit_container::{Concrete, Container};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//!
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "hello".into()
//!     }
//! }
//!
//! let container = Container::new();
//! container.singleton::<dyn Greeter>(Concrete::instance(Arc::new(English)));
//!
//! let greeter = container.make::<dyn Greeter>().unwrap();
//! assert_eq!(greeter.greet(), "hello");
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod binding;
pub mod container;
pub mod error;
pub mod inject;
pub mod key;
pub mod provider;

pub use binding::{Args, Binding, Concrete, Params, Resolved};
pub use container::Container;
pub use error::{BoxError, ContainerError};
pub use inject::{Injectable, Injector, Requirement};
pub use key::CapabilityKey;
pub use provider::ServiceProvider;
