//! # Conduit Bus - In-Process Message Bus
//!
//! Decouples producers and consumers of events, commands and queries inside
//! one process. Nothing here crosses a process boundary.
//!
//! ## Delivery Modes
//!
//! | Call | Returns when | Handler errors |
//! |------|--------------|----------------|
//! | [`MessageBus::publish`] | envelope is queued | logged and counted, never returned |
//! | [`MessageBus::publish_sync`] | every matched handler ran | first error returned |
//!
//! ## Matching
//!
//! ```text
//! message { slug: "user.created", type: "event" }
//!
//!   handlers["user.created"]  ─┐
//!   handlers["event"]         ─┼──► invocation order
//!   handlers["*"]             ─┘
//! ```
//!
//! ## Lifecycle
//!
//! `Unstarted ──start()──► Running ──stop(deadline)──► Stopped`
//!
//! `stop` refuses new envelopes, drains the queue, then waits for in-flight
//! handler tasks until the deadline.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

use std::time::Duration;

pub mod bus;
mod envelope;
pub mod error;
pub mod handler;
pub mod message;
pub mod subscriber;

// Re-export main types
pub use bus::{BusConfig, BusState, BusStats, MessageBus};
pub use error::BusError;
pub use handler::{
    handler_fn, Delivery, FnHandler, HandlerContext, HandlerError, HandlerResult, MessageHandler,
};
pub use message::{category, BaseMessage, Message, Metadata, SharedMessage};
pub use subscriber::{SubscriberRegistry, WILDCARD};
pub use tokio_util::sync::CancellationToken;

/// Envelopes buffered before `publish` suspends.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Deadline for [`MessageBus::shutdown`].
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
