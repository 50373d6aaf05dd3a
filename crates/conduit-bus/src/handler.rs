//! # Message Handlers
//!
//! Consumers implement [`MessageHandler`] or wrap an async closure with
//! [`handler_fn`].

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::message::SharedMessage;

/// Error type accepted as the cause of a [`HandlerError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How the envelope being handled was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// `publish`: fire-and-forget, one task per handler.
    Async,
    /// `publish_sync`: handlers run in order and the publisher waits.
    Sync,
}

/// Per-invocation context.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    delivery: Delivery,
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl HandlerContext {
    pub fn new(delivery: Delivery, cancel: CancellationToken, shutdown: CancellationToken) -> Self {
        Self {
            delivery,
            cancel,
            shutdown,
        }
    }

    #[must_use]
    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Token passed by the publisher.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancelled once the bus starts shutting down.
    #[must_use]
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Whether either the publisher or the bus gave up.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.shutdown.is_cancelled()
    }
}

/// Failure reported by a handler. Displays as its message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Wrap any error, keeping its display text.
    pub fn from_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    pub(crate) fn panicked(handler: &str, payload: &(dyn std::any::Any + Send)) -> Self {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::new(format!("handler {handler} panicked: {reason}"))
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Result of a handler invocation: an optional response message.
///
/// Responses are returned to nobody on the async path and are never
/// re-published.
pub type HandlerResult = Result<Option<SharedMessage>, HandlerError>;

/// A message consumer.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, message: SharedMessage) -> HandlerResult;

    /// Name used in logs.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// Handler backed by an async closure.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(HandlerContext, SharedMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: &HandlerContext, message: SharedMessage) -> HandlerResult {
        (self.f)(ctx.clone(), message).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Adapt an async closure into a shareable handler.
///
/// Keep the returned `Arc` to unsubscribe later; identity is by allocation.
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(HandlerContext, SharedMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}
