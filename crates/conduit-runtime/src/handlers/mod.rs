//! Built-in bus handlers installed by the runtime.
//!
//! - [`LoggingHandler`]: wildcard subscriber tracing every message
//! - [`MetricsHandler`]: wildcard subscriber counting messages by slug and category
//! - [`InstrumentedHandler`]: wrapper timing a component handler and counting its failures

use std::sync::Arc;

use async_trait::async_trait;
use conduit_bus::{HandlerContext, HandlerResult, MessageHandler, SharedMessage};
use conduit_telemetry::{HistogramTimer, BUS_HANDLER_DURATION, BUS_HANDLER_FAILURES, BUS_MESSAGES_RECEIVED};
use tracing::{debug, warn};

/// Logs each message at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, ctx: &HandlerContext, message: SharedMessage) -> HandlerResult {
        debug!(
            slug = message.slug(),
            category = message.category(),
            delivery = ?ctx.delivery(),
            metadata = message.metadata().len(),
            "Message received"
        );
        Ok(None)
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Counts each message in `conduit_bus_messages_received_total`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsHandler;

#[async_trait]
impl MessageHandler for MetricsHandler {
    async fn handle(&self, _ctx: &HandlerContext, message: SharedMessage) -> HandlerResult {
        conduit_telemetry::metric_inc!(
            BUS_MESSAGES_RECEIVED,
            &[message.slug(), message.category()]
        );
        Ok(None)
    }

    fn name(&self) -> &str {
        "metrics"
    }
}

/// Times the inner handler and counts its failures under `name`.
pub struct InstrumentedHandler {
    name: String,
    inner: Arc<dyn MessageHandler>,
}

impl InstrumentedHandler {
    pub fn new(name: impl Into<String>, inner: Arc<dyn MessageHandler>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    pub fn wrap(name: impl Into<String>, inner: Arc<dyn MessageHandler>) -> Arc<dyn MessageHandler> {
        Arc::new(Self::new(name, inner))
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<dyn MessageHandler> {
        &self.inner
    }
}

impl std::fmt::Debug for InstrumentedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedHandler")
            .field("name", &self.name)
            .field("inner", &self.inner.name())
            .finish()
    }
}

#[async_trait]
impl MessageHandler for InstrumentedHandler {
    async fn handle(&self, ctx: &HandlerContext, message: SharedMessage) -> HandlerResult {
        let _timer = HistogramTimer::new(&BUS_HANDLER_DURATION, &self.name);
        let slug = message.slug().to_string();
        let result = self.inner.handle(ctx, message).await;
        if let Err(err) = &result {
            BUS_HANDLER_FAILURES.with_label_values(&[self.name.as_str()]).inc();
            warn!(handler = %self.name, slug = %slug, error = %err, "Handler failed");
        }
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
