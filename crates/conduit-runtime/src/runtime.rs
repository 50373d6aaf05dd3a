//! The process runtime: one container, one bus, the component registry.
//!
//! ## Startup Sequence
//!
//! 1. Register then boot service providers
//! 2. Load component manifests from the configuration
//! 3. Bind, resolve and subscribe component handlers
//! 4. Subscribe the built-in logging and metrics handlers on `*`
//! 5. Start the bus dispatch loop
//!
//! ## Shutdown Sequence
//!
//! 1. Stop accepting messages
//! 2. Drain queued envelopes and in-flight handlers, up to the stop timeout

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use conduit_bus::{MessageBus, MessageHandler, WILDCARD};
use conduit_container::{Concrete, Container, ServiceProvider};
use conduit_telemetry::{BUS_SUBSCRIPTIONS, CONTAINER_BINDINGS};
use tracing::info;

use crate::config::RuntimeConfig;
use crate::handlers::{LoggingHandler, MetricsHandler};
use crate::registry::ComponentRegistry;
use crate::wiring::{wire_components, HandlerCatalog, WiringReport};

pub struct ConduitRuntime {
    config: RuntimeConfig,
    container: Arc<Container>,
    bus: Arc<MessageBus>,
    components: Arc<ComponentRegistry>,
    catalog: HandlerCatalog,
    providers: Vec<Arc<dyn ServiceProvider>>,
    /// Set by the first `start`, successful or not.
    started: AtomicBool,
}

impl ConduitRuntime {
    /// Create the shared services and bind them into the container.
    ///
    /// Nothing runs until [`start`](Self::start).
    pub fn new(config: RuntimeConfig) -> Self {
        let container = Arc::new(Container::new());
        let bus = Arc::new(MessageBus::with_config(config.bus_config()));
        let components = Arc::new(ComponentRegistry::new());

        container.singleton::<MessageBus>(Concrete::instance(Arc::clone(&bus)));
        container.singleton::<ComponentRegistry>(Concrete::instance(Arc::clone(&components)));
        container.singleton::<RuntimeConfig>(Concrete::instance(Arc::new(config.clone())));

        Self {
            config,
            container,
            bus,
            components,
            catalog: HandlerCatalog::new(),
            providers: Vec::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Make a handler recipe available to manifests under `name`.
    #[must_use]
    pub fn with_handler(mut self, name: impl Into<String>, recipe: Concrete<dyn MessageHandler>) -> Self {
        self.catalog.register(name, recipe);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn ServiceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    #[must_use]
    pub fn container(&self) -> Arc<Container> {
        Arc::clone(&self.container)
    }

    #[must_use]
    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }

    #[must_use]
    pub fn components(&self) -> Arc<ComponentRegistry> {
        Arc::clone(&self.components)
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Bootstrap providers, wire components and start the bus.
    ///
    /// Must be called from within a Tokio runtime, once. A failed start
    /// leaves partial bindings and subscriptions behind and cannot be
    /// retried; build a new runtime instead.
    pub fn start(&self) -> Result<WiringReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("runtime already started");
        }
        info!(
            providers = self.providers.len(),
            manifests = self.config.manifests.len(),
            "Starting Conduit runtime"
        );

        // Step 1: Providers
        self.container
            .bootstrap(&self.providers)
            .context("service provider bootstrap failed")?;

        // Step 2: Manifests
        for path in &self.config.manifests {
            self.components
                .load_manifest(path)
                .with_context(|| format!("failed to load manifest {}", path.display()))?;
        }

        // Step 3: Component handlers
        let report = wire_components(&self.container, &self.bus, &self.components, &self.catalog)
            .context("handler wiring failed")?;

        // Step 4: Built-in observers
        self.bus.subscribe(WILDCARD, Arc::new(LoggingHandler));
        self.bus.subscribe(WILDCARD, Arc::new(MetricsHandler));

        CONTAINER_BINDINGS.set(self.container.len() as f64);
        BUS_SUBSCRIPTIONS.set(
            self.bus
                .patterns()
                .iter()
                .map(|p| self.bus.subscriber_count(p))
                .sum::<usize>() as i64,
        );

        // Step 5: Dispatch loop
        self.bus.start().context("failed to start message bus")?;

        info!(
            components = self.components.len(),
            handlers = report.handlers.len(),
            bindings = self.container.len(),
            "Conduit runtime started"
        );
        Ok(report)
    }

    /// Stop the bus, waiting at most the configured stop timeout.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");
        self.bus
            .stop(self.config.stop_timeout())
            .await
            .context("message bus did not drain in time")?;
        info!("Shutdown complete");
        Ok(())
    }
}
