//! # Handler Wiring
//!
//! Connects component manifests to the bus through the container:
//!
//! ```text
//!   ComponentRegistry        HandlerCatalog             Container
//!   ─────────────────        ──────────────             ─────────
//!   accounts                 "audit"  ─► Concrete ──►  dyn MessageHandler#accounts/audit
//!     audit  [user.created]                              tags: bus.handler, accounts
//!                                                            │ make_key
//!                                                            ▼
//!                                     MessageBus ◄── InstrumentedHandler("accounts/audit")
//!                                     subscribe("user.created")
//! ```
//!
//! Each declared handler becomes a shared, tagged binding so other services
//! can find every bus handler with `container.tagged(HANDLER_TAG)`.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_bus::{MessageBus, MessageHandler};
use conduit_container::{Binding, CapabilityKey, Concrete, Container, ContainerError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::handlers::InstrumentedHandler;
use crate::registry::ComponentRegistry;

/// Tag carried by every handler binding created by [`wire_components`].
pub const HANDLER_TAG: &str = "bus.handler";

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("component {component} declares unknown handler {handler}")]
    UnknownHandler { component: String, handler: String },

    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Named handler recipes that manifests refer to.
#[derive(Debug, Default, Clone)]
pub struct HandlerCatalog {
    recipes: HashMap<String, Concrete<dyn MessageHandler>>,
}

impl HandlerCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, recipe: Concrete<dyn MessageHandler>) {
        self.recipes.insert(name.into(), recipe);
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, recipe: Concrete<dyn MessageHandler>) -> Self {
        self.register(name, recipe);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Concrete<dyn MessageHandler>> {
        self.recipes.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    /// Recipe names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.recipes.keys().cloned().collect();
        names.sort();
        names
    }
}

/// What [`wire_components`] did.
#[derive(Default)]
pub struct WiringReport {
    /// Handler bindings created, as `component/handler`.
    pub handlers: Vec<String>,
    /// Every subscription made, in order.
    pub subscriptions: Vec<(String, Arc<dyn MessageHandler>)>,
}

impl WiringReport {
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl std::fmt::Debug for WiringReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<_> = self.subscriptions.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("WiringReport")
            .field("handlers", &self.handlers)
            .field("subscriptions", &patterns)
            .finish()
    }
}

/// Key under which a component's handler is bound.
#[must_use]
pub fn handler_key(component: &str, handler: &str) -> CapabilityKey {
    CapabilityKey::named::<dyn MessageHandler>(format!("{component}/{handler}"))
}

/// Bind, resolve and subscribe every handler declared by registered components.
///
/// Components are visited in name order. Fails on the first handler missing
/// from the catalog or failing to build; subscriptions made before the
/// failure stay in place.
pub fn wire_components(
    container: &Container,
    bus: &MessageBus,
    registry: &ComponentRegistry,
    catalog: &HandlerCatalog,
) -> Result<WiringReport, WiringError> {
    let mut report = WiringReport::default();

    for component in registry.list() {
        for decl in &component.handlers {
            let recipe = catalog.get(&decl.name).ok_or_else(|| WiringError::UnknownHandler {
                component: component.name.clone(),
                handler: decl.name.clone(),
            })?;

            let binding_name = format!("{}/{}", component.name, decl.name);
            let key = handler_key(&component.name, &decl.name);
            container.register(
                key.clone(),
                Binding::new(recipe.clone())
                    .shared()
                    .tagged([HANDLER_TAG, component.name.as_str()]),
            );

            let handler: Arc<dyn MessageHandler> = container.make_key(&key)?;
            let handler = InstrumentedHandler::wrap(binding_name.clone(), handler);

            if decl.patterns.is_empty() {
                warn!(handler = %binding_name, "Handler declares no patterns; it will never run");
            }
            for pattern in &decl.patterns {
                debug!(handler = %binding_name, pattern = %pattern, "Subscribing handler");
                bus.subscribe(pattern.clone(), Arc::clone(&handler));
                report.subscriptions.push((pattern.clone(), Arc::clone(&handler)));
            }
            report.handlers.push(binding_name);
        }
    }

    info!(
        handlers = report.handlers.len(),
        subscriptions = report.subscriptions.len(),
        "Component handlers wired"
    );
    Ok(report)
}
