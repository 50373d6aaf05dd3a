//! # Subscriber Registry
//!
//! Pattern -> ordered handler list. A message matches, in this order, the
//! handlers under its exact slug, under its exact category, and under the
//! wildcard [`WILDCARD`]. Nothing is deduplicated: a handler registered under
//! two matching patterns runs twice.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::handler::MessageHandler;
use crate::message::Message;

/// Pattern matching every message.
pub const WILDCARD: &str = "*";

#[derive(Default)]
pub struct SubscriberRegistry {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn MessageHandler>>>>,
}

/// Handler identity is the allocation, not the vtable.
fn same_handler(a: &Arc<dyn MessageHandler>, b: &Arc<dyn MessageHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, pattern: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let pattern = pattern.into();
        debug!(pattern = %pattern, handler = handler.name(), "Handler subscribed");
        self.handlers.write().entry(pattern).or_default().push(handler);
    }

    /// Remove the first registration of `handler` under `pattern`.
    ///
    /// Returns whether anything was removed.
    pub fn unsubscribe(&self, pattern: &str, handler: &Arc<dyn MessageHandler>) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(pattern) else {
            return false;
        };
        let Some(position) = list.iter().position(|h| same_handler(h, handler)) else {
            return false;
        };
        list.remove(position);
        if list.is_empty() {
            handlers.remove(pattern);
        }
        debug!(pattern, handler = handler.name(), "Handler unsubscribed");
        true
    }

    /// Snapshot of the handlers matching `message`, in invocation order.
    #[must_use]
    pub fn matching(&self, message: &dyn Message) -> Vec<Arc<dyn MessageHandler>> {
        let handlers = self.handlers.read();
        [message.slug(), message.category(), WILDCARD]
            .iter()
            .filter_map(|pattern| handlers.get(*pattern))
            .flat_map(|list| list.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn count(&self, pattern: &str) -> usize {
        self.handlers.read().get(pattern).map_or(0, Vec::len)
    }

    /// Patterns with at least one handler, sorted.
    #[must_use]
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<_> = self.handlers.read().keys().cloned().collect();
        patterns.sort();
        patterns
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }
}
