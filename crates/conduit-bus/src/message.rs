//! # Messages
//!
//! Anything published on the bus implements [`Message`]. Matching only looks
//! at the slug and the category; typed payloads are recovered by handlers
//! through [`downcast_ref`](trait.Message.html#method.downcast_ref).

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form message metadata.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Messages are shared, never copied, once published.
pub type SharedMessage = Arc<dyn Message>;

/// Well-known message categories.
pub mod category {
    pub const EVENT: &str = "event";
    pub const COMMAND: &str = "command";
    pub const QUERY: &str = "query";
}

/// A publishable message.
pub trait Message: fmt::Debug + Send + Sync + 'static {
    /// Exact routing key, e.g. `user.created`. Must not be empty.
    fn slug(&self) -> &str;

    /// Coarse routing key, e.g. `event`.
    fn category(&self) -> &str;

    fn metadata(&self) -> &Metadata;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Message {
    /// Recover the concrete message type.
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// General purpose message with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseMessage {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub slug: String,
    #[serde(rename = "type")]
    pub category: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl BaseMessage {
    pub fn new(slug: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            category: category.into(),
            metadata: Metadata::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn event(slug: impl Into<String>) -> Self {
        Self::new(slug, category::EVENT)
    }

    pub fn command(slug: impl Into<String>) -> Self {
        Self::new(slug, category::COMMAND)
    }

    pub fn query(slug: impl Into<String>) -> Self {
        Self::new(slug, category::QUERY)
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Wrap for publishing.
    #[must_use]
    pub fn shared(self) -> SharedMessage {
        Arc::new(self)
    }
}

impl Message for BaseMessage {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
