//! Error types for capability resolution.

use thiserror::Error;

use crate::key::CapabilityKey;

/// Error type returned by constructor and factory recipes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while binding, resolving or auto-wiring capabilities.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No binding is registered under the key.
    #[error("no binding found for {key}")]
    NotFound { key: CapabilityKey },

    /// A constructor or factory failed.
    #[error("failed to construct {key}: {source}")]
    Construction {
        key: CapabilityKey,
        #[source]
        source: BoxError,
    },

    /// The auto-wire target cannot be written to.
    #[error("invalid autowire target: {reason}")]
    InvalidTarget { reason: String },

    /// The binding produced a value of a different type than requested.
    #[error("binding for {key} does not produce {expected}")]
    TypeMismatch {
        key: CapabilityKey,
        expected: &'static str,
    },

    /// A required auto-wire field could not be resolved.
    #[error("failed to resolve field `{field}`: {source}")]
    Injection {
        field: &'static str,
        #[source]
        source: Box<ContainerError>,
    },
}

impl ContainerError {
    /// Map a recipe failure onto the container's error space.
    ///
    /// Container errors raised by nested resolutions pass through unchanged,
    /// anything else is attributed to `key`.
    pub(crate) fn from_recipe(key: &CapabilityKey, err: BoxError) -> Self {
        match err.downcast::<ContainerError>() {
            Ok(inner) => *inner,
            Err(source) => ContainerError::Construction {
                key: key.clone(),
                source,
            },
        }
    }

    /// Whether this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound { .. })
    }
}
