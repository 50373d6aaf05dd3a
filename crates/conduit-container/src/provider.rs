//! Service providers: grouped registration with a boot phase.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::container::Container;
use crate::error::ContainerError;

/// A unit of related bindings.
///
/// `register` only binds; `boot` runs after every provider has registered and
/// may resolve anything.
pub trait ServiceProvider: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, container: &Container) -> Result<(), ContainerError>;

    fn boot(&self, _container: &Container) -> Result<(), ContainerError> {
        Ok(())
    }
}

impl Container {
    /// Register every provider, then boot every provider, in order.
    #[instrument(skip_all, fields(providers = providers.len()))]
    pub fn bootstrap(&self, providers: &[Arc<dyn ServiceProvider>]) -> Result<(), ContainerError> {
        for provider in providers {
            provider.register(self).inspect_err(|e| {
                error!(provider = provider.name(), error = %e, "Provider registration failed");
            })?;
            info!(provider = provider.name(), "Provider registered");
        }
        for provider in providers {
            provider.boot(self).inspect_err(|e| {
                error!(provider = provider.name(), error = %e, "Provider boot failed");
            })?;
            info!(provider = provider.name(), "Provider booted");
        }
        Ok(())
    }
}
