//! Auto-wiring.
//!
//! A target type declares its dependency slots once, as an [`Injector`]:
//! an ordered list of `Option<Arc<T>>` fields, each required or optional.
//! Wiring walks the list, leaves filled slots alone and resolves the rest.
//!
//! ```ignore
//! struct Mailer {
//!     transport: Option<Arc<dyn Transport>>,
//!     audit: Option<Arc<dyn AuditLog>>,
//! }
//!
//! impl Injectable for Mailer {
//!     fn injector() -> Injector<Self> {
//!         Injector::new()
//!             .required("transport", |m: &mut Mailer| &mut m.transport)
//!             .optional("audit", |m: &mut Mailer| &mut m.audit)
//!     }
//! }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::container::Container;
use crate::error::ContainerError;
use crate::key::CapabilityKey;

/// Whether an unresolvable slot fails the wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

type InjectFn<S> = dyn Fn(&Container, &mut S) -> Result<(), ContainerError> + Send + Sync;

struct InjectionPoint<S> {
    field: &'static str,
    requirement: Requirement,
    inject: Box<InjectFn<S>>,
}

/// Ordered injection plan for targets of type `S`.
pub struct Injector<S> {
    points: Vec<InjectionPoint<S>>,
}

impl<S: 'static> Injector<S> {
    #[must_use]
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Slot resolved from the unnamed binding of `T`; wiring fails if it
    /// cannot be resolved.
    #[must_use]
    pub fn required<T>(self, field: &'static str, slot: fn(&mut S) -> &mut Option<Arc<T>>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.point(field, Requirement::Required, CapabilityKey::of::<T>(), slot)
    }

    /// Slot left empty when `T` cannot be resolved.
    #[must_use]
    pub fn optional<T>(self, field: &'static str, slot: fn(&mut S) -> &mut Option<Arc<T>>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.point(field, Requirement::Optional, CapabilityKey::of::<T>(), slot)
    }

    /// Slot resolved from an explicit key, e.g. a named binding.
    #[must_use]
    pub fn with_key<T>(
        self,
        field: &'static str,
        requirement: Requirement,
        key: CapabilityKey,
        slot: fn(&mut S) -> &mut Option<Arc<T>>,
    ) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.point(field, requirement, key, slot)
    }

    fn point<T>(
        mut self,
        field: &'static str,
        requirement: Requirement,
        key: CapabilityKey,
        slot: fn(&mut S) -> &mut Option<Arc<T>>,
    ) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let inject = move |container: &Container, target: &mut S| {
            let slot = slot(target);
            if slot.is_some() {
                return Ok(());
            }
            match container.make_key::<T>(&key) {
                Ok(instance) => {
                    *slot = Some(instance);
                    Ok(())
                }
                Err(err) if requirement == Requirement::Optional => {
                    debug!(field, key = %key, error = %err, "Skipping optional dependency");
                    Ok(())
                }
                Err(err) => Err(ContainerError::Injection {
                    field,
                    source: Box::new(err),
                }),
            }
        };
        self.points.push(InjectionPoint {
            field,
            requirement,
            inject: Box::new(inject),
        });
        self
    }

    /// Declared fields with their requirement, in wiring order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, Requirement)> + '_ {
        self.points.iter().map(|point| (point.field, point.requirement))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Wire `target`, stopping at the first required slot that fails.
    pub fn inject(&self, container: &Container, target: &mut S) -> Result<(), ContainerError> {
        for point in &self.points {
            (point.inject)(container, target)?;
        }
        Ok(())
    }
}

impl<S: 'static> Default for Injector<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Types that know their own injection plan.
pub trait Injectable: Sized + 'static {
    fn injector() -> Injector<Self>;
}
