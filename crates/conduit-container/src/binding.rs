//! Bindings: how a capability is produced.
//!
//! A [`Concrete`] is the typed recipe (pre-built instance, constructor or
//! factory). A [`Binding`] erases it and adds the registry flags (`shared`,
//! tags) so bindings of different types can live in one map.

use std::any::{type_name, Any};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::error::{BoxError, ContainerError};
use crate::key::CapabilityKey;

type ConstructorFn<T> = dyn Fn(&Args<'_>) -> Result<Arc<T>, BoxError> + Send + Sync;
type FactoryFn<T> = dyn Fn(&Container) -> Result<Arc<T>, BoxError> + Send + Sync;
type ErasedBuild =
    dyn Fn(&Container, &CapabilityKey, Option<&Params>) -> Result<Resolved, ContainerError>
        + Send
        + Sync;

enum Recipe<T: ?Sized> {
    Instance(Arc<T>),
    Constructor(Arc<ConstructorFn<T>>),
    Factory(Arc<FactoryFn<T>>),
}

/// Typed recipe for a capability of type `T`.
pub struct Concrete<T: ?Sized> {
    recipe: Recipe<T>,
}

impl<T: ?Sized + Send + Sync + 'static> Concrete<T> {
    /// A pre-built instance, handed out as-is.
    pub fn instance(instance: Arc<T>) -> Self {
        Self {
            recipe: Recipe::Instance(instance),
        }
    }

    /// A constructor whose arguments are pulled through [`Args`].
    ///
    /// Arguments come from `make_with` overrides first and fall back to the
    /// container.
    pub fn constructor<F>(constructor: F) -> Self
    where
        F: Fn(&Args<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self {
            recipe: Recipe::Constructor(Arc::new(constructor)),
        }
    }

    /// A factory called with the container on every build.
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Container) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self {
            recipe: Recipe::Factory(Arc::new(factory)),
        }
    }

    fn build(
        &self,
        container: &Container,
        key: &CapabilityKey,
        params: Option<&Params>,
    ) -> Result<Arc<T>, ContainerError> {
        match &self.recipe {
            Recipe::Instance(instance) => Ok(Arc::clone(instance)),
            Recipe::Constructor(constructor) => {
                let args = Args::new(container, params);
                constructor(&args).map_err(|err| ContainerError::from_recipe(key, err))
            }
            Recipe::Factory(factory) => {
                factory(container).map_err(|err| ContainerError::from_recipe(key, err))
            }
        }
    }
}

impl<T: ?Sized> Clone for Concrete<T> {
    fn clone(&self) -> Self {
        let recipe = match &self.recipe {
            Recipe::Instance(instance) => Recipe::Instance(Arc::clone(instance)),
            Recipe::Constructor(constructor) => Recipe::Constructor(Arc::clone(constructor)),
            Recipe::Factory(factory) => Recipe::Factory(Arc::clone(factory)),
        };
        Self { recipe }
    }
}

impl<T: ?Sized> fmt::Debug for Concrete<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.recipe {
            Recipe::Instance(_) => "instance",
            Recipe::Constructor(_) => "constructor",
            Recipe::Factory(_) => "factory",
        };
        write!(f, "Concrete<{}>({kind})", type_name::<T>())
    }
}

/// A type-erased registry entry.
#[derive(Clone)]
pub struct Binding {
    build: Arc<ErasedBuild>,
    produces: &'static str,
    shared: bool,
    tags: BTreeSet<String>,
}

impl Binding {
    pub fn new<T: ?Sized + Send + Sync + 'static>(concrete: Concrete<T>) -> Self {
        let build = move |container: &Container, key: &CapabilityKey, params: Option<&Params>| {
            concrete
                .build(container, key, params)
                .map(|instance| Resolved::new(key.clone(), instance))
        };
        Self {
            build: Arc::new(build),
            produces: type_name::<T>(),
            shared: false,
            tags: BTreeSet::new(),
        }
    }

    pub fn factory<T, F>(factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self::new(Concrete::factory(factory))
    }

    /// Cache the first built instance and hand it out on every resolution.
    #[must_use]
    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    #[must_use]
    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Name of the type the recipe produces.
    #[must_use]
    pub fn produces(&self) -> &'static str {
        self.produces
    }

    pub(crate) fn build(
        &self,
        container: &Container,
        key: &CapabilityKey,
        params: Option<&Params>,
    ) -> Result<Resolved, ContainerError> {
        (self.build)(container, key, params)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("produces", &self.produces)
            .field("shared", &self.shared)
            .field("tags", &self.tags)
            .finish()
    }
}

/// A resolved capability with its type erased.
///
/// Holds an `Arc<T>` for the `T` the binding produces; [`Resolved::downcast`]
/// recovers it.
#[derive(Clone)]
pub struct Resolved {
    key: CapabilityKey,
    value: Arc<dyn Any + Send + Sync>,
}

impl Resolved {
    pub(crate) fn new<T: ?Sized + Send + Sync + 'static>(key: CapabilityKey, value: Arc<T>) -> Self {
        Self {
            key,
            value: Arc::new(value),
        }
    }

    #[must_use]
    pub fn key(&self) -> &CapabilityKey {
        &self.key
    }

    /// Recover the typed instance, `None` if `T` is not the produced type.
    #[must_use]
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// As [`Resolved::downcast`], failing with `TypeMismatch`.
    pub fn into_typed<T: ?Sized + Send + Sync + 'static>(self) -> Result<Arc<T>, ContainerError> {
        self.downcast::<T>().ok_or(ContainerError::TypeMismatch {
            key: self.key,
            expected: type_name::<T>(),
        })
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolved").field(&self.key).finish()
    }
}

/// Named argument overrides for `make_with`.
#[derive(Clone, Default)]
pub struct Params {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shared value under `name`.
    #[must_use]
    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, name: impl Into<String>, value: Arc<T>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add an owned value under `name`.
    #[must_use]
    pub fn with_value<T: Send + Sync + 'static>(self, name: impl Into<String>, value: T) -> Self {
        self.with(name, Arc::new(value))
    }

    pub fn insert<T: ?Sized + Send + Sync + 'static>(&mut self, name: impl Into<String>, value: Arc<T>) {
        self.values.insert(name.into(), Arc::new(value));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Result<Arc<T>, ContainerError>> {
        self.values.get(name).map(|value| {
            value
                .downcast_ref::<Arc<T>>()
                .cloned()
                .ok_or_else(|| ContainerError::TypeMismatch {
                    key: CapabilityKey::named::<T>(name.to_string()),
                    expected: type_name::<T>(),
                })
        })
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Argument source handed to constructor recipes.
pub struct Args<'a> {
    container: &'a Container,
    params: Option<&'a Params>,
}

impl<'a> Args<'a> {
    pub(crate) fn new(container: &'a Container, params: Option<&'a Params>) -> Self {
        Self { container, params }
    }

    /// Argument `name` of type `T`: the override if one was passed, else the
    /// unnamed binding of `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        match self.param::<T>(name) {
            Some(value) => value,
            None => self.container.make::<T>(),
        }
    }

    /// Override for `name` only, without falling back to the container.
    pub fn param<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Result<Arc<T>, ContainerError>> {
        self.params.and_then(|params| params.get::<T>(name))
    }

    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.container.make::<T>()
    }

    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        self.container
            .make_key::<T>(&CapabilityKey::named::<T>(name.to_string()))
    }

    #[must_use]
    pub fn container(&self) -> &Container {
        self.container
    }
}
