//! The capability resolver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument, trace};

use crate::binding::{Binding, Concrete, Params, Resolved};
use crate::error::{BoxError, ContainerError};
use crate::inject::{Injectable, Injector};
use crate::key::CapabilityKey;

struct Entry {
    binding: Binding,
    /// Registration order; also identifies the registration a cached
    /// instance was built from.
    seq: u64,
}

/// Dependency-injection container.
///
/// Bindings and the singleton cache sit behind separate `RwLock`s, always
/// taken in that order. No lock is held while a recipe runs, so recipes may
/// resolve their own dependencies through the container.
#[derive(Default)]
pub struct Container {
    bindings: RwLock<HashMap<CapabilityKey, Entry>>,
    instances: RwLock<HashMap<CapabilityKey, Resolved>>,
    next_seq: AtomicU64,
}

impl Container {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register `binding` under `key`, replacing any previous binding and its
    /// cached instance.
    pub fn register(&self, key: CapabilityKey, binding: Binding) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(
            key = %key,
            produces = binding.produces(),
            shared = binding.is_shared(),
            "Binding capability"
        );

        let mut bindings = self.bindings.write();
        let replaced = bindings.insert(key.clone(), Entry { binding, seq }).is_some();
        if replaced {
            self.instances.write().remove(&key);
            debug!(key = %key, "Replaced existing binding");
        }
    }

    pub fn bind<T: ?Sized + Send + Sync + 'static>(&self, concrete: Concrete<T>) {
        self.bind_key(CapabilityKey::of::<T>(), concrete);
    }

    pub fn bind_key<T: ?Sized + Send + Sync + 'static>(&self, key: CapabilityKey, concrete: Concrete<T>) {
        self.register(key, Binding::new(concrete));
    }

    pub fn singleton<T: ?Sized + Send + Sync + 'static>(&self, concrete: Concrete<T>) {
        self.singleton_key(CapabilityKey::of::<T>(), concrete);
    }

    pub fn singleton_key<T: ?Sized + Send + Sync + 'static>(&self, key: CapabilityKey, concrete: Concrete<T>) {
        self.register(key, Binding::new(concrete).shared());
    }

    /// Register a non-shared factory for `T`.
    pub fn factory<T, F>(&self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.factory_key(CapabilityKey::of::<T>(), factory);
    }

    pub fn factory_key<T, F>(&self, key: CapabilityKey, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.register(key, Binding::factory(factory));
    }

    pub fn bind_tagged<T, I, S>(&self, concrete: Concrete<T>, tags: I)
    where
        T: ?Sized + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bind_tagged_key(CapabilityKey::of::<T>(), concrete, tags);
    }

    pub fn bind_tagged_key<T, I, S>(&self, key: CapabilityKey, concrete: Concrete<T>, tags: I)
    where
        T: ?Sized + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(key, Binding::new(concrete).tagged(tags));
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    pub fn make<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.make_key(&CapabilityKey::of::<T>())
    }

    pub fn make_key<T: ?Sized + Send + Sync + 'static>(&self, key: &CapabilityKey) -> Result<Arc<T>, ContainerError> {
        self.resolve(key, None)?.into_typed::<T>()
    }

    /// Resolve `T`, offering `params` to a constructor recipe.
    ///
    /// Factories and instances ignore the overrides, and a shared binding
    /// that is already cached returns the cached instance.
    pub fn make_with<T: ?Sized + Send + Sync + 'static>(&self, params: &Params) -> Result<Arc<T>, ContainerError> {
        self.make_key_with(&CapabilityKey::of::<T>(), params)
    }

    pub fn make_key_with<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &CapabilityKey,
        params: &Params,
    ) -> Result<Arc<T>, ContainerError> {
        self.resolve(key, Some(params))?.into_typed::<T>()
    }

    /// Resolve `key` without knowing its type.
    pub fn resolve(&self, key: &CapabilityKey, params: Option<&Params>) -> Result<Resolved, ContainerError> {
        let (binding, seq) = {
            let bindings = self.bindings.read();
            let entry = bindings
                .get(key)
                .ok_or_else(|| ContainerError::NotFound { key: key.clone() })?;
            (entry.binding.clone(), entry.seq)
        };
        self.resolve_binding(key, &binding, seq, params)
    }

    fn resolve_binding(
        &self,
        key: &CapabilityKey,
        binding: &Binding,
        seq: u64,
        params: Option<&Params>,
    ) -> Result<Resolved, ContainerError> {
        if binding.is_shared() {
            if let Some(cached) = self.instances.read().get(key) {
                trace!(key = %key, "Singleton cache hit");
                return Ok(cached.clone());
            }
        }

        let built = binding.build(self, key, params)?;
        if !binding.is_shared() {
            return Ok(built);
        }

        // First writer wins: a concurrent build that lost the race hands out
        // the stored instance and drops its own.
        let bindings = self.bindings.read();
        if bindings.get(key).map(|entry| entry.seq) != Some(seq) {
            // Rebound while building; the result belongs to a stale binding.
            return Ok(built);
        }
        let mut instances = self.instances.write();
        let stored = instances.entry(key.clone()).or_insert(built);
        Ok(stored.clone())
    }

    #[must_use]
    pub fn has<T: ?Sized + 'static>(&self) -> bool {
        self.has_key(&CapabilityKey::of::<T>())
    }

    #[must_use]
    pub fn has_key(&self, key: &CapabilityKey) -> bool {
        self.bindings.read().contains_key(key)
    }

    /// Resolve every binding carrying `tag`, in registration order.
    ///
    /// The first failure aborts the whole call.
    #[instrument(skip(self))]
    pub fn tagged(&self, tag: &str) -> Result<Vec<Resolved>, ContainerError> {
        let mut matching: Vec<(CapabilityKey, Binding, u64)> = self
            .bindings
            .read()
            .iter()
            .filter(|(_, entry)| entry.binding.has_tag(tag))
            .map(|(key, entry)| (key.clone(), entry.binding.clone(), entry.seq))
            .collect();
        matching.sort_by_key(|(_, _, seq)| *seq);

        debug!(count = matching.len(), "Resolving tagged bindings");
        matching
            .iter()
            .map(|(key, binding, seq)| self.resolve_binding(key, binding, *seq, None))
            .collect()
    }

    /// As [`Container::tagged`], downcasting every result to `T`.
    pub fn tagged_as<T: ?Sized + Send + Sync + 'static>(&self, tag: &str) -> Result<Vec<Arc<T>>, ContainerError> {
        self.tagged(tag)?
            .into_iter()
            .map(Resolved::into_typed::<T>)
            .collect()
    }

    // =========================================================================
    // Auto-wiring
    // =========================================================================

    /// Fill the empty dependency slots of `target` declared by its injector.
    pub fn autowire<S: Injectable>(&self, target: &mut S) -> Result<(), ContainerError> {
        S::injector().inject(self, target)
    }

    pub fn autowire_with<S: 'static>(&self, target: &mut S, injector: &Injector<S>) -> Result<(), ContainerError> {
        injector.inject(self, target)
    }

    /// Auto-wire a target that is already behind an `Arc`.
    ///
    /// Fails with `InvalidTarget` while other references to it exist.
    pub fn autowire_shared<S: Injectable>(&self, target: &mut Arc<S>) -> Result<(), ContainerError> {
        let target = Arc::get_mut(target).ok_or_else(|| ContainerError::InvalidTarget {
            reason: format!(
                "{} is shared and cannot be written to",
                std::any::type_name::<S>()
            ),
        })?;
        self.autowire(target)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Registered keys in registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<CapabilityKey> {
        let bindings = self.bindings.read();
        let mut keys: Vec<_> = bindings.iter().map(|(key, entry)| (entry.seq, key.clone())).collect();
        keys.sort_by_key(|(seq, _)| *seq);
        keys.into_iter().map(|(_, key)| key).collect()
    }

    #[must_use]
    pub fn tags_of(&self, key: &CapabilityKey) -> Vec<String> {
        self.bindings
            .read()
            .get(key)
            .map(|entry| entry.binding.tags().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.len())
            .field("instances", &self.instances.read().len())
            .finish()
    }
}
