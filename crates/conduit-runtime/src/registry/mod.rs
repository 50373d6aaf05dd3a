//! # Component Registry
//!
//! Components are the deployable units of an application: each one names the
//! handlers it contributes to the bus and the patterns they listen on.
//! Components arrive through TOML manifests:
//!
//! ```toml
//! name = "accounts"
//! version = "1.2.0"
//! type = "package"
//!
//! [[components]]
//! name = "accounts-audit"
//! handlers = [
//!     { name = "audit", patterns = ["user.created", "user.deleted"] },
//!     { name = "mailer", patterns = ["event"] },
//! ]
//!
//! [components.metadata]
//! owner = "identity-team"
//! ```
//!
//! A component inherits the manifest's `name`, `version`, `type` and
//! top-level `[metadata]` when it leaves them empty, and its `path` defaults
//! to the manifest path.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("component name is required")]
    MissingName,

    #[error("component {0} not found")]
    NotFound(String),

    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {message}")]
    Parse { path: String, message: String },

    #[error("failed to register component {name}: {source}")]
    Register {
        name: String,
        #[source]
        source: Box<RegistryError>,
    },
}

/// A handler contributed by a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerDecl {
    /// Name of the handler recipe in the catalog.
    pub name: String,
    /// Bus patterns to subscribe it under.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// A registered component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Component {
    pub name: String,
    pub version: String,
    /// package, recipe, component
    #[serde(rename = "type")]
    pub kind: String,
    pub path: PathBuf,
    pub handlers: Vec<HandlerDecl>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_handler<I, S>(mut self, name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handlers.push(HandlerDecl {
            name: name.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        });
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestFile {
    name: String,
    version: String,
    #[serde(rename = "type")]
    kind: String,
    components: Vec<Component>,
    metadata: BTreeMap<String, serde_json::Value>,
}

/// Thread-safe component map keyed by name.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: RwLock<HashMap<String, Arc<Component>>>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component, replacing any component with the same name.
    pub fn register(&self, component: Component) -> Result<(), RegistryError> {
        if component.name.is_empty() {
            return Err(RegistryError::MissingName);
        }
        debug!(
            component = %component.name,
            version = %component.version,
            handlers = component.handlers.len(),
            "Registering component"
        );
        self.components
            .write()
            .insert(component.name.clone(), Arc::new(component));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<Component>, RegistryError> {
        self.components
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// All components sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Component>> {
        let mut components: Vec<_> = self.components.read().values().cloned().collect();
        components.sort_by(|a, b| a.name.cmp(&b.name));
        components
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.components.read().contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }

    /// Read a manifest file and register its components.
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn load_manifest<P: AsRef<Path> + std::fmt::Debug>(&self, path: P) -> Result<usize, RegistryError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.parse_manifest(&content, path)
    }

    /// Register the components of a manifest already in memory.
    ///
    /// `origin` fills in component paths. Stops at the first component that
    /// fails to register; components before it stay registered.
    pub fn parse_manifest(&self, content: &str, origin: &Path) -> Result<usize, RegistryError> {
        let manifest: ManifestFile = toml::from_str(content).map_err(|e| RegistryError::Parse {
            path: origin.display().to_string(),
            message: e.to_string(),
        })?;

        let count = manifest.components.len();
        for mut component in manifest.components {
            if component.name.is_empty() {
                component.name = manifest.name.clone();
            }
            if component.version.is_empty() {
                component.version = manifest.version.clone();
            }
            if component.kind.is_empty() {
                component.kind = manifest.kind.clone();
            }
            if component.path.as_os_str().is_empty() {
                component.path = origin.to_path_buf();
            }
            if component.metadata.is_empty() {
                component.metadata = manifest.metadata.clone();
            }
            let name = component.name.clone();
            self.register(component).map_err(|source| RegistryError::Register {
                name,
                source: Box::new(source),
            })?;
        }

        info!(manifest = %manifest.name, components = count, "Manifest loaded");
        Ok(count)
    }
}
