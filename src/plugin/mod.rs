//! Transport plugins.
//!
//! A plugin contributes a [`ComponentFactory`] that can create the
//! transport's [`ServiceBus`]. Plugins are obtained through a
//! [`PluginLoader`]: [`ManifestPluginLoader`] opens shared libraries listed
//! in a manifest, [`StaticPluginLoader`] hands out factories compiled into
//! the process.

mod library;
mod manifest;

pub use library::{FactoryEntryFn, ManifestPluginLoader, FACTORY_ENTRY_SYMBOL};
pub use manifest::{PluginEntry, PluginManifest, CPP_PLUGIN_SOURCE_TYPE, MANIFEST_SCHEMA_VERSION};

use std::path::PathBuf;
use std::sync::Arc;

use crate::transport::ServiceBus;

/// Errors raised while loading plugins.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("can not read plugin manifest {path}: {reason}")]
    ManifestRead { path: PathBuf, reason: String },

    #[error("can not parse plugin manifest {path}: {reason}")]
    ManifestParse { path: PathBuf, reason: String },

    #[error("plugin manifest {path} has schema version '{found}', expected '{expected}'")]
    SchemaVersion {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },

    #[error("plugin manifest {path}: unknown plugin source type '{source_type}'")]
    UnknownSourceType { path: PathBuf, source_type: String },

    #[error("can not load plugin {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("plugin {path} does not export {symbol}")]
    MissingEntryPoint { path: PathBuf, symbol: &'static str },
}

pub type Result<T> = std::result::Result<T, PluginError>;

/// Factory contributed by a transport plugin.
///
/// Implementations:
/// - Shared libraries loaded by `ManifestPluginLoader`
/// - `transport::mock::MockComponentFactory`: in-memory network
pub trait ComponentFactory: Send + Sync {
    /// Create the component implementing `iid`, or `None` if this plugin
    /// does not provide it.
    fn create_component(&self, iid: &str) -> Option<Arc<dyn ServiceBus>>;
}

/// Source of component factories.
pub trait PluginLoader: Send + Sync {
    /// Load every plugin, in registration order.
    fn load(&self) -> Result<Vec<Arc<dyn ComponentFactory>>>;
}

/// Loader over factories already present in the process.
#[derive(Default)]
pub struct StaticPluginLoader {
    factories: Vec<Arc<dyn ComponentFactory>>,
}

impl StaticPluginLoader {
    pub fn new(factories: Vec<Arc<dyn ComponentFactory>>) -> Self {
        Self { factories }
    }

    pub fn with_factory(mut self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.factories.push(factory);
        self
    }
}

impl PluginLoader for StaticPluginLoader {
    fn load(&self) -> Result<Vec<Arc<dyn ComponentFactory>>> {
        Ok(self.factories.clone())
    }
}
