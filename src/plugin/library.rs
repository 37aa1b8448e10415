//! Shared-library plugins via libloading.
//!
//! A plugin library exports one entry point returning its factory:
//!
//! ```ignore
//! #[no_mangle]
//! pub extern "C" fn simfleet_component_factory() -> Box<dyn ComponentFactory> {
//!     Box::new(MyTransportFactory::default())
//! }
//! ```
//!
//! Plugins must be built with the same toolchain as the host.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use tracing::{error, info};

use super::{ComponentFactory, PluginError, PluginLoader, PluginManifest, Result};
use crate::transport::ServiceBus;

/// Name of the exported factory entry point.
pub const FACTORY_ENTRY_SYMBOL: &str = "simfleet_component_factory";

/// Type signature of the factory entry point.
/// Trait objects are not FFI-safe in general; host and plugin share a toolchain.
#[allow(improper_ctypes_definitions)]
pub type FactoryEntryFn = unsafe extern "C" fn() -> Box<dyn ComponentFactory>;

/// Factory from a loaded library. Keeps the library mapped while the
/// factory (or anything holding this wrapper) is alive.
struct LibraryComponentFactory {
    // Dropped before `_library`.
    factory: Box<dyn ComponentFactory>,
    _library: Library,
}

impl ComponentFactory for LibraryComponentFactory {
    fn create_component(&self, iid: &str) -> Option<Arc<dyn ServiceBus>> {
        self.factory.create_component(iid)
    }
}

fn open_plugin(path: &Path) -> Result<LibraryComponentFactory> {
    let library = unsafe { Library::new(path) }.map_err(|e| {
        error!(error = %e, path = %path.display(), "Failed to load transport plugin");
        PluginError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let factory = {
        let entry: Symbol<FactoryEntryFn> = unsafe { library.get(FACTORY_ENTRY_SYMBOL.as_bytes()) }
            .map_err(|e| {
                error!(error = %e, path = %path.display(), "Failed to find factory entry point");
                PluginError::MissingEntryPoint {
                    path: path.to_path_buf(),
                    symbol: FACTORY_ENTRY_SYMBOL,
                }
            })?;
        unsafe { entry() }
    };

    Ok(LibraryComponentFactory {
        factory,
        _library: library,
    })
}

/// Loads the plugins listed in a manifest file.
pub struct ManifestPluginLoader {
    manifest_path: PathBuf,
}

impl ManifestPluginLoader {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }
}

impl PluginLoader for ManifestPluginLoader {
    fn load(&self) -> Result<Vec<Arc<dyn ComponentFactory>>> {
        let manifest = PluginManifest::load(&self.manifest_path)?;
        manifest
            .plugins
            .iter()
            .map(|entry| {
                let factory = open_plugin(&entry.path)?;
                info!(path = %entry.path.display(), "Loaded transport plugin");
                Ok(Arc::new(factory) as Arc<dyn ComponentFactory>)
            })
            .collect()
    }
}
