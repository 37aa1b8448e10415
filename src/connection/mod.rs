//! Shared transport connections.
//!
//! [`ConnectionFactory`] hands out one [`Connection`] per
//! `(system name, discovery URL)`. Connections are reference counted: every
//! system, participant proxy and logger built against the same key shares
//! one, and it is released when the last handle is dropped. The factory
//! only keeps weak references, so it never pins a connection nobody uses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::SimfleetConfig;
use crate::plugin::{
    ComponentFactory, ManifestPluginLoader, PluginError, PluginLoader, StaticPluginLoader,
};
use crate::transport::{
    is_default_url, ServiceBus, SystemAccess, TransportError, SERVICE_BUS_IID,
};

/// Errors raised while creating a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("can not create a service bus connection. no plugin supports {iid}")]
    NoPlugin { iid: &'static str },

    #[error("can not create system access in service bus connection for system '{system}' at '{url}': {source}")]
    SystemAccess {
        system: String,
        url: String,
        #[source]
        source: TransportError,
    },
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Identity of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub system_name: String,
    pub url: String,
}

impl ConnectionKey {
    pub fn new(system_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            system_name: system_name.into(),
            url: url.into(),
        }
    }
}

#[derive(Default)]
struct ConnectionRegistry {
    entries: Mutex<HashMap<ConnectionKey, Weak<ConnectionInner>>>,
}

impl ConnectionRegistry {
    /// Evict dead entries, then return the live connection for `key`.
    fn lookup(&self, key: &ConnectionKey) -> Option<Arc<ConnectionInner>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.get(key).and_then(Weak::upgrade)
    }

    fn insert(&self, key: ConnectionKey, connection: &Arc<ConnectionInner>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::downgrade(connection));
    }

    /// Drop the entry for `key` if it still refers to `released`.
    fn release(&self, key: &ConnectionKey, released: *const ConnectionInner) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(key)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), released))
        {
            entries.remove(key);
        }
    }

    fn live(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

struct ConnectionInner {
    key: ConnectionKey,
    system_access: Arc<dyn SystemAccess>,
    service_bus: Arc<dyn ServiceBus>,
    // Keeps the plugin that created the bus loaded. Dropped after the bus.
    _factory: Arc<dyn ComponentFactory>,
    registry: Weak<ConnectionRegistry>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.key, self as *const ConnectionInner);
        }
        debug!(
            system = %self.key.system_name,
            url = %self.key.url,
            "Connection released"
        );
    }
}

/// Shared handle to a system's transport connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn key(&self) -> &ConnectionKey {
        &self.inner.key
    }

    pub fn system_name(&self) -> &str {
        &self.inner.key.system_name
    }

    pub fn url(&self) -> &str {
        &self.inner.key.url
    }

    pub fn system_access(&self) -> &Arc<dyn SystemAccess> {
        &self.inner.system_access
    }

    pub fn service_bus(&self) -> &Arc<dyn ServiceBus> {
        &self.inner.service_bus
    }

    /// Whether both handles refer to the same connection.
    pub fn ptr_eq(a: &Connection, b: &Connection) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Number of handles to this connection.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("system_name", &self.inner.key.system_name)
            .field("url", &self.inner.key.url)
            .finish()
    }
}

/// Creates and de-duplicates connections.
///
/// Construct one per process and share it (`Arc<ConnectionFactory>`) with
/// every system. Plugins are loaded once, on first use.
pub struct ConnectionFactory {
    loader: Box<dyn PluginLoader>,
    plugins: OnceCell<Vec<Arc<dyn ComponentFactory>>>,
    create_lock: tokio::sync::Mutex<()>,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionFactory {
    pub fn new(loader: Box<dyn PluginLoader>) -> Self {
        Self {
            loader,
            plugins: OnceCell::new(),
            create_lock: tokio::sync::Mutex::new(()),
            registry: Arc::new(ConnectionRegistry::default()),
        }
    }

    /// Factory over plugins compiled into the process.
    pub fn with_factories(factories: Vec<Arc<dyn ComponentFactory>>) -> Self {
        Self::new(Box::new(StaticPluginLoader::new(factories)))
    }

    /// Factory loading the plugin manifest named in `config`, if any.
    pub fn from_config(config: &SimfleetConfig) -> Self {
        match &config.plugins.manifest {
            Some(path) => Self::new(Box::new(ManifestPluginLoader::new(path.clone()))),
            None => Self::new(Box::new(StaticPluginLoader::default())),
        }
    }

    /// Load plugins now instead of on first connection. Returns how many
    /// factories are available.
    pub async fn load_plugins(&self) -> Result<usize> {
        Ok(self.plugins().await?.len())
    }

    async fn plugins(&self) -> Result<&Vec<Arc<dyn ComponentFactory>>> {
        let plugins = self
            .plugins
            .get_or_try_init(|| async {
                let plugins = self.loader.load()?;
                info!(count = plugins.len(), "Transport plugins loaded");
                Ok::<_, ConnectionError>(plugins)
            })
            .await?;
        Ok(plugins)
    }

    /// Live connection for `(system_name, url)`, creating it if needed.
    pub async fn create_or_get(&self, system_name: &str, url: &str) -> Result<Connection> {
        let _guard = self.create_lock.lock().await;
        let key = ConnectionKey::new(system_name, url);

        if let Some(inner) = self.registry.lookup(&key) {
            debug!(system = %system_name, url = %url, "Reusing connection");
            return Ok(Connection { inner });
        }

        let (factory, service_bus) = self
            .plugins()
            .await?
            .iter()
            .find_map(|factory| {
                factory
                    .create_component(SERVICE_BUS_IID)
                    .map(|bus| (Arc::clone(factory), bus))
            })
            .ok_or(ConnectionError::NoPlugin {
                iid: SERVICE_BUS_IID,
            })?;

        let system_access = service_bus
            .create_system_access(system_name, url, is_default_url(url))
            .await
            .map_err(|source| ConnectionError::SystemAccess {
                system: system_name.to_string(),
                url: url.to_string(),
                source,
            })?;

        let inner = Arc::new(ConnectionInner {
            key: key.clone(),
            system_access,
            service_bus,
            _factory: factory,
            registry: Arc::downgrade(&self.registry),
        });
        self.registry.insert(key, &inner);
        info!(system = %system_name, url = %url, "Connection created");

        Ok(Connection { inner })
    }

    /// Number of connections currently alive.
    pub fn live_connections(&self) -> usize {
        self.registry.live()
    }
}
