use super::{ContainerCatalog, ImageCatalog};
use crate::domain::{DaemonInfo, EngineClient, ServerVersion};
use anyhow::Result;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Entry point of the object model: wraps one engine client and hands out
/// catalogs bound to it.
///
/// Clones share the client and the version cache.
#[derive(Debug, Clone)]
pub struct Connection {
    client: Arc<dyn EngineClient>,
    version: Arc<OnceLock<ServerVersion>>,
}

impl Connection {
    pub fn new(client: Arc<dyn EngineClient>) -> Self {
        Self {
            client,
            version: Arc::new(OnceLock::new()),
        }
    }

    pub fn client(&self) -> &dyn EngineClient {
        self.client.as_ref()
    }

    /// Engine version. Fetched on first use and never refreshed; open a new
    /// connection to observe an engine upgrade.
    pub fn version(&self) -> Result<ServerVersion> {
        if let Some(version) = self.version.get() {
            return Ok(version.clone());
        }

        let fetched = self.client.daemon_version()?;
        debug!(version = ?fetched.version, "versão do engine resolvida");
        Ok(self.version.get_or_init(|| fetched).clone())
    }

    /// Engine-wide information, fetched on every call
    pub fn info(&self) -> Result<DaemonInfo> {
        self.client.daemon_info()
    }

    /// Storage driver, fetched on every call
    pub fn driver(&self) -> Result<Option<String>> {
        Ok(self.client.daemon_info()?.driver)
    }

    pub fn is_local(&self) -> bool {
        self.client
            .endpoint()
            .is_none_or(|endpoint| endpoint.starts_with("unix://"))
    }

    /// A freshly listed image catalog. Not cached.
    pub fn images(&self) -> Result<ImageCatalog> {
        ImageCatalog::new(self.clone())
    }

    /// A freshly listed container catalog; `all` includes stopped containers.
    pub fn containers(&self, all: bool) -> Result<ContainerCatalog> {
        ContainerCatalog::new(self.clone(), all)
    }
}
