use std::sync::Arc;

use paygate::{GateStore, InMemoryGateStore, Resolver, SqliteGateStore, StoreError, UpstreamClient};

use crate::config::GatewayConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub resolver: Resolver,
}

impl AppState {
    pub fn new(config: GatewayConfig, store: Arc<dyn GateStore>) -> Result<Self, reqwest::Error> {
        let upstream =
            UpstreamClient::new(config.upstream_timeout, !config.allow_private_upstreams)?;
        let resolver = Resolver::new(store, upstream, config.contract);
        Ok(Self {
            config: Arc::new(config),
            resolver,
        })
    }

    pub fn store(&self) -> &Arc<dyn GateStore> {
        self.resolver.store()
    }
}

/// Open the store selected by `DB_PATH`.
pub fn open_store(config: &GatewayConfig) -> Result<Arc<dyn GateStore>, StoreError> {
    if config.in_memory() {
        tracing::warn!("DB_PATH=:memory:, gates and sessions will not survive a restart");
        return Ok(Arc::new(InMemoryGateStore::new()));
    }
    Ok(Arc::new(SqliteGateStore::open(&config.db_path)?))
}
