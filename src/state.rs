use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::AppResult,
    service::{catalog::Catalog, Providers, ServiceRegistry},
    storage::StorageManager,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: StorageManager,
    pub services: ServiceRegistry,
}

impl AppState {
    pub async fn init(config: AppConfig) -> AppResult<Self> {
        let storage = StorageManager::init(&config).await?;
        let providers = Providers::from_config(&config).map_err(anyhow::Error::from)?;

        let catalog_path = config.server.catalog_path.clone();
        let state = Self::with_providers(config, storage, providers);

        if !catalog_path.is_empty() {
            Catalog::load(&catalog_path).await?.apply(&state.services).await?;
        }

        Ok(state)
    }

    pub fn with_providers(config: AppConfig, storage: StorageManager, providers: Providers) -> Self {
        let config = Arc::new(config);
        let services = ServiceRegistry::new(Arc::clone(&config), &storage, providers);

        Self {
            config,
            storage,
            services,
        }
    }
}
