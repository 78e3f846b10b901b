use std::sync::Arc;

use tracing::info;

use super::{
    claims::AdminCodeClaimService,
    config::Config,
    database::{Store, StoreError},
};

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub claims: AdminCodeClaimService<Store>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, StoreError> {
        let store = Store::open(&config.store).await?;

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Store) -> Arc<Self> {
        info!("Registry key: {}", config.store.registry_key);

        let claims = AdminCodeClaimService::new(
            store.clone(),
            config.store.registry_key.clone(),
            config.store.retry.clone(),
        );

        Arc::new(Self {
            config,
            store,
            claims,
        })
    }
}
