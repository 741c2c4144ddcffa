use std::sync::Arc;

use imgpipe_core::{Config, ImageService, TaskStore};

/// Shared application state
pub struct AppState {
    config: Config,
    service: Arc<ImageService>,
    store: Arc<dyn TaskStore>,
}

impl AppState {
    pub fn new(config: Config, service: Arc<ImageService>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            config,
            service,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &ImageService {
        self.service.as_ref()
    }

    /// Read-only access for status gauges.
    pub fn store(&self) -> &dyn TaskStore {
        self.store.as_ref()
    }
}
