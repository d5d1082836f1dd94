use std::sync::Arc;

use parkway_config::AppConfig;
use parkway_db::UserStore;

/// Shared application state accessible from all request handlers.
pub struct AppState {
    pub config: AppConfig,
    pub users: UserStore,
}

impl AppState {
    pub fn new(config: AppConfig, users: UserStore) -> Self {
        Self { config, users }
    }
}

pub type SharedState = Arc<AppState>;
