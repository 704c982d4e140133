use crate::pyspider::PySpiderClient;
use crate::store::Store;
use nxweb_core::AppConfig;
use nxweb_core::DbResult;

/// Shared dashboard handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub pyspider: PySpiderClient,
}

impl AppState {
    pub fn new(store: Store, pyspider: PySpiderClient) -> Self {
        Self { store, pyspider }
    }

    /// Opens the configured database and points the client at the crawler.
    pub fn from_config(config: &AppConfig) -> DbResult<Self> {
        Ok(Self::new(
            Store::open(&config.db_path)?,
            PySpiderClient::new(config.pyspider_url.clone()),
        ))
    }
}
