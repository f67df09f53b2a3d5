//! Shared application state.

use std::sync::Arc;

use meridian_consumers::ReportingConsumer;
use meridian_core::repository::EventStore;

use crate::read_model::AssetRegisterProjection;
use crate::wiring::Services;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event store the bus appends to.
    pub store: Arc<dyn EventStore>,
    /// Asset register read model.
    pub assets: Arc<AssetRegisterProjection>,
    /// Counters kept by the reporting role.
    pub reporting: Arc<ReportingConsumer>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        assets: Arc<AssetRegisterProjection>,
        reporting: Arc<ReportingConsumer>,
    ) -> Self {
        Self {
            store,
            assets,
            reporting,
        }
    }

    /// State over the components of a wired worker.
    #[must_use]
    pub fn from_services(services: &Services) -> Self {
        Self::new(
            Arc::clone(&services.store),
            Arc::clone(&services.assets),
            Arc::clone(&services.reporting),
        )
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
