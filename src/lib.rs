pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod upstream;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use logic::{
    shape, FilingLookup, FilingsBody, LookupError, LookupOutcome, LookupRequest, LookupSettings,
};

// Export all model types
pub use model::*;

pub use upstream::{
    Dataset, DatasetSource, GeoclientClient, GeoclientError, SocrataClient, UpstreamError,
};

use std::sync::Arc;

use crate::api::handlers::{AppState, ServiceState};
use crate::config::AppConfig;

/// Build the shared state backed by the live Socrata API
pub fn build_state(config: &AppConfig) -> anyhow::Result<AppState<SocrataClient>> {
    let source = Arc::new(SocrataClient::new(&config.socrata)?);
    Ok(Arc::new(ServiceState::new(source, config)?))
}
