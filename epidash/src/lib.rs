use std::sync::Arc;

use anyhow::Result;
use data::CaseData;
use geo::{GeoSource, Geography};
use log::{debug, warn};

use crate::{config::Config, controller::Dashboard};

// Re-exports
pub use column_names as COL;

// Modules
pub mod aggregate;
pub mod cache;
pub mod charts;
pub mod column_names;
pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod formatters;
pub mod geo;
pub mod page;
pub mod selection;

/// Loaded case tables and boundaries for one dashboard session
pub struct Epidash {
    pub config: Config,
    pub data: Arc<CaseData>,
    /// Load error message when the boundaries are unavailable
    pub geography: Result<Arc<Geography>, String>,
}

impl Epidash {
    /// Setup the Epidash object with default configuration
    pub async fn new() -> Result<Self> {
        Self::new_with_config(Config::default()).await
    }

    /// Setup the Epidash object with custom configuration. A failure to load the case tables is
    /// an error; a failure to load the geography is kept so the views without a map still work.
    pub async fn new_with_config(config: Config) -> Result<Self> {
        debug!("config: {config:?}");
        let source = GeoSource::from(config.geography.as_str());
        let (data, geography) =
            tokio::join!(data::load_cases(&config), geo::load_geography(&source));
        let geography = geography.map_err(|err| {
            warn!("Failed to load geography: {err:#}");
            format!("{err:#}")
        });
        Ok(Self {
            data: data?,
            geography,
            config,
        })
    }

    /// A controller over the loaded data starting from the default selection
    pub fn dashboard(&self) -> error::EpidashResult<Dashboard> {
        Dashboard::new(
            Arc::clone(&self.data),
            self.geography.clone(),
            self.config.top_n,
        )
    }
}
