use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use anyhow::Context;
use geojson::{feature::Id, Feature, GeoJson};
use log::{debug, info};
use polars::frame::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    cache::LoadCache,
    error::{EpidashError, EpidashResult},
    selection::Disease,
    COL,
};

/// Where to read the country boundaries from
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeoSource {
    Url(String),
    Path(PathBuf),
}

impl From<&str> for GeoSource {
    fn from(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            GeoSource::Url(value.to_string())
        } else {
            GeoSource::Path(PathBuf::from(value))
        }
    }
}

/// Country boundary features, each identified by an ISO3 code
#[derive(Debug, Clone, PartialEq)]
pub struct Geography {
    pub features: Vec<Feature>,
}

/// A feature left-joined with the case count of its country. `cases` is `None` when no row
/// matched the feature id or the matched count is null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedFeature {
    pub id: String,
    pub name: Option<String>,
    pub cases: Option<f64>,
}

fn feature_id(feature: &Feature) -> Option<String> {
    match feature.id.as_ref()? {
        Id::String(id) => Some(id.trim().to_uppercase()),
        Id::Number(n) => Some(n.to_string()),
    }
}

impl Geography {
    pub fn from_geojson_str(contents: &str) -> EpidashResult<Self> {
        match contents.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => Ok(Self {
                features: collection.features,
            }),
            _ => Err(EpidashError::InvalidGeography(
                "expected a FeatureCollection".into(),
            )),
        }
    }

    /// Features as plain JSON values, ready to embed as Vega-Lite data
    pub fn features_json(&self) -> EpidashResult<Vec<Value>> {
        Ok(self
            .features
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Left join of the features with `cases` on feature id == ISO3. When several rows share an
    /// ISO3 code the first one wins, so each feature matches at most one row.
    pub fn join_cases(
        &self,
        cases: &DataFrame,
        disease: Disease,
    ) -> EpidashResult<Vec<JoinedFeature>> {
        let codes = cases.column(COL::ISO3)?.str()?;
        let values = cases.column(disease.column())?.f64()?;
        let mut by_code: HashMap<&str, Option<f64>> = HashMap::new();
        for (code, value) in codes.into_iter().zip(values.into_iter()) {
            if let Some(code) = code {
                by_code.entry(code).or_insert(value);
            }
        }

        let joined: Vec<JoinedFeature> = self
            .features
            .iter()
            .filter_map(|feature| {
                let id = feature_id(feature)?;
                let cases = by_code.get(id.as_str()).copied().flatten();
                let name = feature
                    .property("name")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(JoinedFeature { id, name, cases })
            })
            .collect();
        debug!(
            "Joined {} features, {} with case values",
            joined.len(),
            joined.iter().filter(|f| f.cases.is_some()).count()
        );
        Ok(joined)
    }
}

fn geography_cache() -> &'static LoadCache<GeoSource, Geography> {
    static CACHE: OnceLock<LoadCache<GeoSource, Geography>> = OnceLock::new();
    CACHE.get_or_init(|| LoadCache::new("geography"))
}

/// Fetch the boundary collection once per source; later calls reuse the parsed result.
pub async fn load_geography(source: &GeoSource) -> anyhow::Result<Arc<Geography>> {
    geography_cache()
        .get_or_load(source.clone(), read_geography(source))
        .await
}

async fn read_geography(source: &GeoSource) -> anyhow::Result<Geography> {
    let contents = match source {
        GeoSource::Url(url) => {
            info!("Fetching geography from {url}");
            reqwest::Client::new()
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?
        }
        GeoSource::Path(path) => {
            info!("Reading geography from {}", path.display());
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read '{}'", path.display()))?
        }
    };
    let geography = Geography::from_geojson_str(&contents)?;
    info!("Loaded {} geography features", geography.features.len());
    Ok(geography)
}
