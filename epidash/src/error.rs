//! Error types.

#[derive(thiserror::Error, Debug)]
pub enum EpidashError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Required column '{column}' missing from {table}")]
    MissingColumn { table: String, column: String },
    #[error("Region not present in the loaded data: {0}")]
    UnknownRegion(String),
    #[error("Country not present in the loaded data: {0}")]
    UnknownCountry(String),
    #[error("Geography is unavailable: {0}")]
    GeographyUnavailable(String),
    #[error("Invalid geography: {0}")]
    InvalidGeography(String),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped geojson error: {0}")]
    GeoJsonError(#[from] geojson::Error),
    #[error("Wrapped serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Wrapped reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type EpidashResult<T> = Result<T, EpidashError>;
