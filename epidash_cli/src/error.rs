use epidash::error::EpidashError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum EpidashCliError {
    #[error("Anyhow error: {0:#}")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("epidash error: {0}")]
    EpidashError(#[from] EpidashError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type EpidashCliResult<T> = Result<T, EpidashCliError>;
