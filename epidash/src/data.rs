//! Loading of the annual and monthly case tables.
//!
//! Both CSV files are read with every column as a string and then coerced: numeric columns are
//! cast non-strictly so a malformed cell becomes null instead of failing the load, and text keys
//! are trimmed (ISO3 codes are also uppercased so they line up with the geography ids).

use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use itertools::Itertools;
use log::{debug, info};
use polars::prelude::*;
use tokio::try_join;

use crate::{
    cache::LoadCache,
    config::Config,
    error::{EpidashError, EpidashResult},
    COL,
};

/// Annual case counts, one row per country for the loaded year
#[derive(Debug, Clone, PartialEq)]
pub struct AnnualCases(pub DataFrame);

/// Monthly case counts with a derived `date` column (first day of the month)
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyCases(pub DataFrame);

/// Both tables of a dashboard session. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseData {
    pub annual: AnnualCases,
    pub monthly: MonthlyCases,
}

type CaseKey = (String, String, i32);

fn case_cache() -> &'static LoadCache<CaseKey, CaseData> {
    static CACHE: OnceLock<LoadCache<CaseKey, CaseData>> = OnceLock::new();
    CACHE.get_or_init(|| LoadCache::new("case data"))
}

/// Load both tables for `config.year`, reusing a previous load with the same paths and year.
pub async fn load_cases(config: &Config) -> anyhow::Result<Arc<CaseData>> {
    let key = (
        config.annual_path.clone(),
        config.monthly_path.clone(),
        config.year,
    );
    case_cache().get_or_load(key, read_cases(config)).await
}

async fn read_cases(config: &Config) -> anyhow::Result<CaseData> {
    let (annual_raw, monthly_raw) = try_join!(
        read_csv(config.annual_path.clone()),
        read_csv(config.monthly_path.clone()),
    )?;
    let annual = AnnualCases::from_raw(annual_raw, config.year)
        .with_context(|| format!("Failed to prepare '{}'", config.annual_path))?;
    let monthly = MonthlyCases::from_raw(monthly_raw, config.year, &annual)
        .with_context(|| format!("Failed to prepare '{}'", config.monthly_path))?;
    info!(
        "Loaded {} annual and {} monthly rows for {}",
        annual.0.height(),
        monthly.0.height(),
        config.year
    );
    Ok(CaseData { annual, monthly })
}

async fn read_csv(path: String) -> anyhow::Result<DataFrame> {
    info!("Attempting to load dataframe from {path}");
    tokio::task::spawn_blocking(move || {
        read_csv_as_strings(&path).map_err(|e| anyhow!("Failed to load '{path}': {e}"))
    })
    .await?
}

/// Reads a CSV file without type inference, so every column is a string column.
pub fn read_csv_as_strings(path: &str) -> PolarsResult<DataFrame> {
    LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()?
        .collect()
}

fn require_columns(df: &DataFrame, table: &str, columns: &[&str]) -> EpidashResult<()> {
    for column in columns {
        if df.column(column).is_err() {
            return Err(EpidashError::MissingColumn {
                table: table.into(),
                column: (*column).into(),
            });
        }
    }
    Ok(())
}

/// Trims a string column, optionally uppercasing it. Blank values become null.
fn normalize_text(s: &Series, uppercase: bool) -> PolarsResult<Option<Series>> {
    let ca = s.str()?;
    let normalized: StringChunked = ca
        .into_iter()
        .map(|value| {
            value.map(str::trim).filter(|v| !v.is_empty()).map(|v| {
                if uppercase {
                    v.to_uppercase()
                } else {
                    v.to_string()
                }
            })
        })
        .collect();
    Ok(Some(normalized.with_name(s.name()).into_series()))
}

fn text_column(name: &str, uppercase: bool) -> Expr {
    col(name)
        .cast(DataType::String)
        .map(
            move |s: Series| normalize_text(&s, uppercase),
            GetOutput::from_type(DataType::String),
        )
        .alias(name)
}

/// Casts to float. Unparseable cells and the non-finite spellings ("NaN", "inf") become null.
fn numeric_column(name: &str) -> Expr {
    let value = col(name).cast(DataType::Float64);
    when(value.clone().is_finite())
        .then(value)
        .otherwise(lit(Null {}))
        .alias(name)
}

/// Builds `YYYY-MM-01` strings from a month column. Months outside 1-12 give null.
fn month_start_dates(s: &Series, year: i32) -> PolarsResult<Option<Series>> {
    let ca = s.i32()?;
    let dates: StringChunked = ca
        .into_iter()
        .map(|month| {
            month
                .and_then(|m| u32::try_from(m).ok())
                .and_then(|m| NaiveDate::from_ymd_opt(year, m, 1))
                .map(|date| date.format("%Y-%m-%d").to_string())
        })
        .collect();
    Ok(Some(dates.with_name(COL::DATE).into_series()))
}

impl AnnualCases {
    pub fn from_raw(raw: DataFrame, year: i32) -> EpidashResult<Self> {
        require_columns(&raw, "annual cases", &COL::ANNUAL_REQUIRED)?;
        let df = raw
            .lazy()
            .with_columns([
                col(COL::YEAR).cast(DataType::Int32).alias(COL::YEAR),
                text_column(COL::ISO3, true),
                text_column(COL::COUNTRY, false),
                text_column(COL::REGION, false),
                numeric_column(COL::MEASLES_TOTAL),
                numeric_column(COL::RUBELLA_TOTAL),
                numeric_column(COL::TOTAL_POPULATION),
            ])
            .filter(col(COL::YEAR).eq(lit(year)))
            .collect()?;
        debug!("Annual cases shape after filtering to {year}: {:?}", df.shape());
        Ok(Self(df))
    }

    /// Distinct non-null region codes, sorted
    pub fn regions(&self) -> EpidashResult<Vec<String>> {
        distinct_strings(&self.0, COL::REGION)
    }
}

impl MonthlyCases {
    /// Prepares the monthly table. When it has no `region` column the region is looked up from
    /// `annual` by country name.
    pub fn from_raw(raw: DataFrame, year: i32, annual: &AnnualCases) -> EpidashResult<Self> {
        require_columns(&raw, "monthly cases", &COL::MONTHLY_REQUIRED)?;
        let has_region = raw.column(COL::REGION).is_ok();
        let lf = raw
            .lazy()
            .with_columns([
                col(COL::YEAR).cast(DataType::Int32).alias(COL::YEAR),
                col(COL::MONTH).cast(DataType::Int32).alias(COL::MONTH),
                text_column(COL::COUNTRY, false),
                numeric_column(COL::MEASLES_TOTAL),
                numeric_column(COL::RUBELLA_TOTAL),
            ])
            .filter(col(COL::YEAR).eq(lit(year)))
            .with_column(
                col(COL::MONTH)
                    .map(
                        move |s: Series| month_start_dates(&s, year),
                        GetOutput::from_type(DataType::String),
                    )
                    .alias(COL::DATE),
            );
        let lf = if has_region {
            lf.with_column(text_column(COL::REGION, false))
        } else {
            debug!("Monthly cases have no region column, joining it from annual cases");
            let regions = annual
                .0
                .clone()
                .lazy()
                .group_by_stable([col(COL::COUNTRY)])
                .agg([col(COL::REGION).first()]);
            lf.join(
                regions,
                [col(COL::COUNTRY)],
                [col(COL::COUNTRY)],
                JoinArgs::new(JoinType::Left),
            )
        };
        let df = lf
            .sort(
                [COL::COUNTRY, COL::MONTH],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;
        debug!("Monthly cases shape after filtering to {year}: {:?}", df.shape());
        Ok(Self(df))
    }

    /// Distinct non-null country names, sorted
    pub fn countries(&self) -> EpidashResult<Vec<String>> {
        distinct_strings(&self.0, COL::COUNTRY)
    }
}

fn distinct_strings(df: &DataFrame, column: &str) -> EpidashResult<Vec<String>> {
    Ok(df
        .column(column)?
        .str()?
        .into_iter()
        .flatten()
        .unique()
        .sorted()
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const ANNUAL_CSV: &str = "\
country,iso3,region,year,measles_total,rubella_total,total_population
Kenya, ken ,AFR,2024,120,0,50000000
Uganda,UGA,AFR,2024,0,30,40000000
France,FRA,EUR,2024,n/a,2,68000000
Kenya,KEN,AFR,2023,999,999,49000000
";

    const MONTHLY_CSV: &str = "\
country,year,month,measles_total,rubella_total
Kenya,2024,3,30,0
Kenya,2024,1,10,0
Kenya,2024,2,20,
Kenya,2023,1,5,5
France,2024,13,1,1
";

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn annual() -> AnnualCases {
        let file = csv_file(ANNUAL_CSV);
        let raw = read_csv_as_strings(file.path().to_str().unwrap()).unwrap();
        AnnualCases::from_raw(raw, 2024).unwrap()
    }

    #[test]
    fn annual_should_keep_target_year_and_coerce_values() {
        let annual = annual();
        assert_eq!(annual.0.height(), 3, "Only 2024 rows should be kept");
        let iso3 = annual.0.column(COL::ISO3).unwrap().str().unwrap();
        assert_eq!(iso3.get(0), Some("KEN"), "ISO3 should be trimmed and uppercased");
        let measles = annual.0.column(COL::MEASLES_TOTAL).unwrap().f64().unwrap();
        assert_eq!(measles.get(0), Some(120.0));
        assert_eq!(measles.get(2), None, "Malformed numbers should become null");
        assert_eq!(annual.regions().unwrap(), vec!["AFR", "EUR"]);
    }

    #[test]
    fn missing_required_column_should_fail() {
        let file = csv_file("country,iso3,year\nKenya,KEN,2024\n");
        let raw = read_csv_as_strings(file.path().to_str().unwrap()).unwrap();
        let result = AnnualCases::from_raw(raw, 2024);
        assert!(matches!(
            result,
            Err(EpidashError::MissingColumn { ref column, .. }) if column == COL::REGION
        ));
    }

    #[test]
    fn missing_file_should_fail() {
        assert!(read_csv_as_strings("/definitely/not/here.csv").is_err());
    }

    #[test]
    fn monthly_should_derive_ordered_dates_and_join_regions() {
        let file = csv_file(MONTHLY_CSV);
        let raw = read_csv_as_strings(file.path().to_str().unwrap()).unwrap();
        let monthly = MonthlyCases::from_raw(raw, 2024, &annual()).unwrap();
        let df = &monthly.0;
        assert_eq!(df.height(), 4);

        let kenya = df
            .clone()
            .lazy()
            .filter(col(COL::COUNTRY).eq(lit("Kenya")))
            .collect()
            .unwrap();
        let dates: Vec<Option<&str>> = kenya
            .column(COL::DATE)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            dates,
            vec![Some("2024-01-01"), Some("2024-02-01"), Some("2024-03-01")]
        );
        let regions = kenya.column(COL::REGION).unwrap().str().unwrap();
        assert_eq!(regions.get(0), Some("AFR"), "Region should come from annual cases");
        let rubella = kenya.column(COL::RUBELLA_TOTAL).unwrap().f64().unwrap();
        assert_eq!(rubella.get(1), None, "Empty cells should become null");

        let france = df
            .clone()
            .lazy()
            .filter(col(COL::COUNTRY).eq(lit("France")))
            .collect()
            .unwrap();
        assert_eq!(
            france.column(COL::DATE).unwrap().str().unwrap().get(0),
            None,
            "An invalid month should give a null date"
        );
        assert_eq!(monthly.countries().unwrap(), vec!["France", "Kenya"]);
    }

    #[test]
    fn non_finite_numbers_should_become_null() {
        let file = csv_file(
            "country,iso3,region,year,measles_total,rubella_total,total_population\n\
             Kenya,KEN,AFR,2024,NaN,inf,NaN\n\
             Uganda,UGA,AFR,2024,4,-infinity,40000000\n",
        );
        let raw = read_csv_as_strings(file.path().to_str().unwrap()).unwrap();
        let annual = AnnualCases::from_raw(raw, 2024).unwrap();
        for column in [COL::MEASLES_TOTAL, COL::RUBELLA_TOTAL, COL::TOTAL_POPULATION] {
            let values = annual.0.column(column).unwrap().f64().unwrap();
            assert_eq!(values.get(0), None, "{column} should be null for Kenya");
        }
        let rubella = annual.0.column(COL::RUBELLA_TOTAL).unwrap().f64().unwrap();
        assert_eq!(rubella.get(1), None);
        let measles = annual.0.column(COL::MEASLES_TOTAL).unwrap().f64().unwrap();
        assert_eq!(measles.sum(), Some(4.0));
    }

    #[tokio::test]
    async fn load_cases_should_memoize_on_parameters() {
        let annual_file = csv_file(ANNUAL_CSV);
        let monthly_file = csv_file(MONTHLY_CSV);
        let config = Config {
            annual_path: annual_file.path().to_string_lossy().to_string(),
            monthly_path: monthly_file.path().to_string_lossy().to_string(),
            ..Config::default()
        };
        let first = load_cases(&config).await.unwrap();
        let second = load_cases(&config).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second), "Second load should hit the cache");
        assert_eq!(first.annual.0.height(), 3);
    }
}
