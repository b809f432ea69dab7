//! Reshaping and aggregation of the case tables ahead of charting.
//!
//! Missing counts are always excluded, never read as zero: filters compare against zero and
//! polars drops rows whose predicate evaluates to null.

use std::collections::BTreeSet;

use log::debug;
use polars::prelude::*;
use serde::Serialize;

use crate::{
    data::{AnnualCases, MonthlyCases},
    error::EpidashResult,
    selection::{Disease, RegionFilter},
    COL,
};

/// Variables of the correlation matrix, in display order
pub const CORRELATION_VARIABLES: [&str; 3] =
    [COL::MEASLES_TOTAL, COL::RUBELLA_TOTAL, COL::TOTAL_POPULATION];

pub fn variable_label(column: &str) -> &str {
    match column {
        COL::MEASLES_TOTAL => "Measles",
        COL::RUBELLA_TOTAL => "Rubella",
        COL::TOTAL_POPULATION => "Population",
        other => other,
    }
}

/// Rows of `df` in `region`, or all rows for `RegionFilter::All`
pub fn filter_region(df: &DataFrame, region: &RegionFilter) -> PolarsResult<DataFrame> {
    match region {
        RegionFilter::All => Ok(df.clone()),
        RegionFilter::Region(code) => df
            .clone()
            .lazy()
            .filter(col(COL::REGION).eq(lit(code.as_str())))
            .collect(),
    }
}

/// Drops rows in which neither disease has a positive count
pub fn exclude_zero_cases(df: &DataFrame) -> PolarsResult<DataFrame> {
    let reported = |name: &str| col(name).fill_null(lit(0.0)).gt(lit(0.0));
    df.clone()
        .lazy()
        .filter(reported(COL::MEASLES_TOTAL).or(reported(COL::RUBELLA_TOTAL)))
        .collect()
}

/// Keeps rows with strictly positive counts for both diseases
pub fn positive_cases(df: &DataFrame) -> PolarsResult<DataFrame> {
    df.clone()
        .lazy()
        .filter(
            col(COL::MEASLES_TOTAL)
                .gt(lit(0.0))
                .and(col(COL::RUBELLA_TOTAL).gt(lit(0.0))),
        )
        .collect()
}

/// Wide to long: one row per (country, disease) with the disease column name in `variable` and
/// its count in `cases`. All measles rows come first, then all rubella rows.
pub fn melt_diseases(df: &DataFrame) -> PolarsResult<DataFrame> {
    let frames: Vec<LazyFrame> = Disease::ALL
        .iter()
        .map(|disease| {
            df.clone().lazy().select([
                col(COL::ISO3),
                col(COL::COUNTRY),
                lit(disease.column()).alias(COL::VARIABLE),
                col(disease.column()).alias(COL::CASES),
            ])
        })
        .collect();
    polars::prelude::concat(frames, UnionArgs::default())?.collect()
}

/// Sums `cases` per (country, variable) and keeps the `n` largest per variable. Equal counts keep
/// their input order. Rows without a positive count are left out of the ranking.
pub fn top_n(long: &DataFrame, n: u32) -> PolarsResult<DataFrame> {
    let ranked: Vec<LazyFrame> = Disease::ALL
        .iter()
        .map(|disease| {
            long.clone()
                .lazy()
                .filter(col(COL::VARIABLE).eq(lit(disease.column())))
                .filter(col(COL::CASES).gt(lit(0.0)))
                .group_by_stable([col(COL::COUNTRY), col(COL::VARIABLE)])
                .agg([col(COL::ISO3).first(), col(COL::CASES).sum()])
                .sort(
                    [COL::CASES],
                    SortMultipleOptions::default()
                        .with_order_descending(true)
                        .with_maintain_order(true),
                )
                .limit(n as IdxSize)
        })
        .collect();
    polars::prelude::concat(ranked, UnionArgs::default())?.collect()
}

/// Region filter, zero-case exclusion, melt and ranking in one go
pub fn top_countries(
    annual: &AnnualCases,
    region: &RegionFilter,
    n: u32,
) -> PolarsResult<DataFrame> {
    let regional = exclude_zero_cases(&filter_region(&annual.0, region)?)?;
    let ranked = top_n(&melt_diseases(&regional)?, n)?;
    debug!("Top {n} for region {region}: {} rows", ranked.height());
    Ok(ranked)
}

/// One cell of the correlation matrix in long form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationCell {
    pub variable_a: &'static str,
    pub variable_b: &'static str,
    /// `None` when either variable has no variance
    pub coefficient: Option<f64>,
}

impl CorrelationCell {
    /// Text colour for the cell label, white on the strongly coloured cells
    pub fn label_color(&self) -> &'static str {
        match self.coefficient {
            Some(r) if r.abs() > 0.5 => "white",
            _ => "black",
        }
    }
}

/// Pearson correlation between measles, rubella and population over the rows with positive
/// counts for both diseases and a known population. Returns the 3x3 matrix in row-major long
/// form, or nothing when fewer than two rows qualify.
pub fn correlation_cells(df: &DataFrame) -> EpidashResult<Vec<CorrelationCell>> {
    let valid = positive_cases(df)?
        .lazy()
        .filter(col(COL::TOTAL_POPULATION).is_not_null())
        .collect()?;
    if valid.height() < 2 {
        debug!("Only {} rows valid for correlation", valid.height());
        return Ok(vec![]);
    }

    let k = CORRELATION_VARIABLES.len();
    let pairs: Vec<(usize, usize)> = (0..k)
        .flat_map(|i| ((i + 1)..k).map(move |j| (i, j)))
        .collect();
    let coefficients = valid
        .lazy()
        .select(
            pairs
                .iter()
                .map(|&(i, j)| {
                    pearson_corr(
                        col(CORRELATION_VARIABLES[i]),
                        col(CORRELATION_VARIABLES[j]),
                        1,
                    )
                    .alias(&format!("{i}_{j}"))
                })
                .collect::<Vec<_>>(),
        )
        .collect()?;

    // Zero variance comes back as NaN
    let mut matrix = vec![vec![None; k]; k];
    for (i, row) in matrix.iter_mut().enumerate() {
        row[i] = Some(1.0);
    }
    for &(i, j) in &pairs {
        let r = coefficients
            .column(&format!("{i}_{j}"))?
            .f64()?
            .get(0)
            .filter(|r| r.is_finite())
            .map(|r| r.clamp(-1.0, 1.0));
        matrix[i][j] = r;
        matrix[j][i] = r;
    }

    Ok(CORRELATION_VARIABLES
        .iter()
        .enumerate()
        .flat_map(|(i, &a)| {
            let row = matrix[i].clone();
            CORRELATION_VARIABLES
                .iter()
                .zip(row)
                .map(move |(&b, coefficient)| CorrelationCell {
                    variable_a: a,
                    variable_b: b,
                    coefficient,
                })
        })
        .collect())
}

/// Monthly totals of `disease` per region, ordered by date then region. Rows without a region or
/// date are dropped.
pub fn regional_monthly(monthly: &MonthlyCases, disease: Disease) -> PolarsResult<DataFrame> {
    monthly
        .0
        .clone()
        .lazy()
        .filter(
            col(COL::REGION)
                .is_not_null()
                .and(col(COL::DATE).is_not_null()),
        )
        .group_by_stable([col(COL::REGION), col(COL::DATE)])
        .agg([col(disease.column()).sum().alias(COL::CASES)])
        .sort(
            [COL::DATE, COL::REGION],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()
}

/// Per-country monthly series of `disease`, with the count renamed to `cases`
pub fn country_monthly(monthly: &MonthlyCases, disease: Disease) -> PolarsResult<DataFrame> {
    monthly
        .0
        .clone()
        .lazy()
        .filter(
            col(COL::COUNTRY)
                .is_not_null()
                .and(col(COL::DATE).is_not_null()),
        )
        .select([
            col(COL::COUNTRY),
            col(COL::MONTH),
            col(COL::DATE),
            col(disease.column()).alias(COL::CASES),
        ])
        .collect()
}

/// Headline figures shown next to the controls
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub disease: Disease,
    pub countries: usize,
    pub total_cases: f64,
}

pub fn summary(annual: &AnnualCases, disease: Disease) -> EpidashResult<Summary> {
    let countries: BTreeSet<&str> = annual
        .0
        .column(COL::COUNTRY)?
        .str()?
        .into_iter()
        .flatten()
        .collect();
    let total_cases = annual.0.column(disease.column())?.f64()?.sum().unwrap_or(0.0);
    Ok(Summary {
        disease,
        countries: countries.len(),
        total_cases,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn annual_fixture() -> AnnualCases {
        AnnualCases(
            df!(
                COL::COUNTRY => &["Kenya", "Uganda", "France", "Spain", "Italy", "Chad"],
                COL::ISO3 => &["KEN", "UGA", "FRA", "ESP", "ITA", "TCD"],
                COL::REGION => &["AFR", "AFR", "EUR", "EUR", "EUR", "AFR"],
                COL::YEAR => &[2024, 2024, 2024, 2024, 2024, 2024],
                COL::MEASLES_TOTAL => &[Some(120.0), Some(0.0), Some(10.0), Some(40.0), Some(3.0), None],
                COL::RUBELLA_TOTAL => &[Some(0.0), Some(30.0), Some(1.0), Some(5.0), Some(7.0), None],
                COL::TOTAL_POPULATION => &[
                    Some(50_000_000.0),
                    Some(40_000_000.0),
                    Some(68_000_000.0),
                    Some(48_000_000.0),
                    Some(59_000_000.0),
                    Some(18_000_000.0)
                ]
            )
            .unwrap(),
        )
    }

    fn ranking(df: &DataFrame, disease: Disease) -> Vec<(String, f64)> {
        let rows = df
            .clone()
            .lazy()
            .filter(col(COL::VARIABLE).eq(lit(disease.column())))
            .collect()
            .unwrap();
        rows.column(COL::COUNTRY)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .zip(rows.column(COL::CASES).unwrap().f64().unwrap().into_iter())
            .map(|(c, v)| (c.unwrap().to_string(), v.unwrap()))
            .collect()
    }

    #[test]
    fn top_countries_should_match_kenya_uganda_example() {
        let annual = AnnualCases(
            df!(
                COL::COUNTRY => &["Kenya", "Uganda"],
                COL::ISO3 => &["KEN", "UGA"],
                COL::REGION => &["AFR", "AFR"],
                COL::YEAR => &[2024, 2024],
                COL::MEASLES_TOTAL => &[120.0, 0.0],
                COL::RUBELLA_TOTAL => &[0.0, 30.0],
                COL::TOTAL_POPULATION => &[50_000_000.0, 40_000_000.0]
            )
            .unwrap(),
        );
        let top = top_countries(&annual, &RegionFilter::Region("AFR".into()), 10).unwrap();
        assert_eq!(
            ranking(&top, Disease::Measles),
            vec![("Kenya".to_string(), 120.0)]
        );
        assert_eq!(
            ranking(&top, Disease::Rubella),
            vec![("Uganda".to_string(), 30.0)]
        );
    }

    #[test]
    fn top_n_should_cap_and_sort_each_disease() {
        let countries: Vec<String> = (0..12).map(|i| format!("C{i:02}")).collect();
        let codes: Vec<String> = (0..12).map(|i| format!("X{i:02}")).collect();
        let measles: Vec<f64> = (0..12).map(|i| ((i * 7) % 12 + 1) as f64).collect();
        let rubella: Vec<f64> = vec![5.0; 12];
        let wide = df!(
            COL::ISO3 => &codes,
            COL::COUNTRY => &countries,
            COL::MEASLES_TOTAL => &measles,
            COL::RUBELLA_TOTAL => &rubella
        )
        .unwrap();
        let top = top_n(&melt_diseases(&wide).unwrap(), 10).unwrap();
        for disease in Disease::ALL {
            let ranked = ranking(&top, disease);
            assert_eq!(ranked.len(), 10, "Each disease should be capped at 10");
            assert!(
                ranked.windows(2).all(|w| w[0].1 >= w[1].1),
                "Ranking should be non-increasing"
            );
        }
        // All rubella counts tie, so input order decides
        let rubella_top: Vec<String> = ranking(&top, Disease::Rubella)
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        assert_eq!(rubella_top, countries[..10].to_vec());
    }

    #[test]
    fn melt_then_group_should_preserve_wide_values() {
        let annual = annual_fixture();
        let long = melt_diseases(&annual.0).unwrap();
        assert_eq!(long.height(), 2 * annual.0.height());
        let grouped = long
            .lazy()
            .group_by_stable([col(COL::COUNTRY), col(COL::VARIABLE)])
            .agg([col(COL::CASES).sum()])
            .collect()
            .unwrap();
        for disease in Disease::ALL {
            let wide: Vec<Option<f64>> = annual
                .0
                .column(disease.column())
                .unwrap()
                .f64()
                .unwrap()
                .into_iter()
                .collect();
            let summed = grouped
                .clone()
                .lazy()
                .filter(col(COL::VARIABLE).eq(lit(disease.column())))
                .collect()
                .unwrap();
            let summed: Vec<f64> = summed
                .column(COL::CASES)
                .unwrap()
                .f64()
                .unwrap()
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect();
            let expected: Vec<f64> = wide.into_iter().map(|v| v.unwrap_or(0.0)).collect();
            assert_eq!(summed, expected);
        }
    }

    #[test]
    fn zero_case_exclusion_should_drop_silent_countries() {
        let annual = annual_fixture();
        let kept = exclude_zero_cases(&annual.0).unwrap();
        let countries: Vec<&str> = kept
            .column(COL::COUNTRY)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(countries, vec!["Kenya", "Uganda", "France", "Spain", "Italy"]);
    }

    #[test]
    fn region_without_reports_should_rank_nothing() {
        let annual = AnnualCases(
            df!(
                COL::COUNTRY => &["Chad"],
                COL::ISO3 => &["TCD"],
                COL::REGION => &["AFR"],
                COL::MEASLES_TOTAL => &[0.0],
                COL::RUBELLA_TOTAL => &[None::<f64>],
                COL::TOTAL_POPULATION => &[18_000_000.0]
            )
            .unwrap(),
        );
        let top = top_countries(&annual, &RegionFilter::Region("AFR".into()), 10).unwrap();
        assert_eq!(top.height(), 0);
        assert!(correlation_cells(&annual.0).unwrap().is_empty());
    }

    fn coefficient(cells: &[CorrelationCell], a: &str, b: &str) -> Option<f64> {
        cells
            .iter()
            .find(|c| c.variable_a == a && c.variable_b == b)
            .unwrap()
            .coefficient
    }

    #[test]
    fn correlation_should_detect_linear_relations() {
        let wide = df!(
            COL::MEASLES_TOTAL => &[1.0, 2.0, 3.0, 4.0],
            COL::RUBELLA_TOTAL => &[8.0, 6.0, 4.0, 2.0],
            COL::TOTAL_POPULATION => &[2.0, 4.0, 6.0, 8.0]
        )
        .unwrap();
        let cells = correlation_cells(&wide).unwrap();
        let r = |a, b| coefficient(&cells, a, b).unwrap();
        assert!((r(COL::MEASLES_TOTAL, COL::TOTAL_POPULATION) - 1.0).abs() < 1e-12);
        assert!((r(COL::MEASLES_TOTAL, COL::RUBELLA_TOTAL) + 1.0).abs() < 1e-12);
        assert!((r(COL::TOTAL_POPULATION, COL::RUBELLA_TOTAL) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_variable_should_have_no_coefficient() {
        let wide = df!(
            COL::MEASLES_TOTAL => &[1.0, 2.0, 3.0, 4.0],
            COL::RUBELLA_TOTAL => &[3.0, 3.0, 3.0, 3.0],
            COL::TOTAL_POPULATION => &[Some(5.0), Some(1.0), None, Some(9.0)]
        )
        .unwrap();
        let cells = correlation_cells(&wide).unwrap();
        assert_eq!(coefficient(&cells, COL::MEASLES_TOTAL, COL::RUBELLA_TOTAL), None);
        assert_eq!(coefficient(&cells, COL::RUBELLA_TOTAL, COL::TOTAL_POPULATION), None);
        assert_eq!(coefficient(&cells, COL::RUBELLA_TOTAL, COL::RUBELLA_TOTAL), Some(1.0));
        assert!(coefficient(&cells, COL::MEASLES_TOTAL, COL::TOTAL_POPULATION).is_some());
    }

    #[test]
    fn correlation_matrix_should_be_symmetric_with_unit_diagonal() {
        let cells = correlation_cells(&annual_fixture().0).unwrap();
        assert_eq!(cells.len(), 9);
        for cell in &cells {
            let mirror = cells
                .iter()
                .find(|c| c.variable_a == cell.variable_b && c.variable_b == cell.variable_a)
                .unwrap();
            assert_eq!(cell.coefficient, mirror.coefficient);
            if cell.variable_a == cell.variable_b {
                assert_eq!(cell.coefficient, Some(1.0));
            }
            if let Some(r) = cell.coefficient {
                assert!((-1.0..=1.0).contains(&r));
            }
        }
    }

    #[test]
    fn label_color_should_contrast_strong_cells() {
        let cell = |coefficient| CorrelationCell {
            variable_a: COL::MEASLES_TOTAL,
            variable_b: COL::RUBELLA_TOTAL,
            coefficient,
        };
        assert_eq!(cell(Some(0.8)).label_color(), "white");
        assert_eq!(cell(Some(-0.6)).label_color(), "white");
        assert_eq!(cell(Some(0.5)).label_color(), "black");
        assert_eq!(cell(None).label_color(), "black");
    }

    #[test]
    fn regional_monthly_should_sum_by_region_and_date() {
        let monthly = MonthlyCases(
            df!(
                COL::COUNTRY => &["Kenya", "Uganda", "France", "Kenya"],
                COL::REGION => &[Some("AFR"), Some("AFR"), Some("EUR"), None],
                COL::MONTH => &[1, 1, 1, 2],
                COL::DATE => &["2024-01-01", "2024-01-01", "2024-01-01", "2024-02-01"],
                COL::MEASLES_TOTAL => &[Some(10.0), None, Some(4.0), Some(8.0)],
                COL::RUBELLA_TOTAL => &[1.0, 2.0, 3.0, 4.0]
            )
            .unwrap(),
        );
        let sums = regional_monthly(&monthly, Disease::Measles).unwrap();
        assert_eq!(sums.height(), 2, "Rows without a region should be dropped");
        let regions: Vec<&str> = sums
            .column(COL::REGION)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(regions, vec!["AFR", "EUR"]);
        let cases: Vec<Option<f64>> = sums
            .column(COL::CASES)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(cases, vec![Some(10.0), Some(4.0)]);
    }

    #[test]
    fn summary_should_skip_missing_counts() {
        let summary = summary(&annual_fixture(), Disease::Measles).unwrap();
        assert_eq!(summary.countries, 6);
        assert_eq!(summary.total_cases, 173.0);
    }
}
