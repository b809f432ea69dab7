//! Vega-Lite v5 specifications for the six dashboard views.
//!
//! Every builder is a pure function of the loaded tables and the current selection. When the
//! selection leaves nothing to plot the builder returns [`Chart::NoData`] instead of an empty
//! plot, so the caller always has something to display.

use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
    aggregate::{
        correlation_cells, country_monthly, filter_region, positive_cases, regional_monthly,
        top_countries, variable_label, CORRELATION_VARIABLES,
    },
    data::{AnnualCases, MonthlyCases},
    error::EpidashResult,
    formatters::to_records,
    geo::Geography,
    selection::SelectionState,
    COL,
};

pub const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";
/// Name of the dataset holding the boundary features inside the choropleth spec
pub const GEOGRAPHY_DATASET: &str = "countries";
pub const NO_DATA_MESSAGE: &str = "No data for the current selection";

/// The six views of the dashboard
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ChartKind {
    Choropleth,
    TopCountries,
    DiseaseScatter,
    Heatmap,
    RegionalTrend,
    CountryTrend,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Chart {
    Plot(Value),
    NoData { title: String, message: String },
}

impl Chart {
    pub fn no_data(title: impl Into<String>, message: impl Into<String>) -> Self {
        Chart::NoData {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Chart::NoData { .. })
    }

    /// The spec to hand to vega-embed. A placeholder renders as a single text mark.
    pub fn to_vega_lite(&self) -> Value {
        match self {
            Chart::Plot(spec) => spec.clone(),
            Chart::NoData { title, message } => json!({
                "$schema": VEGA_LITE_SCHEMA,
                "title": title,
                "width": 400,
                "height": 100,
                "data": {"values": [{}]},
                "mark": {"type": "text", "fontSize": 16, "color": "gray"},
                "encoding": {"text": {"value": message}}
            }),
        }
    }
}

/// Countries colored by the selected disease count, restricted to the selected region
pub fn choropleth(
    geography: &Geography,
    annual: &AnnualCases,
    state: &SelectionState,
) -> EpidashResult<Chart> {
    let title = format!(
        "{} cases by country ({})",
        state.disease.label(),
        state.region
    );
    let regional = filter_region(&annual.0, &state.region)?;
    let joined: Vec<_> = geography
        .join_cases(&regional, state.disease)?
        .into_iter()
        .filter(|feature| feature.cases.is_some())
        .collect();
    if !joined
        .iter()
        .any(|feature| feature.cases.is_some_and(|cases| cases > 0.0))
    {
        return Ok(Chart::no_data(title, NO_DATA_MESSAGE));
    }

    let mut datasets = Map::new();
    datasets.insert(
        GEOGRAPHY_DATASET.to_string(),
        Value::Array(geography.features_json()?),
    );
    Ok(Chart::Plot(json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": title,
        "width": 800,
        "height": 400,
        "projection": {"type": "equalEarth"},
        "datasets": datasets,
        "layer": [
            {
                "data": {"name": GEOGRAPHY_DATASET},
                "mark": {"type": "geoshape", "fill": "lightblue", "stroke": "white"}
            },
            {
                "data": {"name": GEOGRAPHY_DATASET},
                "transform": [
                    {
                        "lookup": "id",
                        "from": {"data": {"values": joined}, "key": "id", "fields": ["cases"]}
                    },
                    {"filter": "isValid(datum.cases)"}
                ],
                "params": [
                    {"name": "map_country", "select": {"type": "point", "fields": ["id"]}}
                ],
                "mark": {"type": "geoshape"},
                "encoding": {
                    "color": {
                        "field": "cases",
                        "type": "quantitative",
                        "scale": {"scheme": "orangered"},
                        "title": "Cases"
                    },
                    "stroke": {
                        "condition": {"param": "map_country", "empty": false, "value": "black"},
                        "value": "white"
                    },
                    "strokeWidth": {
                        "condition": {"param": "map_country", "empty": false, "value": 2},
                        "value": 0.5
                    },
                    "tooltip": [
                        {"field": "properties.name", "type": "nominal", "title": "Country"},
                        {"field": "cases", "type": "quantitative", "title": "Cases"}
                    ]
                }
            }
        ]
    })))
}

/// Horizontal bars of the `n` countries with most cases, per disease
pub fn top_countries_bar(
    annual: &AnnualCases,
    state: &SelectionState,
    n: u32,
) -> EpidashResult<Chart> {
    let title = format!("Top {n} countries by cases ({})", state.region);
    let ranked = top_countries(annual, &state.region, n)?;
    if ranked.height() == 0 {
        return Ok(Chart::no_data(title, NO_DATA_MESSAGE));
    }
    let ranked = ranked
        .lazy()
        .with_column(
            col(COL::VARIABLE)
                .map(
                    |s: Series| {
                        Ok(Some(
                            s.str()?
                                .apply_values(|v| variable_label(v).to_string().into())
                                .into_series(),
                        ))
                    },
                    GetOutput::from_type(DataType::String),
                )
                .alias(COL::VARIABLE),
        )
        .collect()?;

    Ok(Chart::Plot(json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": title,
        "width": 400,
        "height": 450,
        "data": {"values": to_records(&ranked)?},
        "mark": "bar",
        "encoding": {
            "y": {"field": COL::COUNTRY, "type": "nominal", "sort": "-x", "title": "Country"},
            "x": {"field": COL::CASES, "type": "quantitative", "title": "Cases"},
            "color": {"field": COL::VARIABLE, "type": "nominal", "title": "Disease"},
            "yOffset": {"field": COL::VARIABLE},
            "tooltip": [
                {"field": COL::COUNTRY, "type": "nominal"},
                {"field": COL::VARIABLE, "type": "nominal", "title": "Disease"},
                {"field": COL::CASES, "type": "quantitative"}
            ]
        }
    })))
}

/// Log-log measles against rubella with a y = x reference line
pub fn disease_scatter(annual: &AnnualCases, state: &SelectionState) -> EpidashResult<Chart> {
    let title = format!("Measles vs rubella cases ({})", state.region);
    let points = positive_cases(&filter_region(&annual.0, &state.region)?)?.select([
        COL::COUNTRY,
        COL::REGION,
        COL::MEASLES_TOTAL,
        COL::RUBELLA_TOTAL,
    ])?;
    let Some(max_measles) = points.column(COL::MEASLES_TOTAL)?.f64()?.max() else {
        return Ok(Chart::no_data(title, NO_DATA_MESSAGE));
    };

    Ok(Chart::Plot(json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": title,
        "width": 450,
        "height": 450,
        "layer": [
            {
                "data": {"values": to_records(&points)?},
                "params": [{
                    "name": "scatter_region",
                    "select": {"type": "point", "fields": [COL::REGION]},
                    "bind": "legend"
                }],
                "mark": {"type": "circle", "size": 80},
                "encoding": {
                    "x": {
                        "field": COL::MEASLES_TOTAL,
                        "type": "quantitative",
                        "scale": {"type": "log"},
                        "title": "Measles cases"
                    },
                    "y": {
                        "field": COL::RUBELLA_TOTAL,
                        "type": "quantitative",
                        "scale": {"type": "log"},
                        "title": "Rubella cases"
                    },
                    "color": {"field": COL::REGION, "type": "nominal", "title": "Region"},
                    "opacity": {
                        "condition": {"param": "scatter_region", "value": 1},
                        "value": 0.1
                    },
                    "tooltip": [
                        {"field": COL::COUNTRY, "type": "nominal"},
                        {"field": COL::MEASLES_TOTAL, "type": "quantitative", "title": "Measles"},
                        {"field": COL::RUBELLA_TOTAL, "type": "quantitative", "title": "Rubella"}
                    ]
                }
            },
            {
                "data": {"values": [{"x": 1.0, "y": 1.0}, {"x": max_measles, "y": max_measles}]},
                "mark": {"type": "line", "strokeDash": [4, 4], "color": "gray"},
                "encoding": {
                    "x": {"field": "x", "type": "quantitative"},
                    "y": {"field": "y", "type": "quantitative"}
                }
            }
        ]
    })))
}

/// Pearson correlation between measles, rubella and population as a labelled grid
pub fn correlation_heatmap(annual: &AnnualCases, state: &SelectionState) -> EpidashResult<Chart> {
    let title = format!("Correlation ({})", state.region);
    let cells = correlation_cells(&filter_region(&annual.0, &state.region)?)?;
    if cells.is_empty() {
        return Ok(Chart::no_data(title, NO_DATA_MESSAGE));
    }
    let values: Vec<Value> = cells
        .iter()
        .map(|cell| {
            json!({
                "variable_a": variable_label(cell.variable_a),
                "variable_b": variable_label(cell.variable_b),
                "coefficient": cell.coefficient,
                "label_color": cell.label_color(),
            })
        })
        .collect();
    let order: Vec<&str> = CORRELATION_VARIABLES.iter().map(|v| variable_label(v)).collect();

    Ok(Chart::Plot(json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": title,
        "width": 300,
        "height": 300,
        "data": {"values": values},
        "encoding": {
            "x": {"field": "variable_a", "type": "nominal", "sort": order, "title": null},
            "y": {"field": "variable_b", "type": "nominal", "sort": order, "title": null}
        },
        "layer": [
            {
                "mark": "rect",
                "encoding": {
                    "color": {
                        "field": "coefficient",
                        "type": "quantitative",
                        "scale": {"scheme": "redblue", "domain": [-1, 1], "domainMid": 0},
                        "title": "Pearson r"
                    }
                }
            },
            {
                "mark": "text",
                "encoding": {
                    "text": {"field": "coefficient", "type": "quantitative", "format": ".2f"},
                    "color": {"field": "label_color", "type": "nominal", "scale": null}
                }
            }
        ]
    })))
}

/// Stacked monthly totals per region
pub fn regional_trend(monthly: &MonthlyCases, state: &SelectionState) -> EpidashResult<Chart> {
    let title = format!("Monthly {} cases by region", state.disease.label());
    let sums = regional_monthly(monthly, state.disease)?;
    if sums.height() == 0 {
        return Ok(Chart::no_data(title, NO_DATA_MESSAGE));
    }

    Ok(Chart::Plot(json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": title,
        "width": 700,
        "height": 300,
        "data": {"values": to_records(&sums)?},
        "params": [{
            "name": "trend_region",
            "select": {"type": "point", "fields": [COL::REGION]},
            "bind": "legend"
        }],
        "mark": "area",
        "encoding": {
            "x": {"field": COL::DATE, "type": "temporal", "timeUnit": "yearmonth", "title": "Month"},
            "y": {"field": COL::CASES, "type": "quantitative", "stack": "zero", "title": "Cases"},
            "color": {"field": COL::REGION, "type": "nominal", "title": "Region"},
            "opacity": {
                "condition": {"param": "trend_region", "value": 1},
                "value": 0.2
            }
        }
    })))
}

/// One faint line per country with the chosen country drawn on top. With no country chosen the
/// first one alphabetically is highlighted.
pub fn country_trend(monthly: &MonthlyCases, state: &SelectionState) -> EpidashResult<Chart> {
    let title = format!("Monthly {} cases by country", state.disease.label());
    let series = country_monthly(monthly, state.disease)?;
    let countries = monthly.countries()?;
    let Some(selected) = state.country.as_ref().or(countries.first()) else {
        return Ok(Chart::no_data(title, NO_DATA_MESSAGE));
    };
    if series.height() == 0 {
        return Ok(Chart::no_data(title, NO_DATA_MESSAGE));
    }
    debug!("Country trend highlighting {selected}");
    let mut initial = Map::new();
    initial.insert(COL::COUNTRY.to_string(), Value::String(selected.clone()));

    let x = json!({"field": COL::DATE, "type": "temporal", "timeUnit": "yearmonth", "title": "Month"});
    let y = json!({"field": COL::CASES, "type": "quantitative", "title": "Cases"});
    Ok(Chart::Plot(json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": title,
        "width": 750,
        "height": 350,
        "data": {"values": to_records(&series)?},
        "layer": [
            {
                "params": [
                    {
                        "name": "country_zoom",
                        "select": {"type": "interval", "encodings": ["x", "y"]},
                        "bind": "scales"
                    },
                    {
                        "name": "country_select",
                        "select": {"type": "point", "fields": [COL::COUNTRY]},
                        "bind": {"input": "select", "options": countries, "name": "Country "},
                        "value": [initial]
                    }
                ],
                "mark": {"type": "line", "color": "lightgray", "opacity": 0.1},
                "encoding": {
                    "x": x,
                    "y": y,
                    "detail": {"field": COL::COUNTRY, "type": "nominal"}
                }
            },
            {
                "transform": [{"filter": {"param": "country_select", "empty": false}}],
                "mark": {"type": "line", "point": true, "color": "steelblue"},
                "encoding": {
                    "x": x,
                    "y": y,
                    "tooltip": [
                        {"field": COL::COUNTRY, "type": "nominal"},
                        {"field": COL::MONTH, "type": "ordinal", "title": "Month"},
                        {"field": COL::CASES, "type": "quantitative"}
                    ]
                }
            }
        ]
    })))
}
