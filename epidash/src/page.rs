//! Self-contained HTML dashboard.
//!
//! The page carries a spec for every chart under every reachable (disease, region) selection, so
//! the sidebar dropdowns swap charts without a server. Specs are collected by replaying the
//! selection events through the controller and keeping only the charts each event re-renders.
//! The boundary features are embedded once and attached to the map spec in the browser.

use std::collections::BTreeMap;

use log::{debug, info};
use serde_json::{json, Value};
use strum::IntoEnumIterator;

use crate::{
    charts::{Chart, ChartKind, GEOGRAPHY_DATASET},
    controller::{Dashboard, UiEvent},
    error::{EpidashError, EpidashResult},
    formatters::{escape_html, script_json, vega_script_tags},
    selection::{Disease, RegionFilter, SelectionState},
};

fn depends_on_disease(kind: ChartKind) -> bool {
    UiEvent::DiseaseChanged(Disease::default())
        .affected()
        .contains(&kind)
}

fn depends_on_region(kind: ChartKind) -> bool {
    UiEvent::RegionChanged(RegionFilter::All)
        .affected()
        .contains(&kind)
}

/// Lookup key of a chart spec: the chart name plus the selection values it depends on.
/// The page script builds the same key from the dropdowns.
fn spec_key(kind: ChartKind, state: &SelectionState) -> String {
    let mut parts = vec![kind.to_string()];
    if depends_on_disease(kind) {
        parts.push(state.disease.column().to_string());
    }
    if depends_on_region(kind) {
        parts.push(state.region.to_string());
    }
    parts.join("|")
}

fn page_spec(kind: ChartKind, chart: EpidashResult<Chart>) -> EpidashResult<Value> {
    let mut spec = match chart {
        Ok(chart) => chart.to_vega_lite(),
        Err(EpidashError::GeographyUnavailable(msg)) => {
            Chart::no_data("Map", format!("Geography unavailable: {msg}")).to_vega_lite()
        }
        Err(err) => return Err(err),
    };
    if kind == ChartKind::Choropleth {
        if let Some(obj) = spec.as_object_mut() {
            obj.remove("datasets");
        }
    }
    Ok(spec)
}

fn collect_specs(dashboard: &mut Dashboard) -> EpidashResult<BTreeMap<String, Value>> {
    let mut specs = BTreeMap::new();
    let mut record = |dashboard: &Dashboard, kinds: Vec<ChartKind>| -> EpidashResult<()> {
        for kind in kinds {
            let key = spec_key(kind, dashboard.state());
            if !specs.contains_key(&key) {
                let spec = page_spec(kind, dashboard.render(kind))?;
                specs.insert(key, spec);
            }
        }
        Ok(())
    };

    let regions: Vec<RegionFilter> = std::iter::once(RegionFilter::All)
        .chain(dashboard.regions().iter().cloned().map(RegionFilter::Region))
        .collect();
    for disease in Disease::ALL {
        let kinds = dashboard.handle(UiEvent::DiseaseChanged(disease))?;
        record(dashboard, kinds)?;
        for region in &regions {
            let kinds = dashboard.handle(UiEvent::RegionChanged(region.clone()))?;
            record(dashboard, kinds)?;
        }
    }
    debug!("Collected {} chart specs", specs.len());
    Ok(specs)
}

fn render_sidebar(dashboard: &Dashboard) -> String {
    let diseases: String = Disease::ALL
        .iter()
        .map(|d| format!(r#"<option value="{}">{}</option>"#, d.column(), d.label()))
        .collect();
    let regions: String = std::iter::once("all".to_string())
        .chain(dashboard.regions().iter().cloned())
        .map(|r| {
            let r = escape_html(&r);
            format!(r#"<option value="{r}">{r}</option>"#)
        })
        .collect();
    format!(
        r#"<aside class="sidebar">
    <h1>Measles &amp; Rubella</h1>
    <label for="disease">Disease</label>
    <select id="disease">{diseases}</select>
    <label for="region">Region</label>
    <select id="region">{regions}</select>
    <div class="stat">
        <h3>Countries</h3>
        <div class="value" id="stat-countries"></div>
    </div>
    <div class="stat">
        <h3>Total cases</h3>
        <div class="value" id="stat-cases"></div>
    </div>
</aside>"#
    )
}

fn render_slots() -> String {
    ChartKind::iter()
        .map(|kind| format!(r#"<div class="chart" id="{kind}"></div>"#))
        .collect::<Vec<_>>()
        .join("\n        ")
}

/// Render the full dashboard. The selection is restored to its current value afterwards.
pub fn render_page(dashboard: &mut Dashboard) -> EpidashResult<String> {
    let initial = dashboard.state().clone();
    let specs = collect_specs(dashboard)?;

    let mut summaries = serde_json::Map::new();
    for disease in Disease::ALL {
        dashboard.handle(UiEvent::DiseaseChanged(disease))?;
        let summary = dashboard.summary()?;
        summaries.insert(
            disease.column().to_string(),
            json!({"countries": summary.countries, "total_cases": summary.total_cases}),
        );
    }
    dashboard.handle(UiEvent::DiseaseChanged(initial.disease))?;
    dashboard.handle(UiEvent::RegionChanged(initial.region.clone()))?;
    if let Some(country) = initial.country.clone() {
        dashboard.handle(UiEvent::CountryChanged(country))?;
    }

    let depends: serde_json::Map<String, Value> = ChartKind::iter()
        .map(|kind| {
            (
                kind.to_string(),
                json!({"disease": depends_on_disease(kind), "region": depends_on_region(kind)}),
            )
        })
        .collect();
    let geography = match dashboard.geography() {
        Some(geography) => Value::Array(geography.features_json()?),
        None => Value::Null,
    };
    let config = json!({
        "specs": specs,
        "depends": depends,
        "summaries": summaries,
        "geography": geography,
        "geographyDataset": GEOGRAPHY_DATASET,
        "initial": {"disease": initial.disease.column(), "region": initial.region.to_string()},
    });
    info!("Rendered dashboard page with {} chart specs", specs.len());

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Measles &amp; Rubella dashboard</title>
    <style>{css}</style>
    {scripts}
</head>
<body>
    {sidebar}
    <main class="charts">
        {slots}
    </main>
    <script>const DASHBOARD = {config};</script>
    <script>{js}</script>
</body>
</html>
"#,
        css = inline_css(),
        scripts = vega_script_tags(),
        sidebar = render_sidebar(dashboard),
        slots = render_slots(),
        config = script_json(&config)?,
        js = inline_javascript(),
    ))
}

fn inline_css() -> &'static str {
    r#"
body { margin: 0; display: flex; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; }
.sidebar { width: 220px; padding: 1rem; background: #f4f5f7; min-height: 100vh; box-sizing: border-box; }
.sidebar h1 { font-size: 1.2rem; }
.sidebar label { display: block; margin-top: 1rem; font-weight: 600; }
.sidebar select { width: 100%; margin-top: 0.25rem; }
.stat { margin-top: 1.5rem; }
.stat h3 { margin: 0; font-size: 0.9rem; color: #555; }
.stat .value { font-size: 1.6rem; font-weight: 700; }
.charts { flex: 1; display: grid; grid-template-columns: repeat(auto-fit, minmax(520px, 1fr)); gap: 1rem; padding: 1rem; }
.chart { overflow: auto; }
"#
}

fn inline_javascript() -> &'static str {
    r#"
(function() {
    const disease = document.getElementById('disease');
    const region = document.getElementById('region');
    disease.value = DASHBOARD.initial.disease;
    region.value = DASHBOARD.initial.region;

    function key(kind) {
        const parts = [kind];
        if (DASHBOARD.depends[kind].disease) parts.push(disease.value);
        if (DASHBOARD.depends[kind].region) parts.push(region.value);
        return parts.join('|');
    }

    function draw(kind) {
        let spec = DASHBOARD.specs[key(kind)];
        if (!spec) return;
        if (kind === 'choropleth' && DASHBOARD.geography !== null) {
            spec = Object.assign({}, spec, {
                datasets: { [DASHBOARD.geographyDataset]: DASHBOARD.geography }
            });
        }
        vegaEmbed('#' + kind, spec, { actions: false });
    }

    function updateSummary() {
        const summary = DASHBOARD.summaries[disease.value];
        document.getElementById('stat-countries').textContent = summary.countries;
        document.getElementById('stat-cases').textContent =
            Math.round(summary.total_cases).toLocaleString();
    }

    function redraw(control) {
        Object.keys(DASHBOARD.depends)
            .filter(kind => DASHBOARD.depends[kind][control])
            .forEach(draw);
    }

    disease.addEventListener('change', () => { updateSummary(); redraw('disease'); });
    region.addEventListener('change', () => redraw('region'));
    updateSummary();
    Object.keys(DASHBOARD.depends).forEach(draw);
})();
"#
}
