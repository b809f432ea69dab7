use std::io::{Cursor, Write};

use anyhow::{anyhow, Result};
use enum_dispatch::enum_dispatch;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::charts::Chart;

pub const VEGA_SCRIPTS: [&str; 3] = [
    "https://cdn.jsdelivr.net/npm/vega@5",
    "https://cdn.jsdelivr.net/npm/vega-lite@5",
    "https://cdn.jsdelivr.net/npm/vega-embed@6",
];

/// Converts one cell of a chart table to JSON. Integers of any width become JSON integers, NaN
/// becomes null.
fn any_value_to_json(value: &AnyValue) -> Result<Value> {
    Ok(match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::from(*s),
        AnyValue::StringOwned(s) => Value::from(s.as_str()),
        AnyValue::Float32(n) => json!(*n),
        AnyValue::Float64(n) => json!(*n),
        other if other.dtype().is_integer() => other
            .extract::<i64>()
            .map(Value::from)
            .ok_or_else(|| anyhow!("Integer out of range: {other:?}"))?,
        other => return Err(anyhow!("Unsupported value in chart data: {other:?}")),
    })
}

/// Rows of `df` as JSON objects keyed by column name, in the shape Vega-Lite takes as inline data
pub fn to_records(df: &DataFrame) -> Result<Vec<Value>> {
    let columns = df.get_columns();
    (0..df.height())
        .map(|idx| {
            let mut record = Map::new();
            for column in columns {
                let value = any_value_to_json(&column.get(idx)?)?;
                record.insert(column.name().to_string(), value);
            }
            Ok(Value::Object(record))
        })
        .collect()
}

/// Serializes `value` for inlining inside a `<script>` element
pub fn script_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

pub fn vega_script_tags() -> String {
    VEGA_SCRIPTS
        .iter()
        .map(|src| format!(r#"<script src="{src}"></script>"#))
        .collect::<Vec<_>>()
        .join("\n    ")
}

/// Trait to define different output generators for a chart. `save` writes the chart to a writer
/// and `format` returns the same output as a string.
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, chart: &Chart) -> Result<()>;
    fn format(&self, chart: &Chart) -> Result<String> {
        let mut data: Vec<u8> = vec![];
        let mut buff = Cursor::new(&mut data);
        self.save(&mut buff, chart)?;

        Ok(String::from_utf8(data)?)
    }
}

/// Enum of OutputFormatters one for each potential output type
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    VegaLite(VegaLiteFormatter),
    Html(HtmlFormatter),
}

/// The Vega-Lite specification as pretty printed JSON
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct VegaLiteFormatter;

impl OutputGenerator for VegaLiteFormatter {
    fn save(&self, writer: &mut impl Write, chart: &Chart) -> Result<()> {
        serde_json::to_writer_pretty(&mut *writer, &chart.to_vega_lite())?;
        writeln!(writer)?;
        Ok(())
    }
}

/// A standalone page rendering the chart with vega-embed
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct HtmlFormatter;

impl OutputGenerator for HtmlFormatter {
    fn save(&self, writer: &mut impl Write, chart: &Chart) -> Result<()> {
        let spec = chart.to_vega_lite();
        let title = spec
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("epidash");
        write!(
            writer,
            r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    {scripts}
</head>
<body>
    <div id="chart"></div>
    <script>vegaEmbed("#chart", {spec});</script>
</body>
</html>
"##,
            title = escape_html(title),
            scripts = vega_script_tags(),
            spec = script_json(&spec)?,
        )?;
        Ok(())
    }
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
