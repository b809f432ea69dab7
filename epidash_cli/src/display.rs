use comfy_table::{presets::NOTHING, *};
use itertools::izip;

use epidash::{aggregate::variable_label, aggregate::CorrelationCell, aggregate::Summary, COL};
use polars::frame::DataFrame;

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        )
        .set_style(TableComponent::BottomBorder, '─')
        .set_style(TableComponent::MiddleHeaderIntersections, '─')
        .set_style(TableComponent::HeaderLines, '─')
        .set_style(TableComponent::BottomBorderIntersections, '─')
        .set_style(TableComponent::TopBorder, '─')
        .set_style(TableComponent::TopBorderIntersections, '─');
    table
}

pub fn display_summary(summary: &Summary) {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(TableComponent::BottomBorder, '─')
        .set_style(TableComponent::BottomBorderIntersections, '─')
        .set_style(TableComponent::TopBorder, '─')
        .set_style(TableComponent::TopBorderIntersections, '─')
        .add_row(vec![
            Cell::new("Disease").add_attribute(Attribute::Bold),
            summary.disease.label().into(),
        ])
        .add_row(vec![
            Cell::new("Countries").add_attribute(Attribute::Bold),
            summary.countries.into(),
        ])
        .add_row(vec![
            Cell::new("Total cases").add_attribute(Attribute::Bold),
            format!("{:.0}", summary.total_cases).into(),
        ]);
    if let Some(column) = table.column_mut(0) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    println!("\n{}", table);
}

pub fn display_regions(regions: &[String]) {
    let mut table = new_table(&["Region"]);
    table.add_row(vec![epidash::selection::ALL_REGIONS]);
    for region in regions {
        table.add_row(vec![region]);
    }
    println!("\n{}", table);
}

pub fn display_top(ranked: &DataFrame) -> anyhow::Result<()> {
    let mut table = new_table(&["Disease", "Country", "ISO3", "Cases"]);
    for (variable, country, iso3, cases) in izip!(
        ranked.column(COL::VARIABLE)?.str()?,
        ranked.column(COL::COUNTRY)?.str()?,
        ranked.column(COL::ISO3)?.str()?,
        ranked.column(COL::CASES)?.f64()?,
    ) {
        table.add_row(vec![
            variable.map(variable_label).unwrap_or_default().to_string(),
            country.unwrap_or_default().to_string(),
            iso3.unwrap_or_default().to_string(),
            cases.map(|c| format!("{c:.0}")).unwrap_or_default(),
        ]);
    }
    if let Some(column) = table.column_mut(3) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    println!("\n{}", table);
    Ok(())
}

pub fn display_correlation(cells: &[CorrelationCell]) {
    let mut table = new_table(&["Variable", "Variable", "Pearson r"]);
    for cell in cells {
        table.add_row(vec![
            variable_label(cell.variable_a).to_string(),
            variable_label(cell.variable_b).to_string(),
            cell.coefficient
                .map(|r| format!("{r:.2}"))
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("\n{}", table);
}
