use std::{fs::File, io::Write, path::Path};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use epidash::{
    aggregate::{correlation_cells, filter_region, top_countries},
    charts::{Chart, ChartKind},
    config::Config,
    controller::{Dashboard, UiEvent},
    formatters::{HtmlFormatter, OutputFormatter, OutputGenerator, VegaLiteFormatter},
    page::render_page,
    selection::{Disease, RegionFilter},
    Epidash,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;

use crate::display::{display_correlation, display_regions, display_summary, display_top};
use crate::error::EpidashCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const LOADING_STRING: &str = "Loading case data and boundaries";

/// Defines the output formats a single chart can be written in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    #[strum(serialize = "vegalite", serialize = "json")]
    VegaLite,
    Html,
}

impl From<&OutputFormat> for OutputFormatter {
    fn from(value: &OutputFormat) -> Self {
        match value {
            OutputFormat::VegaLite => VegaLiteFormatter.into(),
            OutputFormat::Html => HtmlFormatter.into(),
        }
    }
}

#[derive(Debug, Clone, clap::ValueEnum, Copy)]
enum DiseaseArgs {
    Measles,
    Rubella,
}

impl From<DiseaseArgs> for Disease {
    fn from(value: DiseaseArgs) -> Self {
        match value {
            DiseaseArgs::Measles => Disease::Measles,
            DiseaseArgs::Rubella => Disease::Rubella,
        }
    }
}

fn write_output<T, U>(
    output_generator: T,
    chart: &Chart,
    output_file: Option<U>,
) -> EpidashCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, chart)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, chart)?;
    };
    Ok(())
}

async fn load(config: Config, quiet: bool) -> EpidashCliResult<Epidash> {
    let sp = (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            LOADING_STRING.to_string() + RUNNING_TAIL_STRING,
        )
    });
    let epidash = Epidash::new_with_config(config).await?;
    if let Some(mut s) = sp {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
    Ok(epidash)
}

/// Builds a dashboard and applies the disease and region chosen on the command line
fn dashboard_for(
    epidash: &Epidash,
    disease: Option<DiseaseArgs>,
    region: &RegionFilter,
) -> EpidashCliResult<Dashboard> {
    let mut dashboard = epidash.dashboard()?;
    if let Some(disease) = disease {
        dashboard.handle(UiEvent::DiseaseChanged(disease.into()))?;
    }
    dashboard.handle(UiEvent::RegionChanged(region.clone()))?;
    Ok(dashboard)
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> EpidashCliResult<()>;
}

/// Overrides for the values read from the config file
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    #[arg(long, global = true, help = "Annual cases CSV file")]
    annual: Option<String>,
    #[arg(long, global = true, help = "Monthly cases CSV file")]
    monthly: Option<String>,
    #[arg(long, global = true, help = "URL or path of the country boundaries GeoJSON")]
    geography: Option<String>,
    #[arg(long, global = true, help = "Year to load")]
    year: Option<i32>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(annual) = &self.annual {
            config.annual_path.clone_from(annual);
        }
        if let Some(monthly) = &self.monthly {
            config.monthly_path.clone_from(monthly);
        }
        if let Some(geography) = &self.geography {
            config.geography.clone_from(geography);
        }
        if let Some(year) = self.year {
            config.year = year;
        }
    }
}

/// The `summary` command prints the sidebar figures for a disease.
#[derive(Args, Debug)]
pub struct SummaryCommand {
    #[arg(short, long, value_enum, default_value_t = DiseaseArgs::Measles)]
    disease: DiseaseArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for SummaryCommand {
    async fn run(&self, config: Config) -> EpidashCliResult<()> {
        info!("Running `summary` subcommand");
        let epidash = load(config, self.quiet).await?;
        let dashboard = dashboard_for(&epidash, Some(self.disease), &RegionFilter::All)?;
        display_summary(&dashboard.summary()?);
        Ok(())
    }
}

/// The `regions` command lists the region codes found in the annual data.
#[derive(Args, Debug)]
pub struct RegionsCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for RegionsCommand {
    async fn run(&self, config: Config) -> EpidashCliResult<()> {
        info!("Running `regions` subcommand");
        let epidash = load(config, self.quiet).await?;
        display_regions(&epidash.data.annual.regions()?);
        Ok(())
    }
}

/// The `top` command ranks countries by cases of each disease within a region.
#[derive(Args, Debug)]
pub struct TopCommand {
    #[arg(short, long, default_value = "all", help = "Region code, or 'all'")]
    region: RegionFilter,
    #[arg(short, long, help = "Number of countries per disease (defaults to the config)")]
    n: Option<u32>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for TopCommand {
    async fn run(&self, config: Config) -> EpidashCliResult<()> {
        info!("Running `top` subcommand");
        let n = self.n.unwrap_or(config.top_n);
        let epidash = load(config, self.quiet).await?;
        let dashboard = dashboard_for(&epidash, None, &self.region)?;
        let ranked = top_countries(&dashboard.data().annual, &dashboard.state().region, n)?;
        debug!("{ranked:#?}");
        if ranked.height() == 0 {
            println!("No countries with cases in region {}", self.region);
            return Ok(());
        }
        display_top(&ranked)?;
        Ok(())
    }
}

/// The `correlation` command prints the correlation between measles, rubella and population.
#[derive(Args, Debug)]
pub struct CorrelationCommand {
    #[arg(short, long, default_value = "all", help = "Region code, or 'all'")]
    region: RegionFilter,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for CorrelationCommand {
    async fn run(&self, config: Config) -> EpidashCliResult<()> {
        info!("Running `correlation` subcommand");
        let epidash = load(config, self.quiet).await?;
        let dashboard = dashboard_for(&epidash, None, &self.region)?;
        let regional = filter_region(&dashboard.data().annual.0, &dashboard.state().region)?;
        let cells = correlation_cells(&regional)?;
        if cells.is_empty() {
            println!("Not enough countries with cases in region {}", self.region);
            return Ok(());
        }
        display_correlation(&cells);
        Ok(())
    }
}

/// The `chart` command outputs one chart for a selection as Vega-Lite JSON or an HTML page.
#[derive(Args, Debug)]
pub struct ChartCommand {
    #[arg(index = 1, help = "choropleth|top_countries|disease_scatter|heatmap|regional_trend|country_trend")]
    kind: ChartKind,
    #[arg(short, long, value_enum)]
    disease: Option<DiseaseArgs>,
    #[arg(short, long, default_value = "all", help = "Region code, or 'all'")]
    region: RegionFilter,
    #[arg(short, long, help = "Country highlighted in the country trend")]
    country: Option<String>,
    #[arg(
        short = 'f',
        long,
        value_name = "vegalite|html",
        default_value = "vegalite",
        help = "Output format for the chart"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the chart")]
    output_file: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ChartCommand {
    async fn run(&self, config: Config) -> EpidashCliResult<()> {
        info!("Running `chart` subcommand");
        let epidash = load(config, self.quiet).await?;
        let mut dashboard = dashboard_for(&epidash, self.disease, &self.region)?;
        if let Some(country) = &self.country {
            dashboard.handle(UiEvent::CountryChanged(country.clone()))?;
        }
        let chart = dashboard.render(self.kind)?;
        let formatter: OutputFormatter = (&self.output_format).into();
        write_output(formatter, &chart, self.output_file.as_deref())?;
        Ok(())
    }
}

/// The `dashboard` command writes the full interactive dashboard as one HTML file.
#[derive(Args, Debug)]
pub struct DashboardCommand {
    #[arg(short = 'o', long, help = "Output file to place the page")]
    output_file: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for DashboardCommand {
    async fn run(&self, config: Config) -> EpidashCliResult<()> {
        info!("Running `dashboard` subcommand");
        let epidash = load(config, self.quiet).await?;
        let mut dashboard = epidash.dashboard()?;
        let page = render_page(&mut dashboard)?;
        if let Some(output_file) = &self.output_file {
            std::fs::write(output_file, page)
                .with_context(|| format!("Failed to write page to {output_file}"))?;
        } else {
            std::io::stdout().lock().write_all(page.as_bytes())?;
        }
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Measles and rubella case dashboard", long_about = None, name="epidash")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[command(flatten)]
    pub overrides: ConfigOverrides,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress spinner to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command implements the RunCommand trait.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Number of countries and total cases for a disease
    Summary(SummaryCommand),
    /// List the regions in the annual data
    Regions(RegionsCommand),
    /// Countries with most cases per disease
    Top(TopCommand),
    /// Correlation between measles, rubella and population
    Correlation(CorrelationCommand),
    /// Output one chart as Vega-Lite JSON or HTML
    Chart(ChartCommand),
    /// Output the interactive dashboard as an HTML page
    Dashboard(DashboardCommand),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;

    const COUNTRIES: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "id": "KEN",
          "properties": {"name": "Kenya"},
          "geometry": {"type": "Point", "coordinates": [37.9, 0.0]}
        }
      ]
    }"#;

    fn test_config(dir: &TempDir) -> Config {
        let write = |name: &str, contents: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path.to_string_lossy().to_string()
        };
        Config {
            annual_path: write(
                "annual.csv",
                "year,iso3,country,region,measles_total,rubella_total,total_population\n\
                 2024,KEN,Kenya,AFR,120,0,50000000\n\
                 2024,UGA,Uganda,AFR,0,30,40000000\n\
                 2024,FRA,France,EUR,10,1,68000000\n",
            ),
            monthly_path: write(
                "monthly.csv",
                "year,month,country,measles_total,rubella_total\n\
                 2024,1,Kenya,40,0\n\
                 2024,2,Kenya,80,0\n",
            ),
            geography: write("countries.geo.json", COUNTRIES),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_chart_command() {
        let dir = TempDir::new().unwrap();
        let output_file = NamedTempFile::new().unwrap();
        let chart_command = ChartCommand {
            kind: ChartKind::TopCountries,
            disease: None,
            region: RegionFilter::from_str("AFR").unwrap(),
            country: None,
            output_format: OutputFormat::VegaLite,
            output_file: Some(output_file.path().to_string_lossy().to_string()),
            quiet: true,
        };
        let result = chart_command.run(test_config(&dir)).await;
        assert!(result.is_ok());

        let written = std::fs::read_to_string(output_file.path()).unwrap();
        let spec: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(spec["title"], "Top 10 countries by cases (AFR)");
    }

    #[tokio::test]
    async fn chart_command_should_reject_unknown_region() {
        let dir = TempDir::new().unwrap();
        let chart_command = ChartCommand {
            kind: ChartKind::Heatmap,
            disease: Some(DiseaseArgs::Rubella),
            region: RegionFilter::from_str("SEAR").unwrap(),
            country: None,
            output_format: OutputFormat::Html,
            output_file: None,
            quiet: true,
        };
        assert!(chart_command.run(test_config(&dir)).await.is_err());
    }

    #[tokio::test]
    async fn test_dashboard_command() {
        let dir = TempDir::new().unwrap();
        let output_file = NamedTempFile::new().unwrap();
        let dashboard_command = DashboardCommand {
            output_file: Some(output_file.path().to_string_lossy().to_string()),
            quiet: true,
        };
        dashboard_command.run(test_config(&dir)).await.unwrap();
        let page = std::fs::read_to_string(output_file.path()).unwrap();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(r#"<option value="EUR">EUR</option>"#));
    }

    #[test]
    fn output_format_should_deserialize_properly() {
        assert_eq!(
            OutputFormat::from_str("json").unwrap(),
            OutputFormat::VegaLite,
            "json is an alias of vegalite"
        );
        assert_eq!(
            OutputFormat::from_str("HTML").unwrap(),
            OutputFormat::Html,
            "parsing should be case insensitive"
        );
        assert!(OutputFormat::from_str("png").is_err());
    }

    #[test]
    fn overrides_should_replace_config_values() {
        let mut config = Config::default();
        ConfigOverrides {
            year: Some(2023),
            annual: Some("annual.csv".into()),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.year, 2023);
        assert_eq!(config.annual_path, "annual.csv");
        assert_eq!(config.monthly_path, Config::default().monthly_path);
    }

    #[test]
    fn cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
