use serde::{Deserialize, Serialize};

pub const DEFAULT_GEOGRAPHY_URL: &str =
    "https://raw.githubusercontent.com/johan/world.geo.json/master/countries.geo.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub annual_path: String,
    pub monthly_path: String,
    /// URL or local path of the GeoJSON feature collection
    pub geography: String,
    pub year: i32,
    pub top_n: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            annual_path: "cases_year_clean.csv".into(),
            monthly_path: "cases_month_clean.csv".into(),
            geography: DEFAULT_GEOGRAPHY_URL.into(),
            year: 2024,
            top_n: 10,
        }
    }
}
