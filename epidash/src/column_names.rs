//! Column names shared by the loaded case tables and every frame derived from them. The input
//! names must match the headers of the cleaned CSV files.

pub const YEAR: &str = "year";
pub const MONTH: &str = "month";
pub const DATE: &str = "date";

pub const ISO3: &str = "iso3";
pub const COUNTRY: &str = "country";
pub const REGION: &str = "region";

pub const MEASLES_TOTAL: &str = "measles_total";
pub const RUBELLA_TOTAL: &str = "rubella_total";
pub const TOTAL_POPULATION: &str = "total_population";

// Long form produced by melting the two disease columns
pub const VARIABLE: &str = "variable";
pub const CASES: &str = "cases";

pub const ANNUAL_REQUIRED: [&str; 7] = [
    YEAR,
    ISO3,
    COUNTRY,
    REGION,
    MEASLES_TOTAL,
    RUBELLA_TOTAL,
    TOTAL_POPULATION,
];

pub const MONTHLY_REQUIRED: [&str; 5] = [YEAR, MONTH, COUNTRY, MEASLES_TOTAL, RUBELLA_TOTAL];
