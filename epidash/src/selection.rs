//! The user-facing filters: which disease, which region, which country.

use std::{convert::Infallible, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

use crate::COL;

/// Sentinel accepted in place of a region code to select every row
pub const ALL_REGIONS: &str = "all";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Disease {
    #[default]
    #[strum(serialize = "measles_total", serialize = "measles")]
    Measles,
    #[strum(serialize = "rubella_total", serialize = "rubella")]
    Rubella,
}

impl Disease {
    pub const ALL: [Disease; 2] = [Disease::Measles, Disease::Rubella];

    /// Name of the count column for this disease, also used as the melted `variable` label
    pub fn column(&self) -> &'static str {
        match self {
            Disease::Measles => COL::MEASLES_TOTAL,
            Disease::Rubella => COL::RUBELLA_TOTAL,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Disease::Measles => "Measles",
            Disease::Rubella => "Rubella",
        }
    }
}

impl Display for Disease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionFilter {
    #[default]
    All,
    Region(String),
}

impl FromStr for RegionFilter {
    type Err = Infallible;
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case(ALL_REGIONS) {
            Ok(RegionFilter::All)
        } else {
            Ok(RegionFilter::Region(value.to_string()))
        }
    }
}

impl Display for RegionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionFilter::All => write!(f, "{ALL_REGIONS}"),
            RegionFilter::Region(code) => write!(f, "{code}"),
        }
    }
}

/// Current values of the dashboard controls. Every interaction overwrites one field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub disease: Disease,
    pub region: RegionFilter,
    pub country: Option<String>,
}
