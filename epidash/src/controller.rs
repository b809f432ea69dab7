//! Dashboard session: the current selection plus the data it is applied to.
//!
//! A change of one control only rebuilds the charts that depend on it. Legend and map clicks
//! never reach this module, they are handled by the selection params inside each chart spec.

use std::sync::Arc;

use log::{info, warn};
use strum::IntoEnumIterator;

use crate::{
    aggregate::{summary, Summary},
    charts::{self, Chart, ChartKind},
    data::CaseData,
    error::{EpidashError, EpidashResult},
    geo::Geography,
    selection::{Disease, RegionFilter, SelectionState},
};

/// A change of one of the dashboard controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    DiseaseChanged(Disease),
    RegionChanged(RegionFilter),
    CountryChanged(String),
}

impl UiEvent {
    /// Charts whose output depends on the value this event changes
    pub fn affected(&self) -> &'static [ChartKind] {
        match self {
            UiEvent::DiseaseChanged(_) => &[
                ChartKind::Choropleth,
                ChartKind::RegionalTrend,
                ChartKind::CountryTrend,
            ],
            UiEvent::RegionChanged(_) => &[
                ChartKind::Choropleth,
                ChartKind::TopCountries,
                ChartKind::DiseaseScatter,
                ChartKind::Heatmap,
            ],
            UiEvent::CountryChanged(_) => &[ChartKind::CountryTrend],
        }
    }
}

pub struct Dashboard {
    data: Arc<CaseData>,
    geography: Result<Arc<Geography>, String>,
    state: SelectionState,
    regions: Vec<String>,
    countries: Vec<String>,
    top_n: u32,
}

impl Dashboard {
    /// `geography` carries the load error message when the boundaries could not be fetched, in
    /// which case only the map is unavailable.
    pub fn new(
        data: Arc<CaseData>,
        geography: Result<Arc<Geography>, String>,
        top_n: u32,
    ) -> EpidashResult<Self> {
        let regions = data.annual.regions()?;
        let countries = data.monthly.countries()?;
        if let Err(err) = &geography {
            warn!("Map view disabled: {err}");
        }
        Ok(Self {
            data,
            geography,
            state: SelectionState::default(),
            regions,
            countries,
            top_n,
        })
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Region options observed in the annual table, without the "all" sentinel
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Country options observed in the monthly table
    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    pub fn data(&self) -> &CaseData {
        &self.data
    }

    pub fn geography(&self) -> Option<&Geography> {
        self.geography.as_deref().ok()
    }

    pub fn top_n(&self) -> u32 {
        self.top_n
    }

    /// Apply `event` to the selection and return the charts that need rendering again. Values not
    /// present in the loaded data are rejected and leave the selection untouched.
    pub fn handle(&mut self, event: UiEvent) -> EpidashResult<Vec<ChartKind>> {
        let affected = event.affected().to_vec();
        match event {
            UiEvent::DiseaseChanged(disease) => self.state.disease = disease,
            UiEvent::RegionChanged(region) => {
                if let RegionFilter::Region(code) = &region {
                    if !self.regions.contains(code) {
                        return Err(EpidashError::UnknownRegion(code.clone()));
                    }
                }
                self.state.region = region;
            }
            UiEvent::CountryChanged(country) => {
                if !self.countries.contains(&country) {
                    return Err(EpidashError::UnknownCountry(country));
                }
                self.state.country = Some(country);
            }
        }
        info!("Selection is now {:?}, re-rendering {affected:?}", self.state);
        Ok(affected)
    }

    pub fn render(&self, kind: ChartKind) -> EpidashResult<Chart> {
        let annual = &self.data.annual;
        let monthly = &self.data.monthly;
        match kind {
            ChartKind::Choropleth => {
                let geography = self
                    .geography
                    .as_ref()
                    .map_err(|err| EpidashError::GeographyUnavailable(err.clone()))?;
                charts::choropleth(geography, annual, &self.state)
            }
            ChartKind::TopCountries => charts::top_countries_bar(annual, &self.state, self.top_n),
            ChartKind::DiseaseScatter => charts::disease_scatter(annual, &self.state),
            ChartKind::Heatmap => charts::correlation_heatmap(annual, &self.state),
            ChartKind::RegionalTrend => charts::regional_trend(monthly, &self.state),
            ChartKind::CountryTrend => charts::country_trend(monthly, &self.state),
        }
    }

    /// Every chart for the current selection. Each one fails on its own.
    pub fn render_all(&self) -> Vec<(ChartKind, EpidashResult<Chart>)> {
        ChartKind::iter()
            .map(|kind| (kind, self.render(kind)))
            .collect()
    }

    /// Sidebar figures for the selected disease
    pub fn summary(&self) -> EpidashResult<Summary> {
        summary(&self.data.annual, self.state.disease)
    }
}
