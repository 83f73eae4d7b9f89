//! Serializable structures exchanged between the cascade engine and its
//! callers.
//!
//! Everything here is plain data: closed enumerations for categories,
//! hazards, regions and climate modes, plus the result structures emitted by
//! propagation, simulation, tessellation and world-state scans. No engine
//! internals leak through these types.

use ahash::RandomState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DriverCategory {
    Tectonic,
    Volcanic,
    Solar,
    Oceanic,
    Atmospheric,
    Cryospheric,
    Anthropogenic,
}

impl DriverCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverCategory::Tectonic => "tectonic",
            DriverCategory::Volcanic => "volcanic",
            DriverCategory::Solar => "solar",
            DriverCategory::Oceanic => "oceanic",
            DriverCategory::Atmospheric => "atmospheric",
            DriverCategory::Cryospheric => "cryospheric",
            DriverCategory::Anthropogenic => "anthropogenic",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HazardType {
    Flood,
    CoastalFlood,
    Drought,
    Wildfire,
    Heatwave,
    ColdWave,
    TropicalCyclone,
    Landslide,
}

impl HazardType {
    pub const ALL: [HazardType; 8] = [
        HazardType::Flood,
        HazardType::CoastalFlood,
        HazardType::Drought,
        HazardType::Wildfire,
        HazardType::Heatwave,
        HazardType::ColdWave,
        HazardType::TropicalCyclone,
        HazardType::Landslide,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HazardType::Flood => "flood",
            HazardType::CoastalFlood => "coastal_flood",
            HazardType::Drought => "drought",
            HazardType::Wildfire => "wildfire",
            HazardType::Heatwave => "heatwave",
            HazardType::ColdWave => "cold_wave",
            HazardType::TropicalCyclone => "tropical_cyclone",
            HazardType::Landslide => "landslide",
        }
    }
}

impl fmt::Display for HazardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse world regions used by teleconnection rules and the bounding-box
/// classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RegionTag {
    EasternAustralia,
    NorthernAustralia,
    MaritimeContinent,
    SouthAsia,
    EastAsia,
    EastAfrica,
    SouthernAfrica,
    Sahel,
    Mediterranean,
    NorthernEurope,
    WesternNorthAmerica,
    CentralNorthAmerica,
    SoutheasternNorthAmerica,
    NorthernSouthAmerica,
    WesternSouthAmerica,
    SouthernSouthAmerica,
    OpenOcean,
    Unclassified,
}

impl RegionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionTag::EasternAustralia => "eastern_australia",
            RegionTag::NorthernAustralia => "northern_australia",
            RegionTag::MaritimeContinent => "maritime_continent",
            RegionTag::SouthAsia => "south_asia",
            RegionTag::EastAsia => "east_asia",
            RegionTag::EastAfrica => "east_africa",
            RegionTag::SouthernAfrica => "southern_africa",
            RegionTag::Sahel => "sahel",
            RegionTag::Mediterranean => "mediterranean",
            RegionTag::NorthernEurope => "northern_europe",
            RegionTag::WesternNorthAmerica => "western_north_america",
            RegionTag::CentralNorthAmerica => "central_north_america",
            RegionTag::SoutheasternNorthAmerica => "southeastern_north_america",
            RegionTag::NorthernSouthAmerica => "northern_south_america",
            RegionTag::WesternSouthAmerica => "western_south_america",
            RegionTag::SouthernSouthAmerica => "southern_south_america",
            RegionTag::OpenOcean => "open_ocean",
            RegionTag::Unclassified => "unclassified",
        }
    }
}

impl Default for RegionTag {
    fn default() -> Self {
        RegionTag::Unclassified
    }
}

impl fmt::Display for RegionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClimateMode {
    Enso,
    Iod,
    Nao,
    Pdo,
    Amo,
    Sam,
    Ao,
}

impl ClimateMode {
    /// Maps a published index name onto the oscillation it summarizes.
    pub fn from_index_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ONI" | "NINO34" | "NINO3.4" | "MEI" | "ENSO" => Some(ClimateMode::Enso),
            "DMI" | "IOD" => Some(ClimateMode::Iod),
            "NAO" => Some(ClimateMode::Nao),
            "PDO" => Some(ClimateMode::Pdo),
            "AMO" => Some(ClimateMode::Amo),
            "SAM" | "AAO" => Some(ClimateMode::Sam),
            "AO" => Some(ClimateMode::Ao),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClimateMode::Enso => "enso",
            ClimateMode::Iod => "iod",
            ClimateMode::Nao => "nao",
            ClimateMode::Pdo => "pdo",
            ClimateMode::Amo => "amo",
            ClimateMode::Sam => "sam",
            ClimateMode::Ao => "ao",
        }
    }
}

pub fn index_full_name(name: &str) -> &'static str {
    match name.trim().to_ascii_uppercase().as_str() {
        "ONI" => "Oceanic Niño Index",
        "NINO34" | "NINO3.4" => "Niño 3.4 SST Anomaly",
        "MEI" => "Multivariate ENSO Index",
        "ENSO" => "El Niño-Southern Oscillation",
        "DMI" | "IOD" => "Indian Ocean Dipole Mode Index",
        "NAO" => "North Atlantic Oscillation",
        "PDO" => "Pacific Decadal Oscillation",
        "AMO" => "Atlantic Multidecadal Oscillation",
        "SAM" | "AAO" => "Southern Annular Mode",
        "AO" => "Arctic Oscillation",
        _ => "Unknown climate index",
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Positive,
    Negative,
    Neutral,
}

impl Phase {
    pub fn from_value(value: f64) -> Self {
        if value >= 0.5 {
            Phase::Positive
        } else if value <= -0.5 {
            Phase::Negative
        } else {
            Phase::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Positive => "positive",
            Phase::Negative => "negative",
            Phase::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
    Extreme,
}

impl Strength {
    pub fn from_value(value: f64) -> Self {
        let magnitude = value.abs();
        if magnitude < 0.5 {
            Strength::Weak
        } else if magnitude < 1.5 {
            Strength::Moderate
        } else if magnitude < 2.0 {
            Strength::Strong
        } else {
            Strength::Extreme
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strength::Weak => "weak",
            Strength::Moderate => "moderate",
            Strength::Strong => "strong",
            Strength::Extreme => "extreme",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    Predicted,
    Materializing,
    Materialized,
    Expired,
}

impl EffectStatus {
    /// Forward-only lifecycle; any open status may expire.
    pub fn can_transition_to(self, next: EffectStatus) -> bool {
        use EffectStatus::*;
        matches!(
            (self, next),
            (Predicted, Materializing)
                | (Predicted, Materialized)
                | (Materializing, Materialized)
                | (Predicted, Expired)
                | (Materializing, Expired)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EmissionsScenario {
    #[serde(rename = "ssp1-2.6")]
    Ssp126,
    #[serde(rename = "ssp2-4.5")]
    Ssp245,
    #[serde(rename = "ssp3-7.0")]
    Ssp370,
    #[serde(rename = "ssp5-8.5")]
    Ssp585,
}

impl EmissionsScenario {
    pub fn as_str(self) -> &'static str {
        match self {
            EmissionsScenario::Ssp126 => "ssp1-2.6",
            EmissionsScenario::Ssp245 => "ssp2-4.5",
            EmissionsScenario::Ssp370 => "ssp3-7.0",
            EmissionsScenario::Ssp585 => "ssp5-8.5",
        }
    }
}

impl Default for EmissionsScenario {
    fn default() -> Self {
        EmissionsScenario::Ssp245
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    pub fn days(self) -> f64 {
        match self {
            TimeUnit::Hours => 1.0 / 24.0,
            TimeUnit::Days => 1.0,
            TimeUnit::Weeks => 7.0,
            TimeUnit::Months => 30.44,
            TimeUnit::Years => 365.25,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
            TimeUnit::Weeks => "weeks",
            TimeUnit::Months => "months",
            TimeUnit::Years => "years",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
    pub unit: TimeUnit,
}

impl DelayRange {
    pub fn min_days(&self) -> f64 {
        self.min * self.unit.days()
    }

    pub fn max_days(&self) -> f64 {
        self.max * self.unit.days()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpectedTiming {
    pub min_days: f64,
    pub max_days: f64,
    pub label: String,
}

impl ExpectedTiming {
    pub fn from_days(min_days: f64, max_days: f64) -> Self {
        let unit = if max_days < 2.0 {
            TimeUnit::Hours
        } else if max_days < 14.0 {
            TimeUnit::Days
        } else if max_days < 60.0 {
            TimeUnit::Weeks
        } else if max_days < 730.0 {
            TimeUnit::Months
        } else {
            TimeUnit::Years
        };
        let scale = unit.days();
        let low = format_amount(min_days / scale);
        let high = format_amount(max_days / scale);
        let label = if low == high {
            format!("{low} {}", unit.as_str())
        } else {
            format!("{low}-{high} {}", unit.as_str())
        };
        Self {
            min_days,
            max_days,
            label,
        }
    }
}

fn format_amount(value: f64) -> String {
    if (value - value.round()).abs() < 0.05 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value:.1}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LandCover {
    Water,
    Urban,
    Forest,
    Cropland,
    Grassland,
    Shrubland,
    Barren,
    Wetland,
    SnowIce,
}

impl Default for LandCover {
    fn default() -> Self {
        LandCover::Grassland
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeUnit {
    MomentMagnitude,
    VolcanicExplosivityIndex,
    TemperatureAnomaly,
    IndexValue,
    KpIndex,
    Percent,
    Generic,
}

/// Event magnitude whose unit depends on the driver that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum Magnitude {
    MomentMagnitude(f64),
    VolcanicExplosivityIndex(f64),
    TemperatureAnomaly(f64),
    IndexValue(f64),
    KpIndex(f64),
    Percent(f64),
    Generic { value: f64, unit: String },
}

impl Magnitude {
    pub fn value(&self) -> f64 {
        match self {
            Magnitude::MomentMagnitude(value)
            | Magnitude::VolcanicExplosivityIndex(value)
            | Magnitude::TemperatureAnomaly(value)
            | Magnitude::IndexValue(value)
            | Magnitude::KpIndex(value)
            | Magnitude::Percent(value) => *value,
            Magnitude::Generic { value, .. } => *value,
        }
    }

    pub fn unit(&self) -> MagnitudeUnit {
        match self {
            Magnitude::MomentMagnitude(_) => MagnitudeUnit::MomentMagnitude,
            Magnitude::VolcanicExplosivityIndex(_) => MagnitudeUnit::VolcanicExplosivityIndex,
            Magnitude::TemperatureAnomaly(_) => MagnitudeUnit::TemperatureAnomaly,
            Magnitude::IndexValue(_) => MagnitudeUnit::IndexValue,
            Magnitude::KpIndex(_) => MagnitudeUnit::KpIndex,
            Magnitude::Percent(_) => MagnitudeUnit::Percent,
            Magnitude::Generic { .. } => MagnitudeUnit::Generic,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLocation {
    pub lat: f64,
    pub lon: f64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveEvent {
    pub id: Uuid,
    pub driver_id: String,
    pub timestamp: DateTime<Utc>,
    pub magnitude: Magnitude,
    pub location: EventLocation,
    pub severity: Severity,
    pub triggered_effects: Vec<String>,
    pub processed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictedEffect {
    pub id: String,
    pub trigger_event_id: Option<Uuid>,
    pub trigger_driver_id: String,
    pub effect_id: String,
    pub effect_name: String,
    pub hazard: Option<HazardType>,
    pub probability: f64,
    pub confidence: f64,
    pub timing: ExpectedTiming,
    pub regions: Vec<RegionTag>,
    pub mechanism: String,
    pub path: Vec<String>,
    pub depth: u32,
    pub low_confidence: bool,
    pub status: EffectStatus,
}

impl PredictedEffect {
    /// Applies an externally confirmed status change. Returns `false` and
    /// leaves the status untouched when the transition is not allowed.
    pub fn advance(&mut self, next: EffectStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CausalPath {
    pub driver_id: String,
    pub driver_name: String,
    pub category: DriverCategory,
    pub nodes: Vec<String>,
    pub probability: f64,
    pub confidence: f64,
    pub timing: ExpectedTiming,
}

impl CausalPath {
    pub fn depth(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CauseReport {
    pub effect_id: String,
    pub effect_name: String,
    pub paths: Vec<CausalPath>,
    pub by_category: BTreeMap<DriverCategory, Vec<CausalPath>>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributionSummary {
    pub effect_id: String,
    pub effect_name: String,
    pub probability: f64,
    pub triggered_trials: u64,
    pub mean_delay_days: f64,
    pub std_delay_days: f64,
    pub p10_delay_days: f64,
    pub p90_delay_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationSummary {
    pub trigger_driver_id: String,
    pub trials_requested: u64,
    pub trials_completed: u64,
    pub seed: u64,
    pub truncated: bool,
    pub effects: BTreeMap<String, DistributionSummary>,
}

impl SimulationSummary {
    /// Effects whose empirical probability exceeds `floor`, most likely first.
    pub fn significant(&self, floor: f64) -> Vec<&DistributionSummary> {
        let mut effects: Vec<&DistributionSummary> = self
            .effects
            .values()
            .filter(|summary| summary.probability > floor)
            .collect();
        effects.sort_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then_with(|| a.effect_id.cmp(&b.effect_id))
        });
        effects
    }
}

/// Climate index reading with its derived phase and strength.
///
/// Deserialization ignores any phase/strength carried by the payload and
/// re-derives both from the value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "ClimateIndexRecord")]
pub struct ClimateIndex {
    pub name: String,
    pub full_name: String,
    pub mode: Option<ClimateMode>,
    pub value: f64,
    pub phase: Phase,
    pub strength: Strength,
    pub trend: Option<f64>,
    pub source: String,
    pub observed_at: DateTime<Utc>,
}

impl ClimateIndex {
    pub fn new(
        name: impl Into<String>,
        value: f64,
        source: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        let name = name.trim().to_ascii_uppercase();
        Self {
            full_name: index_full_name(&name).to_string(),
            mode: ClimateMode::from_index_name(&name),
            phase: Phase::from_value(value),
            strength: Strength::from_value(value),
            name,
            value,
            trend: None,
            source: source.into(),
            observed_at,
        }
    }

    pub fn with_trend(mut self, previous: Option<f64>) -> Self {
        self.trend = previous.map(|prior| self.value - prior);
        self
    }

    /// Recomputes every field derived from the name and value, keeping the
    /// trend. Readings built or edited by hand may carry a stale phase.
    pub fn rederived(self) -> Self {
        let trend = self.trend;
        let mut index = ClimateIndex::new(self.name, self.value, self.source, self.observed_at);
        index.trend = trend;
        index
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ClimateIndexRecord {
    name: String,
    value: f64,
    #[serde(default)]
    trend: Option<f64>,
    #[serde(default)]
    source: String,
    #[serde(default = "Utc::now")]
    observed_at: DateTime<Utc>,
}

impl From<ClimateIndexRecord> for ClimateIndex {
    fn from(record: ClimateIndexRecord) -> Self {
        let mut index = ClimateIndex::new(
            record.name,
            record.value,
            record.source,
            record.observed_at,
        );
        index.trend = record.trend;
        index
    }
}

/// One row of the static teleconnection matrix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeleconnectionEffect {
    pub mode: ClimateMode,
    pub phase: Phase,
    pub region: RegionTag,
    pub hazard: HazardType,
    pub base_magnitude: f64,
    pub delay_months: f64,
    pub mechanism: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveTeleconnection {
    pub effect: TeleconnectionEffect,
    pub index_name: String,
    pub index_value: f64,
    pub intensity: f64,
    pub effective_magnitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveMode {
    pub mode: ClimateMode,
    pub index_name: String,
    pub value: f64,
    pub phase: Phase,
    pub strength: Strength,
}

/// Point-level geographic features supplied by a geodata collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalVulnerability {
    pub lat: f64,
    pub lon: f64,
    pub region: RegionTag,
    pub elevation_m: f64,
    pub coastal_distance_km: f64,
    pub river_distance_km: f64,
    pub slope_deg: f64,
    pub urban_density: f64,
    pub forest_coverage: f64,
    pub agricultural_fraction: f64,
    pub land_cover: LandCover,
    pub flood_protection: f64,
    pub fire_protection: f64,
    pub early_warning: f64,
}

impl Default for LocalVulnerability {
    fn default() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            region: RegionTag::Unclassified,
            elevation_m: 100.0,
            coastal_distance_km: 100.0,
            river_distance_km: 10.0,
            slope_deg: 3.0,
            urban_density: 0.1,
            forest_coverage: 0.2,
            agricultural_fraction: 0.3,
            land_cover: LandCover::Grassland,
            flood_protection: 0.2,
            fire_protection: 0.2,
            early_warning: 0.3,
        }
    }
}

pub const DOMINANT_WATER: &str = "water";
pub const DOMINANT_LOW_RISK: &str = "low_risk";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnhancedHexagon {
    pub cell: String,
    pub resolution: u8,
    pub center: GeoPoint,
    pub local: Option<LocalVulnerability>,
    pub region: RegionTag,
    pub is_water: bool,
    pub active_modes: Vec<ActiveMode>,
    pub teleconnections: Vec<ActiveTeleconnection>,
    pub hazard_risks: BTreeMap<HazardType, f64>,
    pub dominant_hazard: String,
    pub dominant_risk: f64,
    pub total_risk: f64,
    pub causal_chains: Vec<String>,
    pub color: String,
    pub height: f64,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TessellationMetadata {
    pub center: GeoPoint,
    pub center_region: RegionTag,
    pub radius_km: f64,
    pub resolution: u8,
    pub rings: u32,
    pub cell_count: usize,
    pub year: i32,
    pub years_ahead: i32,
    pub scenario: EmissionsScenario,
    pub truncated: bool,
    pub low_confidence: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnomalyReport {
    pub driver_id: String,
    pub driver_name: String,
    pub category: DriverCategory,
    pub current_value: f64,
    pub baseline: f64,
    pub deviation: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub observed_at: Option<DateTime<Utc>>,
    pub significant_effects: Vec<DistributionSummary>,
    pub trials: u64,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AlertCounters {
    pub window_hours: u32,
    pub total: u32,
    pub critical: u32,
    pub warning: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldState {
    pub timestamp: DateTime<Utc>,
    pub climate_modes: BTreeMap<String, ClimateIndex>,
    pub enso_status: String,
    pub anomalies: Vec<AnomalyReport>,
    pub predictions: Vec<PredictedEffect>,
    pub alerts_by_region: BTreeMap<RegionTag, Vec<String>>,
    pub counters: AlertCounters,
    pub hash: u64,
}

impl WorldState {
    /// Stamps the content hash; the timestamp is excluded so two scans of
    /// identical inputs hash identically.
    pub fn finalize(mut self) -> Self {
        self.hash = hash_world_state(&self);
        self
    }
}

pub fn hash_world_state(state: &WorldState) -> u64 {
    let mut clone = state.clone();
    clone.hash = 0;
    clone.timestamp = DateTime::<Utc>::default();
    let encoded = bincode::serialize(&clone).expect("world state serialization for hashing");
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    hasher.finish()
}

pub fn encode_world_state_json(state: &WorldState) -> serde_json::Result<String> {
    serde_json::to_string(state)
}

pub fn decode_world_state_json(data: &str) -> serde_json::Result<WorldState> {
    serde_json::from_str(data)
}
