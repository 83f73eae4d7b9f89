//! Static driver/effect catalog, teleconnection matrix and region table.
//!
//! All three tables ship compiled in and can be replaced at startup through
//! an environment variable pointing at a JSON file. Validation runs once at
//! load; nothing downstream re-checks probabilities or ids.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use cascade_schema::{
    ClimateMode, DelayRange, DriverCategory, HazardType, MagnitudeUnit, RegionTag, Severity,
    TeleconnectionEffect,
};
use serde::Deserialize;
use thiserror::Error;

use crate::engine_config::{load_with_env_path, ConfigSource};

pub const BUILTIN_DRIVER_CATALOG: &str = include_str!("data/driver_catalog.json");
pub const BUILTIN_TELECONNECTIONS: &str = include_str!("data/teleconnections.json");
pub const BUILTIN_REGIONS: &str = include_str!("data/regions.json");

#[derive(Debug, Clone, Deserialize)]
pub struct DataSource {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cadence: Option<String>,
}

/// Baseline against which the scanner flags a driver as anomalous.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringSpec {
    pub metric: String,
    pub baseline: f64,
    pub anomaly_threshold: f64,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CausalEffect {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hazard: Option<HazardType>,
    pub probability: f64,
    pub delay: DelayRange,
    #[serde(default)]
    pub regions: Vec<RegionTag>,
    #[serde(default)]
    pub mechanism: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

/// Hand-curated link between two nodes that are not a driver and its own
/// effect. A link may introduce a new effect node when it carries a `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct CrossLink {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hazard: Option<HazardType>,
    pub probability: f64,
    pub delay: DelayRange,
    #[serde(default)]
    pub regions: Vec<RegionTag>,
    #[serde(default)]
    pub mechanism: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryDriver {
    pub id: String,
    pub name: String,
    pub category: DriverCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
    #[serde(default)]
    pub key_metrics: Vec<String>,
    pub magnitude_unit: MagnitudeUnit,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    #[serde(default)]
    pub monitoring: Option<MonitoringSpec>,
    #[serde(default)]
    pub teleconnections: Vec<ClimateMode>,
    #[serde(default)]
    pub effects: Vec<CausalEffect>,
}

impl PrimaryDriver {
    /// Severity implied by a magnitude against this driver's thresholds.
    pub fn severity_for(&self, magnitude: f64) -> Severity {
        let level = magnitude.abs();
        if level >= self.critical_threshold {
            Severity::Critical
        } else if level >= self.warning_threshold {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

/// What the catalog knows about a graph node independent of its edges.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub name: String,
    pub hazard: Option<HazardType>,
    pub is_driver: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DriverCatalog {
    pub version: u32,
    pub drivers: Vec<PrimaryDriver>,
    pub cross_links: Vec<CrossLink>,
    #[serde(skip)]
    nodes: BTreeMap<String, NodeInfo>,
}

impl DriverCatalog {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_DRIVER_CATALOG)
                .expect("builtin driver catalog should parse and validate"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let mut catalog: DriverCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn driver(&self, id: &str) -> Option<&PrimaryDriver> {
        self.drivers.iter().find(|driver| driver.id == id)
    }

    pub fn node(&self, id: &str) -> Option<&NodeInfo> {
        self.nodes.get(id)
    }

    pub fn effect_name(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(|info| info.name.as_str())
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    fn validate(&mut self) -> Result<(), CatalogError> {
        let mut nodes: BTreeMap<String, NodeInfo> = BTreeMap::new();

        for driver in &self.drivers {
            if nodes.contains_key(&driver.id) {
                return Err(CatalogError::DuplicateDriver {
                    id: driver.id.clone(),
                });
            }
            check_finite(&driver.id, "warning_threshold", driver.warning_threshold)?;
            check_finite(&driver.id, "critical_threshold", driver.critical_threshold)?;
            if driver.warning_threshold > driver.critical_threshold {
                return Err(CatalogError::ThresholdOrder {
                    driver: driver.id.clone(),
                });
            }
            if let Some(monitoring) = &driver.monitoring {
                check_finite(&driver.id, "monitoring.baseline", monitoring.baseline)?;
                check_finite(
                    &driver.id,
                    "monitoring.anomaly_threshold",
                    monitoring.anomaly_threshold,
                )?;
                check_unit(&driver.id, "monitoring.confidence", monitoring.confidence)?;
            }
            nodes.insert(
                driver.id.clone(),
                NodeInfo {
                    name: driver.name.clone(),
                    hazard: None,
                    is_driver: true,
                },
            );
        }

        for driver in &self.drivers {
            let mut seen = BTreeSet::new();
            for effect in &driver.effects {
                let context = format!("{}.{}", driver.id, effect.id);
                if !seen.insert(effect.id.as_str()) {
                    return Err(CatalogError::DuplicateEffect {
                        driver: driver.id.clone(),
                        effect: effect.id.clone(),
                    });
                }
                check_unit(&context, "probability", effect.probability)?;
                check_unit(&context, "confidence", effect.confidence)?;
                check_delay(&context, &effect.delay)?;
                register_effect(&mut nodes, &effect.id, &effect.name, effect.hazard)?;
            }
        }

        // Named links may introduce nodes; collect those before resolving
        // references so link order in the file does not matter.
        for link in &self.cross_links {
            if let Some(name) = &link.name {
                register_effect(&mut nodes, &link.target, name, link.hazard)?;
            }
        }

        for link in &self.cross_links {
            let context = format!("{}->{}", link.source, link.target);
            for id in [&link.source, &link.target] {
                if !nodes.contains_key(id) {
                    return Err(CatalogError::UnknownNode {
                        context: context.clone(),
                        id: id.clone(),
                    });
                }
            }
            if link.hazard.is_some() && link.name.is_none() {
                register_effect(&mut nodes, &link.target, "", link.hazard)?;
            }
            check_unit(&context, "probability", link.probability)?;
            check_unit(&context, "confidence", link.confidence)?;
            check_delay(&context, &link.delay)?;
        }

        self.nodes = nodes;
        Ok(())
    }
}

fn register_effect(
    nodes: &mut BTreeMap<String, NodeInfo>,
    id: &str,
    name: &str,
    hazard: Option<HazardType>,
) -> Result<(), CatalogError> {
    match nodes.get_mut(id) {
        Some(info) if info.is_driver => Err(CatalogError::NodeCollision { id: id.to_string() }),
        Some(info) => {
            match (info.hazard, hazard) {
                (Some(existing), Some(incoming)) if existing != incoming => {
                    return Err(CatalogError::HazardConflict {
                        id: id.to_string(),
                        existing,
                        incoming,
                    });
                }
                (None, Some(incoming)) => info.hazard = Some(incoming),
                _ => {}
            }
            if info.name.is_empty() {
                info.name = name.to_string();
            }
            Ok(())
        }
        None => {
            nodes.insert(
                id.to_string(),
                NodeInfo {
                    name: name.to_string(),
                    hazard,
                    is_driver: false,
                },
            );
            Ok(())
        }
    }
}

fn check_finite(context: &str, field: &'static str, value: f64) -> Result<(), CatalogError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CatalogError::NonFinite {
            context: context.to_string(),
            field,
        })
    }
}

fn check_unit(context: &str, field: &'static str, value: f64) -> Result<(), CatalogError> {
    check_finite(context, field, value)?;
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CatalogError::OutOfRange {
            context: context.to_string(),
            field,
            value,
        })
    }
}

fn check_delay(context: &str, delay: &DelayRange) -> Result<(), CatalogError> {
    check_finite(context, "delay.min", delay.min)?;
    check_finite(context, "delay.max", delay.max)?;
    if delay.min < 0.0 {
        return Err(CatalogError::OutOfRange {
            context: context.to_string(),
            field: "delay.min",
            value: delay.min,
        });
    }
    if delay.min > delay.max {
        return Err(CatalogError::InvertedDelay {
            context: context.to_string(),
        });
    }
    Ok(())
}

fn default_confidence() -> f64 {
    0.7
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeleconnectionMatrix {
    pub version: u32,
    pub effects: Vec<TeleconnectionEffect>,
}

impl TeleconnectionMatrix {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_TELECONNECTIONS)
                .expect("builtin teleconnection matrix should parse and validate"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let matrix: TeleconnectionMatrix = serde_json::from_str(json)?;
        matrix.validate()?;
        Ok(matrix)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn teleconnections_for(
        &self,
        region: RegionTag,
    ) -> impl Iterator<Item = &TeleconnectionEffect> {
        self.effects
            .iter()
            .filter(move |effect| effect.region == region)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for effect in &self.effects {
            let context = format!(
                "{}.{}.{}.{}",
                effect.mode.as_str(),
                effect.phase.as_str(),
                effect.region,
                effect.hazard
            );
            check_finite(&context, "base_magnitude", effect.base_magnitude)?;
            check_finite(&context, "delay_months", effect.delay_months)?;
        }
        Ok(())
    }
}

/// Coarse lat/lon rectangle; the first matching box classifies a point.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionBox {
    pub region: RegionTag,
    #[serde(default)]
    pub name: Option<String>,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    #[serde(default)]
    pub water: bool,
}

impl RegionBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Maps a coordinate to a coarse region and a water flag.
pub trait RegionClassifier: Send + Sync {
    fn classify(&self, lat: f64, lon: f64) -> RegionTag;
    fn is_water(&self, lat: f64, lon: f64) -> bool;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegionTable {
    pub version: u32,
    pub boxes: Vec<RegionBox>,
}

impl RegionTable {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_REGIONS)
                .expect("builtin region table should parse and validate"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let table: RegionTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    fn matching(&self, lat: f64, lon: f64) -> Option<&RegionBox> {
        let lon = normalize_lon(lon);
        self.boxes.iter().find(|entry| entry.contains(lat, lon))
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for entry in &self.boxes {
            let label = entry
                .name
                .clone()
                .unwrap_or_else(|| entry.region.to_string());
            for (field, value) in [
                ("min_lat", entry.min_lat),
                ("max_lat", entry.max_lat),
                ("min_lon", entry.min_lon),
                ("max_lon", entry.max_lon),
            ] {
                check_finite(&label, field, value)?;
            }
            if entry.min_lat >= entry.max_lat
                || entry.min_lon >= entry.max_lon
                || entry.min_lat < -90.0
                || entry.max_lat > 90.0
            {
                return Err(CatalogError::DegenerateBox { name: label });
            }
        }
        Ok(())
    }
}

impl RegionClassifier for RegionTable {
    fn classify(&self, lat: f64, lon: f64) -> RegionTag {
        self.matching(lat, lon)
            .map(|entry| entry.region)
            .unwrap_or_default()
    }

    fn is_water(&self, lat: f64, lon: f64) -> bool {
        self.matching(lat, lon)
            .map(|entry| entry.water)
            .unwrap_or(false)
    }
}

pub(crate) fn normalize_lon(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read catalog table from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("duplicate driver id {id}")]
    DuplicateDriver { id: String },
    #[error("driver {driver} lists effect {effect} more than once")]
    DuplicateEffect { driver: String, effect: String },
    #[error("effect id {id} collides with a driver id")]
    NodeCollision { id: String },
    #[error("{context}: {field} out of range: {value}")]
    OutOfRange {
        context: String,
        field: &'static str,
        value: f64,
    },
    #[error("{context}: {field} is not a finite number")]
    NonFinite {
        context: String,
        field: &'static str,
    },
    #[error("{context}: delay min exceeds max")]
    InvertedDelay { context: String },
    #[error("{context}: references unknown node {id}")]
    UnknownNode { context: String, id: String },
    #[error("driver {driver}: warning threshold above critical threshold")]
    ThresholdOrder { driver: String },
    #[error("effect {id} mapped to both {existing} and {incoming}")]
    HazardConflict {
        id: String,
        existing: HazardType,
        incoming: HazardType,
    },
    #[error("region box {name} is degenerate")]
    DegenerateBox { name: String },
}

/// The three static tables the engine is built from.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub drivers: Arc<DriverCatalog>,
    pub teleconnections: Arc<TeleconnectionMatrix>,
    pub regions: Arc<RegionTable>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogSources {
    pub drivers: ConfigSource,
    pub teleconnections: ConfigSource,
    pub regions: ConfigSource,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            drivers: DriverCatalog::builtin(),
            teleconnections: TeleconnectionMatrix::builtin(),
            regions: RegionTable::builtin(),
        }
    }
}

pub fn load_catalog_from_env() -> (Catalog, CatalogSources) {
    let (drivers, drivers_source) = load_with_env_path(
        "CASCADE_DRIVER_CATALOG_PATH",
        "driver_catalog",
        DriverCatalog::builtin,
        DriverCatalog::from_file,
    );
    let (teleconnections, teleconnections_source) = load_with_env_path(
        "CASCADE_TELECONNECTIONS_PATH",
        "teleconnections",
        TeleconnectionMatrix::builtin,
        TeleconnectionMatrix::from_file,
    );
    let (regions, regions_source) = load_with_env_path(
        "CASCADE_REGIONS_PATH",
        "regions",
        RegionTable::builtin,
        RegionTable::from_file,
    );
    (
        Catalog {
            drivers,
            teleconnections,
            regions,
        },
        CatalogSources {
            drivers: drivers_source,
            teleconnections: teleconnections_source,
            regions: regions_source,
        },
    )
}
