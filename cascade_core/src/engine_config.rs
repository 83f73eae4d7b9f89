use std::{
    collections::BTreeMap,
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use cascade_schema::{EmissionsScenario, HazardType, LocalVulnerability};
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_ENGINE_CONFIG: &str = include_str!("data/engine_config.json");

/// Tunables for every stage of the engine. Each section falls back to its
/// `Default` when omitted from the JSON document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub propagation: PropagationConfig,
    pub simulation: SimulationConfig,
    pub teleconnection: TeleconnectionConfig,
    pub vulnerability: VulnerabilityConfig,
    pub tessellation: TessellationConfig,
    pub projection: ProjectionConfig,
    pub scanner: ScannerConfig,
    pub ledger: LedgerConfig,
}

impl EngineConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_ENGINE_CONFIG)
                .expect("builtin engine config should parse and validate"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, EngineConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| EngineConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    fn validate(&self) -> Result<(), EngineConfigError> {
        let floor = self.propagation.probability_floor;
        if !(0.0..=1.0).contains(&floor) {
            return Err(EngineConfigError::OutOfRange {
                field: "propagation.probability_floor",
                value: floor,
            });
        }
        if self.teleconnection.reference_scale <= 0.0 {
            return Err(EngineConfigError::OutOfRange {
                field: "teleconnection.reference_scale",
                value: self.teleconnection.reference_scale,
            });
        }
        if self.vulnerability.multiplier_ceiling <= 0.0 {
            return Err(EngineConfigError::OutOfRange {
                field: "vulnerability.multiplier_ceiling",
                value: self.vulnerability.multiplier_ceiling,
            });
        }
        let significance = self.scanner.significance_floor;
        if !(0.0..=1.0).contains(&significance) {
            return Err(EngineConfigError::OutOfRange {
                field: "scanner.significance_floor",
                value: significance,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read engine config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("engine config field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Branches whose compounded probability falls below this are pruned.
    pub probability_floor: f64,
    pub default_max_depth: u32,
    /// Upper bound on worklist pops for a single traversal.
    pub max_expansions: usize,
    /// Compounded confidence below which a prediction is flagged.
    pub low_confidence_threshold: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            probability_floor: 0.02,
            default_max_depth: 4,
            max_expansions: 20_000,
            low_confidence_threshold: 0.4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub default_trials: u64,
    pub seed: u64,
    /// Trials between cancellation checks within one worker.
    pub check_interval: u64,
    pub perturb_activation: bool,
    /// Number of trial partitions. Results depend on this and the seed, not
    /// on how many threads rayon happens to run.
    pub task_count: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_trials: 10_000,
            seed: 0x5eed_cafe,
            check_interval: 256,
            perturb_activation: true,
            task_count: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TeleconnectionConfig {
    /// Index magnitude treated as unit intensity.
    pub reference_scale: f64,
    pub intensity_cap: f64,
}

impl Default for TeleconnectionConfig {
    fn default() -> Self {
        Self {
            reference_scale: 2.0,
            intensity_cap: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VulnerabilityConfig {
    pub multiplier_ceiling: f64,
    pub coastal_reach_km: f64,
    pub coastal_floor: f64,
    pub coastal_decay_km: f64,
    /// Used for points the geodata collaborator cannot describe.
    pub fallback: LocalVulnerability,
}

impl Default for VulnerabilityConfig {
    fn default() -> Self {
        Self {
            multiplier_ceiling: 2.5,
            coastal_reach_km: 20.0,
            coastal_floor: 0.05,
            coastal_decay_km: 30.0,
            fallback: LocalVulnerability::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TessellationConfig {
    pub default_resolution: u8,
    pub max_rings: u32,
    pub low_risk_floor: f64,
    pub height_scale_m: f64,
    pub cell_check_interval: usize,
}

impl Default for TessellationConfig {
    fn default() -> Self {
        Self {
            default_resolution: 6,
            max_rings: 40,
            low_risk_floor: 0.1,
            height_scale_m: 5000.0,
            cell_check_interval: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub baseline_year: i32,
    pub per_year_rate: f64,
    pub scenario_factors: BTreeMap<EmissionsScenario, f64>,
    pub warming_hazards: Vec<HazardType>,
    pub cooling_hazards: Vec<HazardType>,
}

impl ProjectionConfig {
    pub fn scenario_factor(&self, scenario: EmissionsScenario) -> f64 {
        self.scenario_factors.get(&scenario).copied().unwrap_or(1.0)
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        let mut scenario_factors = BTreeMap::new();
        scenario_factors.insert(EmissionsScenario::Ssp126, 0.5);
        scenario_factors.insert(EmissionsScenario::Ssp245, 1.0);
        scenario_factors.insert(EmissionsScenario::Ssp370, 1.5);
        scenario_factors.insert(EmissionsScenario::Ssp585, 2.0);
        Self {
            baseline_year: 2024,
            per_year_rate: 0.005,
            scenario_factors,
            warming_hazards: vec![
                HazardType::Heatwave,
                HazardType::Wildfire,
                HazardType::Drought,
                HazardType::Flood,
                HazardType::CoastalFlood,
            ],
            cooling_hazards: vec![HazardType::ColdWave],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub trials: u64,
    pub significance_floor: f64,
    pub counter_window_hours: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            trials: 5_000,
            significance_floor: 0.3,
            counter_window_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { capacity: 512 }
    }
}

/// Where a loaded table came from; `None` means the compiled-in copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSource {
    path: Option<PathBuf>,
}

impl ConfigSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn is_builtin(&self) -> bool {
        self.path.is_none()
    }
}

pub fn load_engine_config_from_env() -> (Arc<EngineConfig>, ConfigSource) {
    load_with_env_path(
        "CASCADE_ENGINE_CONFIG_PATH",
        "engine_config",
        EngineConfig::builtin,
        EngineConfig::from_file,
    )
}

/// Loads a table from the file named by `env_var`, falling back to the
/// compiled-in copy when the variable is unset or the file is unusable.
pub(crate) fn load_with_env_path<T, E>(
    env_var: &str,
    label: &'static str,
    builtin: fn() -> Arc<T>,
    from_file: fn(&Path) -> Result<T, E>,
) -> (Arc<T>, ConfigSource)
where
    E: std::fmt::Display,
{
    if let Some(path) = env::var(env_var).ok().map(PathBuf::from) {
        match from_file(&path) {
            Ok(table) => {
                tracing::info!(
                    target: "hazard_cascade::config",
                    path = %path.display(),
                    "{label}.loaded=file"
                );
                return (Arc::new(table), ConfigSource::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "hazard_cascade::config",
                    path = %path.display(),
                    error = %err,
                    "{label}.load_failed"
                );
            }
        }
    }

    tracing::info!(
        target: "hazard_cascade::config",
        "{label}.loaded=builtin"
    );
    (builtin(), ConfigSource::new(None))
}
