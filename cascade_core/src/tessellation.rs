//! Risk-annotated hexagon grids around a point.
//!
//! Region context (classification and the active teleconnections for every
//! region the grid touches) is resolved once on the calling thread. The
//! per-cell pass only reads that context and runs on rayon in fixed-size
//! chunks, checking the cancellation token between chunks.

use std::collections::BTreeMap;

use cascade_schema::{
    ActiveMode, ActiveTeleconnection, ClimateIndex, EmissionsScenario, EnhancedHexagon, GeoPoint,
    HazardType, LandCover, RegionTag, TessellationMetadata, DOMINANT_LOW_RISK, DOMINANT_WATER,
};
use chrono::Utc;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value};
use rayon::prelude::*;

use crate::{
    cancellation::CancellationToken,
    catalog::{RegionClassifier, TeleconnectionMatrix},
    climate::{active_modes, index_map},
    engine_config::{EngineConfig, ProjectionConfig},
    error::EngineError,
    hexgrid::{rings_for_radius, HexCell},
    teleconnection::{active_effects, chain_label, regional_base_risk},
    vulnerability::{hazard_multipliers, resolve, GeodataProvider},
};

const WATER_COLOR: &str = "#1e64c8";

#[derive(Debug, Clone, PartialEq)]
pub struct TessellationRequest {
    pub center: GeoPoint,
    pub radius_km: f64,
    /// Falls back to the configured default resolution.
    pub resolution: Option<u8>,
    /// `None` means use the last indices the engine has seen.
    pub indices: Option<BTreeMap<String, ClimateIndex>>,
    /// Projection target; `None` projects nothing.
    pub year: Option<i32>,
    pub scenario: EmissionsScenario,
}

impl TessellationRequest {
    pub fn new(center: GeoPoint, radius_km: f64) -> Self {
        Self {
            center,
            radius_km,
            resolution: None,
            indices: None,
            year: None,
            scenario: EmissionsScenario::default(),
        }
    }

    pub fn with_resolution(mut self, resolution: u8) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_indices(mut self, indices: BTreeMap<String, ClimateIndex>) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn projected(mut self, year: i32, scenario: EmissionsScenario) -> Self {
        self.year = Some(year);
        self.scenario = scenario;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TessellationOutput {
    pub collection: FeatureCollection,
    pub hexagons: Vec<EnhancedHexagon>,
    pub metadata: TessellationMetadata,
}

/// Borrowed collaborators for one tessellation pass.
#[derive(Clone, Copy)]
pub struct Tessellator<'a> {
    pub matrix: &'a TeleconnectionMatrix,
    pub classifier: &'a dyn RegionClassifier,
    pub geodata: &'a dyn GeodataProvider,
    pub config: &'a EngineConfig,
}

#[derive(Debug, Clone, Default)]
struct RegionContext {
    teleconnections: Vec<ActiveTeleconnection>,
    base_risk: BTreeMap<HazardType, f64>,
    chains: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct LocatedCell {
    cell: HexCell,
    center: GeoPoint,
    region: RegionTag,
    water: bool,
}

struct SharedContext<'a> {
    regions: BTreeMap<RegionTag, RegionContext>,
    modes: Vec<ActiveMode>,
    years_ahead: i32,
    scenario: EmissionsScenario,
    indices_estimated: bool,
    tessellator: &'a Tessellator<'a>,
}

impl<'a> Tessellator<'a> {
    /// Builds the grid. `indices_estimated` marks indices that are stale
    /// stand-ins for a missing feed; every land cell is then flagged.
    pub fn generate(
        &self,
        request: &TessellationRequest,
        indices: &BTreeMap<String, ClimateIndex>,
        indices_estimated: bool,
        token: &CancellationToken,
    ) -> Result<TessellationOutput, EngineError> {
        let center = request.center;
        if !center.lat.is_finite() || !center.lon.is_finite() || center.lat.abs() > 90.0 {
            return Err(EngineError::InvalidInput(format!(
                "center ({}, {}) is not a coordinate",
                center.lat, center.lon
            )));
        }
        // Phase and strength are recomputed so hand-built readings cannot
        // activate the wrong teleconnection rows.
        let rederived = index_map(indices.values().cloned().map(ClimateIndex::rederived));
        let indices = &rederived;
        let settings = &self.config.tessellation;
        let resolution = request.resolution.unwrap_or(settings.default_resolution);
        let (rings, capped) = rings_for_radius(request.radius_km, resolution, settings.max_rings)?;
        let origin = HexCell::containing(center, resolution)?;

        let located: Vec<LocatedCell> = origin
            .disk(rings)
            .into_iter()
            .filter_map(|cell| {
                let point = cell.center()?;
                Some(LocatedCell {
                    cell,
                    center: point,
                    region: self.classifier.classify(point.lat, point.lon),
                    water: self.classifier.is_water(point.lat, point.lon),
                })
            })
            .collect();

        let mut regions: BTreeMap<RegionTag, RegionContext> = BTreeMap::new();
        let center_region = self.classifier.classify(center.lat, center.lon);
        for region in std::iter::once(center_region).chain(located.iter().map(|c| c.region)) {
            regions
                .entry(region)
                .or_insert_with(|| self.region_context(region, indices));
        }

        let baseline = self.config.projection.baseline_year;
        let year = request.year.unwrap_or(baseline);
        let shared = SharedContext {
            regions,
            modes: active_modes(indices),
            years_ahead: (year - baseline).max(0),
            scenario: request.scenario,
            indices_estimated,
            tessellator: self,
        };

        let chunk = settings.cell_check_interval.max(1);
        let chunks: Vec<Option<Vec<(Feature, EnhancedHexagon)>>> = located
            .par_chunks(chunk)
            .map(|cells| {
                if token.is_cancelled() {
                    return None;
                }
                Some(
                    cells
                        .iter()
                        .map(|cell| {
                            let hex = shared.hexagon(cell);
                            (feature(cell.cell, &hex), hex)
                        })
                        .collect(),
                )
            })
            .collect();
        let cancelled = chunks.iter().any(Option::is_none);
        let (features, hexagons): (Vec<Feature>, Vec<EnhancedHexagon>) =
            chunks.into_iter().flatten().flatten().unzip();

        let metadata = TessellationMetadata {
            center,
            center_region,
            radius_km: request.radius_km,
            resolution,
            rings,
            cell_count: hexagons.len(),
            year,
            years_ahead: shared.years_ahead,
            scenario: request.scenario,
            truncated: capped || cancelled,
            low_confidence: indices_estimated || hexagons.iter().any(|hex| hex.low_confidence),
            generated_at: Utc::now(),
        };

        if cancelled {
            tracing::warn!(
                target: "hazard_cascade::tessellation",
                cells = hexagons.len(),
                requested = located.len(),
                "tessellation.cancelled"
            );
        }
        tracing::info!(
            target: "hazard_cascade::tessellation",
            region = %center_region,
            resolution,
            rings,
            cells = hexagons.len(),
            truncated = metadata.truncated,
            "tessellation.generated"
        );

        Ok(TessellationOutput {
            collection: feature_collection(features, &metadata),
            hexagons,
            metadata,
        })
    }

    fn region_context(
        &self,
        region: RegionTag,
        indices: &BTreeMap<String, ClimateIndex>,
    ) -> RegionContext {
        let teleconnections =
            active_effects(self.matrix, region, indices, &self.config.teleconnection);
        RegionContext {
            base_risk: regional_base_risk(&teleconnections),
            chains: teleconnections.iter().map(chain_label).collect(),
            teleconnections,
        }
    }
}

impl SharedContext<'_> {
    fn hexagon(&self, located: &LocatedCell) -> EnhancedHexagon {
        let config = self.tessellator.config;
        let point = located.center;
        let (mut local, estimated) = resolve(
            self.tessellator.geodata,
            point.lat,
            point.lon,
            &config.vulnerability,
        );
        local.region = located.region;

        if located.water || local.land_cover == LandCover::Water {
            return EnhancedHexagon {
                cell: located.cell.id(),
                resolution: located.cell.resolution,
                center: point,
                local: Some(local),
                region: located.region,
                is_water: true,
                active_modes: Vec::new(),
                teleconnections: Vec::new(),
                hazard_risks: HazardType::ALL.iter().map(|h| (*h, 0.0)).collect(),
                dominant_hazard: DOMINANT_WATER.to_string(),
                dominant_risk: 0.0,
                total_risk: 0.0,
                causal_chains: Vec::new(),
                color: WATER_COLOR.to_string(),
                height: 0.0,
                low_confidence: false,
            };
        }

        let context = self.regions.get(&located.region);
        let multipliers = hazard_multipliers(&local, &config.vulnerability);
        let delta = projection_delta(&config.projection, self.years_ahead, self.scenario);

        let hazard_risks: BTreeMap<HazardType, f64> = HazardType::ALL
            .iter()
            .map(|hazard| {
                let base = context
                    .and_then(|ctx| ctx.base_risk.get(hazard))
                    .copied()
                    .unwrap_or(0.0)
                    .max(0.0);
                let multiplier = multipliers.get(hazard).copied().unwrap_or(1.0);
                let risk = (base * multiplier).clamp(0.0, 1.0);
                (*hazard, project(&config.projection, *hazard, risk, delta))
            })
            .collect();

        let mut dominant = (HazardType::ALL[0], f64::MIN);
        for (hazard, risk) in &hazard_risks {
            if *risk > dominant.1 {
                dominant = (*hazard, *risk);
            }
        }
        let total_risk = 1.0 - hazard_risks.values().map(|r| 1.0 - r).product::<f64>();
        let dominant_hazard = if dominant.1 < config.tessellation.low_risk_floor {
            DOMINANT_LOW_RISK.to_string()
        } else {
            dominant.0.as_str().to_string()
        };

        EnhancedHexagon {
            cell: located.cell.id(),
            resolution: located.cell.resolution,
            center: point,
            local: Some(local),
            region: located.region,
            is_water: false,
            active_modes: self.modes.clone(),
            teleconnections: context
                .map(|ctx| ctx.teleconnections.clone())
                .unwrap_or_default(),
            hazard_risks,
            dominant_hazard,
            dominant_risk: dominant.1,
            total_risk,
            causal_chains: context.map(|ctx| ctx.chains.clone()).unwrap_or_default(),
            color: risk_color(total_risk),
            height: total_risk * config.tessellation.height_scale_m,
            low_confidence: estimated || self.indices_estimated,
        }
    }
}

/// Long-run drift added to warming hazards and removed from cooling ones.
pub fn projection_delta(config: &ProjectionConfig, years_ahead: i32, scenario: EmissionsScenario) -> f64 {
    years_ahead.max(0) as f64 * config.per_year_rate * config.scenario_factor(scenario)
}

fn project(config: &ProjectionConfig, hazard: HazardType, risk: f64, delta: f64) -> f64 {
    let shifted = if config.warming_hazards.contains(&hazard) {
        risk + delta
    } else if config.cooling_hazards.contains(&hazard) {
        risk - delta
    } else {
        risk
    };
    shifted.clamp(0.0, 1.0)
}

/// Green at zero risk through yellow to red at full risk.
fn risk_color(risk: f64) -> String {
    let t = risk.clamp(0.0, 1.0);
    let red = (t * 2.0).min(1.0) * 255.0;
    let green = ((1.0 - t) * 2.0).min(1.0) * 255.0;
    format!("#{:02x}{:02x}00", red.round() as u8, green.round() as u8)
}

fn feature(cell: HexCell, hex: &EnhancedHexagon) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Polygon(vec![cell.boundary()]))),
        id: Some(Id::String(hex.cell.clone())),
        properties: to_object(hex),
        foreign_members: None,
    }
}

/// Hexagon polygons with the run metadata as a foreign member.
fn feature_collection(features: Vec<Feature>, metadata: &TessellationMetadata) -> FeatureCollection {
    let foreign_members = to_object(metadata).map(|metadata| {
        let mut members = JsonObject::new();
        members.insert("metadata".to_string(), serde_json::Value::Object(metadata));
        members
    });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

fn to_object<T: serde::Serialize>(value: &T) -> Option<JsonObject> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::RegionTable, vulnerability::{NoGeodata, UniformGeodata},
    };
    use cascade_schema::LocalVulnerability;

    const SYDNEY: GeoPoint = GeoPoint {
        lat: -33.87,
        lon: 151.21,
    };

    fn el_nino() -> BTreeMap<String, ClimateIndex> {
        index_map([ClimateIndex::new("ONI", 1.8, "test", Utc::now())])
    }

    fn forest() -> UniformGeodata {
        UniformGeodata(LocalVulnerability {
            forest_coverage: 0.8,
            land_cover: LandCover::Forest,
            coastal_distance_km: 60.0,
            ..LocalVulnerability::default()
        })
    }

    fn run(
        geodata: &dyn GeodataProvider,
        request: &TessellationRequest,
        indices: &BTreeMap<String, ClimateIndex>,
    ) -> TessellationOutput {
        let matrix = TeleconnectionMatrix::builtin();
        let regions = RegionTable::builtin();
        let config = EngineConfig::builtin();
        let tessellator = Tessellator {
            matrix: &matrix,
            classifier: regions.as_ref(),
            geodata,
            config: &config,
        };
        tessellator
            .generate(request, indices, false, &CancellationToken::new())
            .expect("tessellation succeeds")
    }

    #[test]
    fn forest_cell_near_sydney_is_wildfire_dominant() {
        let request = TessellationRequest::new(SYDNEY, 10.0).with_resolution(6);
        let output = run(&forest(), &request, &el_nino());
        assert_eq!(output.metadata.center_region, RegionTag::EasternAustralia);
        let hex = output
            .hexagons
            .iter()
            .find(|hex| hex.region == RegionTag::EasternAustralia)
            .expect("land cell");
        assert_eq!(hex.dominant_hazard, "wildfire");
        assert!(hex.hazard_risks[&HazardType::Wildfire] > hex.hazard_risks[&HazardType::Drought]);
        assert!(!hex.causal_chains.is_empty());
        assert_eq!(output.collection.features.len(), output.hexagons.len());
    }

    #[test]
    fn request_indices_are_rederived_before_use() {
        let mut stale = ClimateIndex::new("ONI", 0.0, "test", Utc::now());
        stale.value = 1.8;
        let indices: BTreeMap<String, ClimateIndex> = [(stale.name.clone(), stale)].into();
        let request = TessellationRequest::new(SYDNEY, 10.0).with_resolution(6);
        let output = run(&forest(), &request, &indices);
        let hex = output
            .hexagons
            .iter()
            .find(|hex| !hex.is_water)
            .expect("land cell");
        assert_eq!(hex.dominant_hazard, "wildfire");
    }

    #[test]
    fn risks_are_bounded_and_water_is_inert() {
        let request = TessellationRequest::new(SYDNEY, 400.0)
            .with_resolution(4)
            .projected(2080, EmissionsScenario::Ssp585);
        let output = run(&NoGeodata, &request, &el_nino());
        assert!(output.hexagons.iter().any(|hex| hex.is_water));
        for hex in &output.hexagons {
            for risk in hex.hazard_risks.values() {
                assert!((0.0..=1.0).contains(risk));
            }
            assert!((0.0..=1.0).contains(&hex.total_risk));
            if hex.is_water {
                assert_eq!(hex.dominant_hazard, DOMINANT_WATER);
                assert_eq!(hex.total_risk, 0.0);
            }
        }
        assert!(output.metadata.low_confidence);
    }

    #[test]
    fn quiet_climate_is_low_risk() {
        let request = TessellationRequest::new(SYDNEY, 5.0).with_resolution(6);
        let output = run(&forest(), &request, &BTreeMap::new());
        let hex = output
            .hexagons
            .iter()
            .find(|hex| !hex.is_water)
            .expect("land cell");
        assert_eq!(hex.dominant_hazard, DOMINANT_LOW_RISK);
    }

    #[test]
    fn projection_raises_warming_and_lowers_cold_hazards() {
        let config = ProjectionConfig::default();
        let delta = projection_delta(&config, 20, EmissionsScenario::Ssp585);
        assert!((delta - 0.2).abs() < 1e-12);
        assert!((project(&config, HazardType::Heatwave, 0.5, delta) - 0.7).abs() < 1e-12);
        assert!((project(&config, HazardType::ColdWave, 0.5, delta) - 0.3).abs() < 1e-12);
        assert_eq!(project(&config, HazardType::Landslide, 0.5, delta), 0.5);
        assert_eq!(projection_delta(&config, -5, EmissionsScenario::Ssp126), 0.0);
    }

    #[test]
    fn cancelled_run_is_truncated() {
        let matrix = TeleconnectionMatrix::builtin();
        let regions = RegionTable::builtin();
        let config = EngineConfig::builtin();
        let tessellator = Tessellator {
            matrix: &matrix,
            classifier: regions.as_ref(),
            geodata: &NoGeodata,
            config: &config,
        };
        let token = CancellationToken::new();
        token.cancel();
        let output = tessellator
            .generate(
                &TessellationRequest::new(SYDNEY, 50.0).with_resolution(6),
                &el_nino(),
                false,
                &token,
            )
            .expect("cancellation is not an error");
        assert!(output.metadata.truncated);
        assert!(output.hexagons.is_empty());
    }

    #[test]
    fn rejects_off_globe_center() {
        let matrix = TeleconnectionMatrix::builtin();
        let regions = RegionTable::builtin();
        let config = EngineConfig::builtin();
        let tessellator = Tessellator {
            matrix: &matrix,
            classifier: regions.as_ref(),
            geodata: &NoGeodata,
            config: &config,
        };
        let err = tessellator
            .generate(
                &TessellationRequest::new(GeoPoint::new(95.0, 0.0), 10.0),
                &BTreeMap::new(),
                false,
                &CancellationToken::new(),
            )
            .expect_err("latitude beyond the pole");
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn risk_color_runs_green_to_red() {
        assert_eq!(risk_color(0.0), "#00ff00");
        assert_eq!(risk_color(0.5), "#ffff00");
        assert_eq!(risk_color(1.0), "#ff0000");
    }
}
