//! Point-level vulnerability and the per-hazard multipliers derived from it.

use std::collections::BTreeMap;

use cascade_schema::{HazardType, LandCover, LocalVulnerability};

use crate::engine_config::VulnerabilityConfig;

/// Supplies geographic features for a point. Returning `None` makes the
/// caller fall back to configured estimates and flag the result.
pub trait GeodataProvider: Send + Sync {
    fn vulnerability(&self, lat: f64, lon: f64) -> Option<LocalVulnerability>;
}

/// Provider with no data at all; every lookup falls back.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeodata;

impl GeodataProvider for NoGeodata {
    fn vulnerability(&self, _lat: f64, _lon: f64) -> Option<LocalVulnerability> {
        None
    }
}

/// Provider that reports the same features everywhere.
#[derive(Debug, Clone)]
pub struct UniformGeodata(pub LocalVulnerability);

impl GeodataProvider for UniformGeodata {
    fn vulnerability(&self, lat: f64, lon: f64) -> Option<LocalVulnerability> {
        Some(LocalVulnerability {
            lat,
            lon,
            ..self.0.clone()
        })
    }
}

/// Looks the point up and falls back to the configured estimate. The flag is
/// `true` when the fallback was used.
pub fn resolve(
    provider: &dyn GeodataProvider,
    lat: f64,
    lon: f64,
    config: &VulnerabilityConfig,
) -> (LocalVulnerability, bool) {
    match provider.vulnerability(lat, lon) {
        Some(found) => (found, false),
        None => (
            LocalVulnerability {
                lat,
                lon,
                ..config.fallback.clone()
            },
            true,
        ),
    }
}

pub fn hazard_multipliers(
    local: &LocalVulnerability,
    config: &VulnerabilityConfig,
) -> BTreeMap<HazardType, f64> {
    HazardType::ALL
        .iter()
        .map(|hazard| {
            let raw = hazard_multiplier(*hazard, local, config);
            (*hazard, raw.clamp(0.0, config.multiplier_ceiling))
        })
        .collect()
}

fn hazard_multiplier(
    hazard: HazardType,
    local: &LocalVulnerability,
    config: &VulnerabilityConfig,
) -> f64 {
    match hazard {
        HazardType::Flood => flood(local),
        HazardType::CoastalFlood => coastal_flood(local, config),
        HazardType::Drought => drought(local),
        HazardType::Wildfire => wildfire(local),
        HazardType::Heatwave => heatwave(local),
        HazardType::ColdWave => cold_wave(local),
        HazardType::TropicalCyclone => tropical_cyclone(local),
        HazardType::Landslide => landslide(local),
    }
}

/// Running multiplier that never dips below zero between steps.
#[derive(Debug, Clone, Copy)]
struct Term(f64);

impl Term {
    fn add(self, amount: f64) -> Self {
        Term((self.0 + amount).max(0.0))
    }

    fn add_if(self, condition: bool, amount: f64) -> Self {
        if condition {
            self.add(amount)
        } else {
            self
        }
    }
}

fn flood(v: &LocalVulnerability) -> f64 {
    let elevation = if v.elevation_m < 10.0 {
        0.5
    } else if v.elevation_m < 50.0 {
        0.2
    } else if v.elevation_m > 500.0 {
        -0.3
    } else {
        0.0
    };
    let river = if v.river_distance_km < 2.0 {
        0.6
    } else if v.river_distance_km < 10.0 {
        0.2
    } else {
        0.0
    };
    Term(1.0)
        .add(elevation)
        .add_if(v.coastal_distance_km < 5.0, 0.3)
        .add(river)
        .add_if(v.slope_deg < 2.0, 0.1)
        .add(v.urban_density * 0.3)
        .add(-v.flood_protection * 0.5)
        .0
}

fn coastal_flood(v: &LocalVulnerability, config: &VulnerabilityConfig) -> f64 {
    let distance = v.coastal_distance_km.max(0.0);
    let exposure = if distance <= config.coastal_reach_km {
        Term(1.0 + (1.0 - distance / config.coastal_reach_km))
            .add_if(v.elevation_m < 5.0, 0.5)
            .0
    } else {
        let decay = (-(distance - config.coastal_reach_km) / config.coastal_decay_km).exp();
        config.coastal_floor + (1.0 - config.coastal_floor) * decay
    };
    exposure * (1.0 - v.flood_protection * 0.4).max(0.0)
}

fn drought(v: &LocalVulnerability) -> f64 {
    Term(1.0)
        .add(v.agricultural_fraction * 0.4)
        .add_if(v.river_distance_km > 25.0, 0.1)
        .add(-v.early_warning * 0.1)
        .0
}

fn wildfire(v: &LocalVulnerability) -> f64 {
    let open_fuel = matches!(v.land_cover, LandCover::Shrubland | LandCover::Grassland);
    Term(0.5)
        .add(v.forest_coverage * 1.2)
        .add_if(open_fuel, 0.2)
        .add_if(v.slope_deg > 15.0, 0.15)
        .add(-v.urban_density * 0.4)
        .add(-v.fire_protection * 0.5)
        .0
}

fn heatwave(v: &LocalVulnerability) -> f64 {
    let elevation = if v.elevation_m < 200.0 {
        0.1
    } else if v.elevation_m > 1500.0 {
        -0.3
    } else {
        0.0
    };
    Term(1.0)
        .add(v.urban_density * 0.5)
        .add(elevation)
        .add_if(v.coastal_distance_km < 5.0, -0.1)
        .add(-v.early_warning * 0.2)
        .0
}

fn cold_wave(v: &LocalVulnerability) -> f64 {
    Term(1.0)
        .add((v.elevation_m.max(0.0) / 2000.0).min(1.0) * 0.3)
        .add_if(v.coastal_distance_km < 10.0, -0.2)
        .add(-v.urban_density * 0.1)
        .add(-v.early_warning * 0.2)
        .0
}

fn tropical_cyclone(v: &LocalVulnerability) -> f64 {
    Term(1.0)
        .add(0.5 * (-v.coastal_distance_km.max(0.0) / 100.0).exp())
        .add(-v.early_warning * 0.3)
        .0
}

fn landslide(v: &LocalVulnerability) -> f64 {
    Term(0.2)
        .add(v.slope_deg.max(0.0) / 30.0 * 1.2)
        .add(-v.forest_coverage * 0.3)
        .add_if(v.river_distance_km < 1.0, 0.1)
        .add(-v.early_warning * 0.2)
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VulnerabilityConfig {
        VulnerabilityConfig::default()
    }

    #[test]
    fn multipliers_stay_within_ceiling() {
        let extreme = LocalVulnerability {
            elevation_m: 1.0,
            coastal_distance_km: 0.0,
            river_distance_km: 0.5,
            slope_deg: 60.0,
            urban_density: 1.0,
            forest_coverage: 1.0,
            agricultural_fraction: 1.0,
            land_cover: LandCover::Shrubland,
            flood_protection: 0.0,
            fire_protection: 0.0,
            early_warning: 0.0,
            ..LocalVulnerability::default()
        };
        let protected = LocalVulnerability {
            flood_protection: 1.0,
            fire_protection: 1.0,
            early_warning: 1.0,
            urban_density: 1.0,
            forest_coverage: 0.0,
            slope_deg: 0.0,
            ..LocalVulnerability::default()
        };
        for local in [extreme, protected] {
            for (hazard, value) in hazard_multipliers(&local, &config()) {
                assert!(
                    (0.0..=config().multiplier_ceiling).contains(&value),
                    "{hazard} multiplier {value} out of bounds"
                );
            }
        }
    }

    #[test]
    fn coastal_flood_decays_toward_floor_inland() {
        let near = LocalVulnerability {
            coastal_distance_km: 1.0,
            flood_protection: 0.0,
            ..LocalVulnerability::default()
        };
        let far = LocalVulnerability {
            coastal_distance_km: 500.0,
            flood_protection: 0.0,
            ..LocalVulnerability::default()
        };
        let near_value = hazard_multipliers(&near, &config())[&HazardType::CoastalFlood];
        let far_value = hazard_multipliers(&far, &config())[&HazardType::CoastalFlood];
        assert!(near_value > 1.5);
        assert!(far_value >= config().coastal_floor);
        assert!(far_value < 0.06);
    }

    #[test]
    fn forest_raises_wildfire_above_drought() {
        let forest = LocalVulnerability {
            forest_coverage: 0.8,
            land_cover: LandCover::Forest,
            ..LocalVulnerability::default()
        };
        let multipliers = hazard_multipliers(&forest, &config());
        assert!(multipliers[&HazardType::Wildfire] > multipliers[&HazardType::Drought]);
    }

    #[test]
    fn missing_geodata_uses_flagged_fallback() {
        let (local, estimated) = resolve(&NoGeodata, -33.0, 151.0, &config());
        assert!(estimated);
        assert_eq!(local.lat, -33.0);
        assert_eq!(local.elevation_m, config().fallback.elevation_m);

        let uniform = UniformGeodata(LocalVulnerability::default());
        let (found, estimated) = resolve(&uniform, 10.0, 20.0, &config());
        assert!(!estimated);
        assert_eq!(found.lon, 20.0);
    }
}
