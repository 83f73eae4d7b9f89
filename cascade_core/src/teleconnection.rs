use std::collections::BTreeMap;

use cascade_schema::{ActiveTeleconnection, ClimateIndex, HazardType, RegionTag};

use crate::{
    catalog::TeleconnectionMatrix, climate::dominant_by_mode,
    engine_config::TeleconnectionConfig,
};

/// Index magnitude scaled against the reference and capped.
pub fn intensity(value: f64, config: &TeleconnectionConfig) -> f64 {
    (value.abs() / config.reference_scale).min(config.intensity_cap)
}

/// Matrix rows for `region` whose mode is currently in the required phase,
/// strongest effect first.
pub fn active_effects(
    matrix: &TeleconnectionMatrix,
    region: RegionTag,
    indices: &BTreeMap<String, ClimateIndex>,
    config: &TeleconnectionConfig,
) -> Vec<ActiveTeleconnection> {
    let dominant = dominant_by_mode(indices);
    let mut active: Vec<ActiveTeleconnection> = matrix
        .teleconnections_for(region)
        .filter_map(|effect| {
            let index = dominant.get(&effect.mode)?;
            if index.phase != effect.phase {
                return None;
            }
            let intensity = intensity(index.value, config);
            Some(ActiveTeleconnection {
                effect: effect.clone(),
                index_name: index.name.clone(),
                index_value: index.value,
                intensity,
                effective_magnitude: effect.base_magnitude * intensity,
            })
        })
        .collect();
    active.sort_by(|a, b| {
        b.effective_magnitude
            .abs()
            .total_cmp(&a.effective_magnitude.abs())
            .then_with(|| a.effect.hazard.cmp(&b.effect.hazard))
            .then_with(|| a.effect.mode.cmp(&b.effect.mode))
    });
    active
}

/// Net effective magnitude per hazard. Negative sums mean the mode
/// suppresses that hazard in the region.
pub fn regional_base_risk(active: &[ActiveTeleconnection]) -> BTreeMap<HazardType, f64> {
    let mut risk = BTreeMap::new();
    for entry in active {
        *risk.entry(entry.effect.hazard).or_insert(0.0) += entry.effective_magnitude;
    }
    risk
}

/// One-line description of a teleconnection chain for display.
pub fn chain_label(entry: &ActiveTeleconnection) -> String {
    format!(
        "{} {} ({} {:+.2}) -> {} {} {:+.2}",
        entry.effect.mode.as_str().to_ascii_uppercase(),
        entry.effect.phase.as_str(),
        entry.index_name,
        entry.index_value,
        entry.effect.region,
        entry.effect.hazard,
        entry.effective_magnitude
    )
}
