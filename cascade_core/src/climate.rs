use std::collections::BTreeMap;

use cascade_schema::{ActiveMode, ClimateIndex, ClimateMode, Phase};

/// Picks one reading per climate mode. When several indices describe the
/// same mode (ONI and MEI for ENSO, say) the largest magnitude wins; ties
/// keep the alphabetically first name.
pub fn dominant_by_mode(
    indices: &BTreeMap<String, ClimateIndex>,
) -> BTreeMap<ClimateMode, &ClimateIndex> {
    let mut dominant: BTreeMap<ClimateMode, &ClimateIndex> = BTreeMap::new();
    for index in indices.values() {
        let Some(mode) = index.mode else {
            continue;
        };
        let replace = dominant
            .get(&mode)
            .map_or(true, |current| index.value.abs() > current.value.abs());
        if replace {
            dominant.insert(mode, index);
        }
    }
    dominant
}

pub fn active_modes(indices: &BTreeMap<String, ClimateIndex>) -> Vec<ActiveMode> {
    dominant_by_mode(indices)
        .into_iter()
        .filter(|(_, index)| index.phase != Phase::Neutral)
        .map(|(mode, index)| ActiveMode {
            mode,
            index_name: index.name.clone(),
            value: index.value,
            phase: index.phase,
            strength: index.strength,
        })
        .collect()
}

/// Human-readable ENSO summary such as `"El Niño (strong)"`.
pub fn enso_status(indices: &BTreeMap<String, ClimateIndex>) -> String {
    match dominant_by_mode(indices).get(&ClimateMode::Enso) {
        None => "Unknown".to_string(),
        Some(index) => match index.phase {
            Phase::Positive => format!("El Niño ({})", index.strength.as_str()),
            Phase::Negative => format!("La Niña ({})", index.strength.as_str()),
            Phase::Neutral => "Neutral".to_string(),
        },
    }
}

/// Keys readings by their normalized index name.
pub fn index_map(
    readings: impl IntoIterator<Item = ClimateIndex>,
) -> BTreeMap<String, ClimateIndex> {
    readings
        .into_iter()
        .map(|index| (index.name.clone(), index))
        .collect()
}
