mod common;

use std::collections::{BTreeMap, BTreeSet};

use cascade_core::TessellationRequest;
use cascade_schema::{ClimateIndex, EmissionsScenario, GeoPoint, DOMINANT_WATER};
use chrono::Utc;

fn supplied_indices() -> BTreeMap<String, ClimateIndex> {
    common::strong_el_nino()
        .into_iter()
        .map(|index| (index.name.clone(), index))
        .collect()
}

#[test]
fn coastal_grid_is_bounded_and_marks_the_sea() -> anyhow::Result<()> {
    let engine = common::engine();
    let request = TessellationRequest::new(common::SYDNEY, 400.0)
        .with_resolution(4)
        .with_indices(supplied_indices())
        .projected(2080, EmissionsScenario::Ssp585);
    let output = engine.generate_tessellation(&request)?;

    assert!(!output.metadata.truncated);
    assert_eq!(output.metadata.cell_count, output.hexagons.len());
    assert_eq!(output.metadata.year, 2080);
    assert!(output.hexagons.iter().any(|hex| hex.is_water));
    assert!(output.hexagons.iter().any(|hex| !hex.is_water));

    for hex in &output.hexagons {
        assert!(hex
            .hazard_risks
            .values()
            .all(|risk| (0.0..=1.0).contains(risk)));
        assert!((0.0..=1.0).contains(&hex.total_risk));
        if hex.is_water {
            assert_eq!(hex.dominant_hazard, DOMINANT_WATER);
            assert_eq!(hex.total_risk, 0.0);
            assert_eq!(hex.height, 0.0);
        }
    }
    Ok(())
}

#[test]
fn collection_mirrors_the_hexagons() -> anyhow::Result<()> {
    let engine = common::engine();
    let request = TessellationRequest::new(common::SYDNEY, 60.0)
        .with_resolution(5)
        .with_indices(supplied_indices());
    let output = engine.generate_tessellation(&request)?;
    assert_eq!(output.collection.features.len(), output.hexagons.len());

    let json = serde_json::to_value(&output.collection)?;
    assert_eq!(json["type"], "FeatureCollection");
    assert_eq!(json["metadata"]["resolution"], 5);

    let features = json["features"].as_array().cloned().unwrap_or_default();
    let ids: BTreeSet<String> = features
        .iter()
        .filter_map(|feature| feature["id"].as_str().map(str::to_string))
        .collect();
    assert_eq!(ids.len(), output.hexagons.len());
    for feature in &features {
        assert_eq!(feature["geometry"]["type"], "Polygon");
        assert!(feature["properties"]["dominant_hazard"].is_string());
        assert!(feature["properties"]["color"].is_string());
    }
    Ok(())
}

#[test]
fn wide_radius_is_capped_at_the_ring_limit() -> anyhow::Result<()> {
    let engine = common::engine();
    let max_rings = engine.config().tessellation.max_rings;
    let request = TessellationRequest::new(common::SYDNEY, 5_000.0).with_resolution(6);
    let output = engine.generate_tessellation(&request)?;
    assert!(output.metadata.truncated);
    assert_eq!(output.metadata.rings, max_rings);
    Ok(())
}

#[test]
fn invalid_requests_are_rejected() {
    let engine = common::engine();
    let pole_plus = TessellationRequest::new(GeoPoint::new(95.0, 0.0), 10.0);
    assert!(engine.generate_tessellation(&pole_plus).is_err());
    let negative = TessellationRequest::new(common::SYDNEY, -1.0);
    assert!(engine.generate_tessellation(&negative).is_err());
}

#[test]
fn fallback_geodata_flags_land_cells() -> anyhow::Result<()> {
    let engine = common::engine();
    engine.update_climate_indices(vec![ClimateIndex::new("ONI", -1.5, "test", Utc::now())]);
    let request = TessellationRequest::new(common::SYDNEY, 10.0)
        .with_resolution(6)
        .with_indices(supplied_indices());
    let output = engine.generate_tessellation(&request)?;
    // Fallback geodata still flags the cells even with fresh indices.
    assert!(output
        .hexagons
        .iter()
        .filter(|hex| !hex.is_water)
        .all(|hex| hex.low_confidence));
    assert!(output.metadata.low_confidence);
    Ok(())
}
