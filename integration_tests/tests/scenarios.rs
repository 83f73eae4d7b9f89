mod common;

use std::sync::Arc;

use anyhow::Context;
use cascade_core::{RegionClassifier, TessellationRequest, UniformGeodata};
use cascade_schema::{HazardType, LandCover, LocalVulnerability, Magnitude, RegionTag, Severity};

#[test]
fn volcanic_eruption_cascades_to_regional_cooling() -> anyhow::Result<()> {
    let engine = common::engine();
    let (event, predictions) = engine.inject_event(
        "volcanic_eruption",
        Magnitude::VolcanicExplosivityIndex(4.0),
        common::location(-8.34, 115.51),
        None,
    )?;
    assert_eq!(event.severity, Severity::Critical);

    let ash = predictions
        .iter()
        .find(|p| p.effect_id == "ash_fall")
        .context("ash fall predicted")?;
    assert_eq!(ash.depth, 1);
    assert!((ash.probability - 0.90).abs() < 1e-12);

    let cooling = predictions
        .iter()
        .find(|p| p.effect_id == "regional_cooling")
        .context("regional cooling predicted")?;
    assert_eq!(cooling.depth, 2);
    assert_eq!(cooling.probability, 0.9 * 0.6);
    assert_eq!(cooling.effect_name, "Regional cooling");
    assert_eq!(
        cooling.path,
        vec!["volcanic_eruption", "ash_fall", "regional_cooling"]
    );
    Ok(())
}

#[test]
fn strong_el_nino_makes_forested_sydney_wildfire_dominant() -> anyhow::Result<()> {
    let forest = LocalVulnerability {
        forest_coverage: 0.8,
        land_cover: LandCover::Forest,
        coastal_distance_km: 60.0,
        ..LocalVulnerability::default()
    };
    let engine = common::engine().with_geodata(Arc::new(UniformGeodata(forest)));
    engine.update_climate_indices(common::strong_el_nino());

    let region = engine
        .classifier()
        .classify(common::SYDNEY.lat, common::SYDNEY.lon);
    assert_eq!(region, RegionTag::EasternAustralia);

    let request = TessellationRequest::new(common::SYDNEY, 10.0).with_resolution(6);
    let output = engine.generate_tessellation(&request)?;
    // No indices on the request: the store's readings stand in.
    assert!(output.metadata.low_confidence);

    let cell = output
        .hexagons
        .iter()
        .find(|hex| hex.region == RegionTag::EasternAustralia && !hex.is_water)
        .context("land cell in eastern Australia")?;
    assert_eq!(cell.dominant_hazard, "wildfire");
    assert!(cell.hazard_risks[&HazardType::Wildfire] > cell.hazard_risks[&HazardType::Drought]);
    Ok(())
}
