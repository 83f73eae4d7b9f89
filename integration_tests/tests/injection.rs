mod common;

use std::collections::BTreeMap;

use cascade_core::DriverCatalog;
use cascade_schema::{EffectStatus, Magnitude, Severity};

fn edge_probabilities(catalog: &DriverCatalog) -> BTreeMap<(String, String), f64> {
    let mut edges = BTreeMap::new();
    for driver in &catalog.drivers {
        for effect in &driver.effects {
            edges.insert((driver.id.clone(), effect.id.clone()), effect.probability);
        }
    }
    for link in &catalog.cross_links {
        edges.insert((link.source.clone(), link.target.clone()), link.probability);
    }
    edges
}

#[test]
fn prediction_probability_is_the_path_product() -> anyhow::Result<()> {
    let engine = common::engine();
    let edges = edge_probabilities(engine.catalog());
    for driver in ["volcanic_eruption", "el_nino_onset", "heat_dome", "solar_storm"] {
        for prediction in engine.get_all_effects(driver, 5)? {
            let product = prediction
                .path
                .windows(2)
                .map(|pair| edges[&(pair[0].clone(), pair[1].clone())])
                .fold(1.0, |acc, p| acc * p);
            assert_eq!(prediction.probability, product, "{}", prediction.id);
            assert_eq!(prediction.depth as usize, prediction.path.len() - 1);
            assert!(prediction.depth <= 5);
        }
    }
    Ok(())
}

#[test]
fn injected_predictions_are_tagged_with_the_event() -> anyhow::Result<()> {
    let engine = common::engine();
    let (event, predictions) = engine.inject_event(
        "solar_storm",
        Magnitude::KpIndex(9.0),
        common::location(64.8, -147.7),
        None,
    )?;
    assert_eq!(event.severity, Severity::Critical);
    assert!(!event.processed);
    assert_eq!(event.triggered_effects.len(), predictions.len());
    for prediction in &predictions {
        assert_eq!(prediction.trigger_event_id, Some(event.id));
        assert!(prediction.id.starts_with(&event.id.to_string()));
        assert_eq!(prediction.status, EffectStatus::Predicted);
    }

    assert!(engine.mark_processed(event.id));
    assert!(!engine.mark_processed(event.id));
    Ok(())
}

#[test]
fn caller_severity_overrides_thresholds() -> anyhow::Result<()> {
    let engine = common::engine();
    let (event, _) = engine.inject_event(
        "solar_storm",
        Magnitude::KpIndex(3.0),
        common::location(64.8, -147.7),
        Some(Severity::Warning),
    )?;
    assert_eq!(event.severity, Severity::Warning);
    Ok(())
}

#[test]
fn mismatched_units_and_bad_magnitudes_are_rejected() {
    let engine = common::engine();
    let here = common::location(0.0, 0.0);
    assert!(engine
        .inject_event("solar_storm", Magnitude::MomentMagnitude(7.0), here.clone(), None)
        .is_err());
    assert!(engine
        .inject_event("solar_storm", Magnitude::KpIndex(f64::NAN), here.clone(), None)
        .is_err());
    assert!(engine
        .inject_event("meteor_strike", Magnitude::KpIndex(5.0), here, None)
        .is_err());
    assert_eq!(engine.scan_world_state().counters.total, 0);
}
