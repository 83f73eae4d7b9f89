mod common;

use cascade_core::{ObservationBatch, ObservationUpdate};
use cascade_schema::{ClimateIndex, Severity};
use chrono::Utc;

#[test]
fn fed_observations_surface_in_the_scan() -> anyhow::Result<()> {
    let engine = common::engine();
    let feed = engine.observation_feed();
    let sender = feed.sender();
    sender.send(ObservationBatch::Nodes(vec![ObservationUpdate::new(
        "solar_storm",
        9.0,
        Utc::now(),
    )]))?;
    sender.send(ObservationBatch::Climate(vec![ClimateIndex::new(
        "ONI",
        1.8,
        "feed",
        Utc::now(),
    )]))?;
    drop(sender);
    feed.shutdown();

    let state = engine.scan_world_state();
    assert_eq!(state.anomalies.len(), 1);
    let anomaly = &state.anomalies[0];
    assert_eq!(anomaly.driver_id, "solar_storm");
    assert_eq!(anomaly.severity, Severity::Critical);
    assert_eq!(anomaly.deviation, 7.0);
    assert!(anomaly
        .significant_effects
        .iter()
        .any(|effect| effect.effect_id == "hf_radio_blackout"));
    assert!(state
        .predictions
        .iter()
        .all(|prediction| prediction.trigger_driver_id == "solar_storm"));
    assert!(state.climate_modes.contains_key("ONI"));
    assert_ne!(state.enso_status, "Unknown");
    Ok(())
}

#[test]
fn rejected_updates_leave_the_world_quiet() {
    let engine = common::engine();
    let report = engine.record_observations(vec![
        ObservationUpdate::new("solar_storm", f64::INFINITY, Utc::now()),
        ObservationUpdate::new("sunspot_cycle", 4.0, Utc::now()),
    ]);
    assert_eq!(report.applied, 0);
    assert_eq!(report.rejected.len(), 2);
    assert!(engine.scan_world_state().anomalies.is_empty());
}

#[test]
fn injected_events_count_toward_alerts() -> anyhow::Result<()> {
    let engine = common::engine();
    engine.inject_event(
        "earthquake",
        cascade_schema::Magnitude::MomentMagnitude(8.1),
        common::location(38.3, 142.4),
        None,
    )?;
    let state = engine.scan_world_state();
    assert_eq!(state.counters.total, 1);
    assert_eq!(state.counters.critical, 1);
    assert!(state
        .predictions
        .iter()
        .any(|prediction| prediction.trigger_driver_id == "earthquake"));
    Ok(())
}

#[test]
fn edited_climate_readings_drive_enso_status() {
    let engine = common::engine();
    let mut reading = ClimateIndex::new("ONI", 0.0, "feed", Utc::now());
    reading.value = 1.8;
    engine.update_climate_indices(vec![reading]);
    let state = engine.scan_world_state();
    assert_eq!(state.climate_modes["ONI"].phase, cascade_schema::Phase::Positive);
    assert_eq!(state.enso_status, "El Niño (strong)");
}
