//! The service object callers hold.
//!
//! `CascadeEngine` is built once from a catalog and config and shared behind
//! an `Arc`. Everything it owns is read-only except the observation store and
//! the event ledger, which guard their own state.

use std::sync::Arc;

use cascade_schema::{
    ActiveEvent, CauseReport, ClimateIndex, EventLocation, Magnitude, PredictedEffect, Severity,
    SimulationSummary, WorldState,
};
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    cancellation::CancellationToken,
    catalog::{load_catalog_from_env, Catalog, DriverCatalog, RegionClassifier},
    engine_config::{load_engine_config_from_env, EngineConfig},
    error::EngineError,
    events::{EventInjection, EventLedger, LedgerEntry},
    graph::CausalGraph,
    monte_carlo::{simulate, SimulationRequest},
    observations::{ApplyReport, ObservationFeed, ObservationStore, ObservationUpdate},
    propagation::{self, propagate},
    scanner::{LedgerView, Scanner},
    tessellation::{TessellationOutput, TessellationRequest, Tessellator},
    vulnerability::{GeodataProvider, NoGeodata},
};

pub struct CascadeEngine {
    catalog: Catalog,
    graph: Arc<CausalGraph>,
    config: Arc<EngineConfig>,
    classifier: Arc<dyn RegionClassifier>,
    geodata: Arc<dyn GeodataProvider>,
    observations: Arc<ObservationStore>,
    ledger: Mutex<EventLedger>,
}

impl CascadeEngine {
    pub fn new(catalog: Catalog, config: Arc<EngineConfig>) -> Self {
        let graph = Arc::new(CausalGraph::from_catalog(&catalog.drivers));
        let observations = Arc::new(ObservationStore::from_catalog(&catalog.drivers));
        let ledger = Mutex::new(EventLedger::with_capacity(config.ledger.capacity));
        tracing::info!(
            target: "hazard_cascade::engine",
            drivers = catalog.drivers.drivers.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "engine.ready"
        );
        Self {
            classifier: catalog.regions.clone(),
            catalog,
            graph,
            config,
            geodata: Arc::new(NoGeodata),
            observations,
            ledger,
        }
    }

    pub fn builtin() -> Self {
        Self::new(Catalog::builtin(), EngineConfig::builtin())
    }

    /// Tables and config from the `CASCADE_*_PATH` overrides, built-ins
    /// otherwise.
    pub fn from_env() -> Self {
        let (catalog, _) = load_catalog_from_env();
        let (config, _) = load_engine_config_from_env();
        Self::new(catalog, config)
    }

    pub fn with_geodata(mut self, geodata: Arc<dyn GeodataProvider>) -> Self {
        self.geodata = geodata;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn RegionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn catalog(&self) -> &DriverCatalog {
        &self.catalog.drivers
    }

    pub fn graph(&self) -> &CausalGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &dyn RegionClassifier {
        self.classifier.as_ref()
    }

    pub fn observations(&self) -> &Arc<ObservationStore> {
        &self.observations
    }

    /// Records an event and its propagated cascade. Predictions depend only
    /// on the driver; the event contributes its id and nothing else.
    pub fn inject_event(
        &self,
        driver_id: &str,
        magnitude: Magnitude,
        location: EventLocation,
        severity: Option<Severity>,
    ) -> Result<(ActiveEvent, Vec<PredictedEffect>), EngineError> {
        let mut injection = EventInjection::new(driver_id, magnitude, location);
        injection.severity = severity;
        self.inject(injection)
    }

    pub fn inject(
        &self,
        injection: EventInjection,
    ) -> Result<(ActiveEvent, Vec<PredictedEffect>), EngineError> {
        let driver = self
            .catalog
            .drivers
            .driver(&injection.driver_id)
            .ok_or_else(|| EngineError::driver_not_found(&injection.driver_id))?;
        let actual = injection.magnitude.unit();
        if actual != driver.magnitude_unit {
            return Err(EngineError::UnitMismatch {
                driver: driver.id.clone(),
                expected: driver.magnitude_unit,
                actual,
            });
        }
        let value = injection.magnitude.value();
        if !value.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "magnitude {value} for {} is not finite",
                driver.id
            )));
        }

        let propagation = propagate(
            &self.graph,
            &driver.id,
            self.config.propagation.default_max_depth,
            &self.config.propagation,
            None,
        )?;
        let event_id = Uuid::new_v4();
        let predictions: Vec<PredictedEffect> = propagation
            .predictions
            .into_iter()
            .map(|mut prediction| {
                prediction.id = format!("{event_id}:{}", prediction.id);
                prediction.trigger_event_id = Some(event_id);
                prediction
            })
            .collect();

        let event = ActiveEvent {
            id: event_id,
            driver_id: driver.id.clone(),
            timestamp: injection.timestamp.unwrap_or_else(Utc::now),
            severity: injection
                .severity
                .unwrap_or_else(|| driver.severity_for(value)),
            magnitude: injection.magnitude,
            location: injection.location,
            triggered_effects: predictions.iter().map(|p| p.id.clone()).collect(),
            processed: false,
        };

        tracing::info!(
            target: "hazard_cascade::events",
            event = %event.id,
            driver = %event.driver_id,
            severity = ?event.severity,
            predictions = predictions.len(),
            truncated = propagation.truncated,
            "event.injected"
        );

        self.ledger.lock().record(LedgerEntry {
            event: event.clone(),
            predictions: predictions.clone(),
        });
        Ok((event, predictions))
    }

    pub fn mark_processed(&self, event_id: Uuid) -> bool {
        self.ledger.lock().mark_processed(event_id)
    }

    pub fn simulate_cascade(
        &self,
        driver_id: &str,
        trials: u64,
    ) -> Result<SimulationSummary, EngineError> {
        self.simulate_cascade_with(
            &SimulationRequest::new(driver_id, trials),
            &CancellationToken::new(),
        )
    }

    pub fn simulate_cascade_with(
        &self,
        request: &SimulationRequest,
        token: &CancellationToken,
    ) -> Result<SimulationSummary, EngineError> {
        if self.catalog.drivers.driver(&request.trigger).is_none() {
            return Err(EngineError::driver_not_found(&request.trigger));
        }
        simulate(&self.graph, request, &self.config.simulation, token)
    }

    pub fn get_all_effects(
        &self,
        driver_id: &str,
        max_depth: u32,
    ) -> Result<Vec<PredictedEffect>, EngineError> {
        if self.catalog.drivers.driver(driver_id).is_none() {
            return Err(EngineError::driver_not_found(driver_id));
        }
        propagate(
            &self.graph,
            driver_id,
            max_depth,
            &self.config.propagation,
            None,
        )
        .map(|propagation| propagation.predictions)
    }

    pub fn get_all_causes(&self, effect_id: &str, max_depth: u32) -> Result<CauseReport, EngineError> {
        propagation::get_all_causes(
            &self.graph,
            effect_id,
            max_depth,
            &self.config.propagation,
            None,
        )
    }

    pub fn generate_tessellation(
        &self,
        request: &TessellationRequest,
    ) -> Result<TessellationOutput, EngineError> {
        self.generate_tessellation_with(request, &CancellationToken::new())
    }

    /// Requests without indices use the last readings the store holds and
    /// come back flagged low-confidence.
    pub fn generate_tessellation_with(
        &self,
        request: &TessellationRequest,
        token: &CancellationToken,
    ) -> Result<TessellationOutput, EngineError> {
        let snapshot;
        let (indices, estimated) = match &request.indices {
            Some(indices) => (indices, false),
            None => {
                snapshot = self.observations.snapshot();
                (&snapshot.climate, true)
            }
        };
        let tessellator = Tessellator {
            matrix: &self.catalog.teleconnections,
            classifier: self.classifier.as_ref(),
            geodata: self.geodata.as_ref(),
            config: &self.config,
        };
        tessellator.generate(request, indices, estimated, token)
    }

    pub fn scan_world_state(&self) -> WorldState {
        self.scan_world_state_with(&CancellationToken::new())
    }

    pub fn scan_world_state_with(&self, token: &CancellationToken) -> WorldState {
        let now = Utc::now();
        let window = self.config.scanner.counter_window_hours;
        let ledger = {
            let ledger = self.ledger.lock();
            LedgerView {
                recent: ledger.recent(now, window).cloned().collect(),
                counters: ledger.counters(now, window),
            }
        };
        let scanner = Scanner {
            catalog: &self.catalog.drivers,
            graph: &self.graph,
            config: &self.config,
        };
        scanner.scan(&self.observations.snapshot(), ledger, now, token)
    }

    pub fn update_climate_indices(&self, readings: Vec<ClimateIndex>) -> ApplyReport {
        self.observations.update_climate_indices(readings)
    }

    pub fn record_observations(&self, updates: Vec<ObservationUpdate>) -> ApplyReport {
        self.observations.record_observations(updates)
    }

    /// Background writer for callers that push observations from a feed.
    pub fn observation_feed(&self) -> ObservationFeed {
        ObservationFeed::spawn(Arc::clone(&self.observations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_schema::MagnitudeUnit;

    fn location() -> EventLocation {
        EventLocation {
            lat: -8.34,
            lon: 115.51,
            name: Some("Mount Agung".to_string()),
        }
    }

    #[test]
    fn injection_tags_predictions_with_event() {
        let engine = CascadeEngine::builtin();
        let (event, predictions) = engine
            .inject_event(
                "volcanic_eruption",
                Magnitude::VolcanicExplosivityIndex(5.0),
                location(),
                None,
            )
            .expect("known driver");
        assert!(!predictions.is_empty());
        assert_eq!(event.triggered_effects.len(), predictions.len());
        for prediction in &predictions {
            assert_eq!(prediction.trigger_event_id, Some(event.id));
            assert!(prediction.id.starts_with(&event.id.to_string()));
        }
        assert!(engine.mark_processed(event.id));
    }

    #[test]
    fn mismatched_unit_is_rejected() {
        let engine = CascadeEngine::builtin();
        let err = engine
            .inject_event(
                "volcanic_eruption",
                Magnitude::MomentMagnitude(7.0),
                location(),
                None,
            )
            .expect_err("VEI expected");
        assert_eq!(
            err,
            EngineError::UnitMismatch {
                driver: "volcanic_eruption".to_string(),
                expected: MagnitudeUnit::VolcanicExplosivityIndex,
                actual: MagnitudeUnit::MomentMagnitude,
            }
        );
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let engine = CascadeEngine::builtin();
        assert!(matches!(
            engine.get_all_effects("meteor_strike", 3),
            Err(EngineError::NotFound { kind: "driver", .. })
        ));
        assert!(matches!(
            engine.simulate_cascade("ash_fall", 10),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            engine.get_all_causes("plague_of_frogs", 3),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn injected_events_feed_scan_counters() {
        let engine = CascadeEngine::builtin();
        engine
            .inject_event(
                "earthquake",
                Magnitude::MomentMagnitude(8.1),
                EventLocation {
                    lat: 38.3,
                    lon: 142.4,
                    name: None,
                },
                None,
            )
            .expect("known driver");
        let state = engine.scan_world_state();
        assert_eq!(state.counters.total, 1);
        assert!(!state.predictions.is_empty());
    }
}
