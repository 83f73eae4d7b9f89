//! Builds a `WorldState` from the current observation snapshot.
//!
//! The scan is a pure computation over its inputs. Callers hand it a
//! snapshot and the recent ledger entries; nothing here locks or blocks.

use std::collections::{BTreeMap, BTreeSet};

use cascade_schema::{
    AlertCounters, AnomalyReport, DistributionSummary, PredictedEffect, RegionTag, WorldState,
};
use chrono::{DateTime, Utc};

use crate::{
    cancellation::CancellationToken,
    catalog::DriverCatalog,
    climate::enso_status,
    engine_config::EngineConfig,
    events::LedgerEntry,
    graph::CausalGraph,
    monte_carlo::{simulate, SimulationRequest},
    observations::ObservationSnapshot,
    propagation::{propagate, sort_predictions},
};

/// Ledger state copied out for one scan.
#[derive(Debug, Clone, Default)]
pub struct LedgerView {
    pub recent: Vec<LedgerEntry>,
    pub counters: AlertCounters,
}

#[derive(Clone, Copy)]
pub struct Scanner<'a> {
    pub catalog: &'a DriverCatalog,
    pub graph: &'a CausalGraph,
    pub config: &'a EngineConfig,
}

impl Scanner<'_> {
    pub fn scan(
        &self,
        snapshot: &ObservationSnapshot,
        ledger: LedgerView,
        now: DateTime<Utc>,
        token: &CancellationToken,
    ) -> WorldState {
        let settings = &self.config.scanner;
        let mut anomalies = Vec::new();
        let mut predictions = Vec::new();

        for (node_id, node) in &snapshot.nodes {
            if !node.is_anomalous() {
                continue;
            }
            let (Some(current), Some(deviation)) = (node.current, node.deviation()) else {
                continue;
            };
            let Some(driver) = self.catalog.driver(node_id) else {
                tracing::warn!(
                    target: "hazard_cascade::scanner",
                    node = %node_id,
                    "scan.skipped=unknown_driver"
                );
                continue;
            };

            let request = SimulationRequest::new(node_id.clone(), settings.trials);
            let summary = match simulate(self.graph, &request, &self.config.simulation, token) {
                Ok(summary) => summary,
                Err(err) => {
                    tracing::warn!(
                        target: "hazard_cascade::scanner",
                        node = %node_id,
                        error = %err,
                        "scan.simulation_failed"
                    );
                    continue;
                }
            };
            let significant: Vec<_> = summary
                .significant(settings.significance_floor)
                .into_iter()
                .cloned()
                .collect();

            predictions.extend(self.significant_predictions(node_id, &significant));
            anomalies.push(AnomalyReport {
                driver_id: driver.id.clone(),
                driver_name: driver.name.clone(),
                category: driver.category,
                current_value: current,
                baseline: node.baseline,
                deviation,
                threshold: node.anomaly_threshold,
                severity: driver.severity_for(current),
                observed_at: node.updated_at,
                significant_effects: significant,
                trials: summary.trials_completed,
                truncated: summary.truncated,
            });
        }

        let mut seen: BTreeSet<String> = predictions.iter().map(|p| p.id.clone()).collect();
        for entry in ledger.recent {
            for prediction in entry.predictions {
                if seen.insert(prediction.id.clone()) {
                    predictions.push(prediction);
                }
            }
        }
        sort_predictions(&mut predictions);

        let state = WorldState {
            timestamp: now,
            climate_modes: snapshot.climate.clone(),
            enso_status: enso_status(&snapshot.climate),
            alerts_by_region: alerts_by_region(&predictions),
            anomalies,
            predictions,
            counters: ledger.counters,
            hash: 0,
        }
        .finalize();

        tracing::info!(
            target: "hazard_cascade::scanner",
            anomalies = state.anomalies.len(),
            predictions = state.predictions.len(),
            version = snapshot.version,
            hash = state.hash,
            "scan.completed"
        );
        state
    }

    /// Deterministic predictions for the effects the simulation found
    /// significant, strongest path per effect.
    fn significant_predictions(
        &self,
        driver_id: &str,
        significant: &[DistributionSummary],
    ) -> Vec<PredictedEffect> {
        if significant.is_empty() {
            return Vec::new();
        }
        let wanted: BTreeSet<&str> = significant.iter().map(|s| s.effect_id.as_str()).collect();
        let propagation = match propagate(
            self.graph,
            driver_id,
            self.config.propagation.default_max_depth,
            &self.config.propagation,
            None,
        ) {
            Ok(propagation) => propagation,
            Err(_) => return Vec::new(),
        };
        let mut taken = BTreeSet::new();
        propagation
            .predictions
            .into_iter()
            .filter(|p| wanted.contains(p.effect_id.as_str()) && taken.insert(p.effect_id.clone()))
            .map(|mut p| {
                p.id = format!("scan:{}", p.id);
                p
            })
            .collect()
    }
}

/// Alert types (hazard, or effect id when unmapped) per region.
fn alerts_by_region(predictions: &[PredictedEffect]) -> BTreeMap<RegionTag, Vec<String>> {
    let mut grouped: BTreeMap<RegionTag, BTreeSet<String>> = BTreeMap::new();
    for prediction in predictions {
        let alert = prediction
            .hazard
            .map(|hazard| hazard.as_str().to_string())
            .unwrap_or_else(|| prediction.effect_id.clone());
        for region in &prediction.regions {
            grouped.entry(*region).or_default().insert(alert.clone());
        }
    }
    grouped
        .into_iter()
        .map(|(region, alerts)| (region, alerts.into_iter().collect()))
        .collect()
}
