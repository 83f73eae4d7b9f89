//! Latest driver observations and climate indices.
//!
//! Readers take an `Arc` of the current snapshot and never block writers for
//! longer than a pointer swap. All writes go through one path that copies the
//! snapshot, applies the batch and swaps the result in.

use std::{
    collections::BTreeMap,
    sync::Arc,
    thread::{self, JoinHandle},
};

use cascade_schema::ClimateIndex;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Mutex, RwLock};

use crate::catalog::DriverCatalog;

/// Observed state of one monitored driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CausalNode {
    pub current: Option<f64>,
    pub baseline: f64,
    pub anomaly_threshold: f64,
    pub confidence: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CausalNode {
    pub fn deviation(&self) -> Option<f64> {
        self.current.map(|value| value - self.baseline)
    }

    pub fn is_anomalous(&self) -> bool {
        self.deviation()
            .map_or(false, |deviation| deviation.abs() > self.anomaly_threshold)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationSnapshot {
    pub nodes: BTreeMap<String, CausalNode>,
    pub climate: BTreeMap<String, ClimateIndex>,
    pub climate_updated_at: Option<DateTime<Utc>>,
    /// Incremented on every applied batch.
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationUpdate {
    pub node_id: String,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl ObservationUpdate {
    pub fn new(node_id: impl Into<String>, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.into(),
            value,
            observed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObservationBatch {
    Nodes(Vec<ObservationUpdate>),
    Climate(Vec<ClimateIndex>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub rejected: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ObservationStore {
    current: RwLock<Arc<ObservationSnapshot>>,
    writer: Mutex<()>,
}

impl ObservationStore {
    /// One node per driver that declares a monitoring baseline.
    pub fn from_catalog(catalog: &DriverCatalog) -> Self {
        let nodes = catalog
            .drivers
            .iter()
            .filter_map(|driver| {
                let monitoring = driver.monitoring.as_ref()?;
                Some((
                    driver.id.clone(),
                    CausalNode {
                        current: None,
                        baseline: monitoring.baseline,
                        anomaly_threshold: monitoring.anomaly_threshold,
                        confidence: monitoring.confidence,
                        updated_at: None,
                    },
                ))
            })
            .collect();
        Self {
            current: RwLock::new(Arc::new(ObservationSnapshot {
                nodes,
                ..ObservationSnapshot::default()
            })),
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<ObservationSnapshot> {
        self.current.read().clone()
    }

    pub fn apply(&self, batch: ObservationBatch) -> ApplyReport {
        let _writer = self.writer.lock();
        let mut next = (*self.snapshot()).clone();
        let report = match batch {
            ObservationBatch::Nodes(updates) => apply_nodes(&mut next, updates),
            ObservationBatch::Climate(readings) => apply_climate(&mut next, readings),
        };
        if report.applied > 0 {
            next.version += 1;
            *self.current.write() = Arc::new(next);
        }
        report
    }

    pub fn record_observations(&self, updates: Vec<ObservationUpdate>) -> ApplyReport {
        self.apply(ObservationBatch::Nodes(updates))
    }

    pub fn update_climate_indices(&self, readings: Vec<ClimateIndex>) -> ApplyReport {
        self.apply(ObservationBatch::Climate(readings))
    }
}

fn apply_nodes(
    snapshot: &mut ObservationSnapshot,
    updates: Vec<ObservationUpdate>,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    for update in updates {
        match snapshot.nodes.get_mut(&update.node_id) {
            Some(node) if update.value.is_finite() => {
                node.current = Some(update.value);
                node.updated_at = Some(update.observed_at);
                report.applied += 1;
            }
            Some(_) => {
                tracing::warn!(
                    target: "hazard_cascade::observations",
                    node = %update.node_id,
                    value = update.value,
                    "observation.rejected=non_finite"
                );
                report.rejected.push(update.node_id);
            }
            None => {
                tracing::warn!(
                    target: "hazard_cascade::observations",
                    node = %update.node_id,
                    "observation.rejected=unknown_node"
                );
                report.rejected.push(update.node_id);
            }
        }
    }
    report
}

fn apply_climate(
    snapshot: &mut ObservationSnapshot,
    readings: Vec<ClimateIndex>,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    for reading in readings {
        if !reading.value.is_finite() {
            tracing::warn!(
                target: "hazard_cascade::observations",
                index = %reading.name,
                "climate_index.rejected=non_finite"
            );
            report.rejected.push(reading.name);
            continue;
        }
        let reading = reading.rederived();
        let reading = if reading.trend.is_none() {
            let previous = snapshot.climate.get(&reading.name).map(|prior| prior.value);
            reading.with_trend(previous)
        } else {
            reading
        };
        snapshot.climate_updated_at = Some(
            snapshot
                .climate_updated_at
                .map_or(reading.observed_at, |at| at.max(reading.observed_at)),
        );
        snapshot.climate.insert(reading.name.clone(), reading);
        report.applied += 1;
    }
    report
}

/// Background writer draining observation batches from a channel.
#[derive(Debug)]
pub struct ObservationFeed {
    sender: Sender<ObservationBatch>,
    handle: JoinHandle<()>,
}

impl ObservationFeed {
    pub fn spawn(store: Arc<ObservationStore>) -> Self {
        let (sender, receiver) = unbounded::<ObservationBatch>();
        let handle = thread::spawn(move || {
            while let Ok(batch) = receiver.recv() {
                let report = store.apply(batch);
                tracing::debug!(
                    target: "hazard_cascade::observations",
                    applied = report.applied,
                    rejected = report.rejected.len(),
                    "observation_feed.batch_applied"
                );
            }
            tracing::debug!(
                target: "hazard_cascade::observations",
                "observation_feed.closed"
            );
        });
        Self { sender, handle }
    }

    pub fn sender(&self) -> Sender<ObservationBatch> {
        self.sender.clone()
    }

    /// Drops this feed's sender and waits for the writer to drain. Batches
    /// already queued are applied first; outstanding sender clones keep the
    /// writer alive until they are dropped too.
    pub fn shutdown(self) {
        let ObservationFeed { sender, handle } = self;
        drop(sender);
        if handle.join().is_err() {
            tracing::error!(
                target: "hazard_cascade::observations",
                "observation_feed.writer_panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ObservationStore {
        ObservationStore::from_catalog(&DriverCatalog::builtin())
    }

    #[test]
    fn monitored_drivers_get_nodes() {
        let snapshot = store().snapshot();
        assert!(snapshot.nodes.contains_key("solar_storm"));
        assert!(!snapshot.nodes.contains_key("deforestation_pulse"));
        assert_eq!(snapshot.version, 0);
    }

    #[test]
    fn unknown_nodes_are_rejected_without_touching_snapshot() {
        let store = store();
        let report = store.record_observations(vec![ObservationUpdate::new(
            "sunspot_cycle",
            3.0,
            Utc::now(),
        )]);
        assert_eq!(report.applied, 0);
        assert_eq!(report.rejected, vec!["sunspot_cycle".to_string()]);
        assert_eq!(store.snapshot().version, 0);
    }

    #[test]
    fn readers_keep_their_snapshot_across_writes() {
        let store = store();
        let before = store.snapshot();
        store.record_observations(vec![ObservationUpdate::new("solar_storm", 8.0, Utc::now())]);
        let after = store.snapshot();
        assert_eq!(before.nodes["solar_storm"].current, None);
        assert_eq!(after.nodes["solar_storm"].current, Some(8.0));
        assert!(after.nodes["solar_storm"].is_anomalous());
        assert_eq!(after.version, 1);
    }

    #[test]
    fn climate_updates_carry_trend() {
        let store = store();
        store.update_climate_indices(vec![ClimateIndex::new("ONI", 1.0, "noaa", Utc::now())]);
        store.update_climate_indices(vec![ClimateIndex::new("ONI", 1.6, "noaa", Utc::now())]);
        let snapshot = store.snapshot();
        let trend = snapshot.climate["ONI"].trend.expect("trend");
        assert!((trend - 0.6).abs() < 1e-9);
        assert!(snapshot.climate_updated_at.is_some());
    }

    #[test]
    fn edited_readings_are_stored_with_fresh_phase() {
        let store = store();
        let mut reading = ClimateIndex::new("oni", 0.0, "noaa", Utc::now());
        reading.value = 1.8;
        store.update_climate_indices(vec![reading]);
        let snapshot = store.snapshot();
        let stored = &snapshot.climate["ONI"];
        assert_eq!(stored.value, 1.8);
        assert_eq!(stored.phase, cascade_schema::Phase::Positive);
        assert_eq!(stored.strength, cascade_schema::Strength::Strong);
    }

    #[test]
    fn feed_applies_batches_before_shutdown() {
        let store = Arc::new(store());
        let feed = ObservationFeed::spawn(Arc::clone(&store));
        let sender = feed.sender();
        sender
            .send(ObservationBatch::Nodes(vec![ObservationUpdate::new(
                "earthquake",
                7.4,
                Utc::now(),
            )]))
            .expect("feed open");
        sender
            .send(ObservationBatch::Climate(vec![ClimateIndex::new(
                "DMI",
                0.9,
                "bom",
                Utc::now(),
            )]))
            .expect("feed open");
        drop(sender);
        feed.shutdown();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.nodes["earthquake"].current, Some(7.4));
        assert!(snapshot.climate.contains_key("DMI"));
        assert_eq!(snapshot.version, 2);
    }
}
