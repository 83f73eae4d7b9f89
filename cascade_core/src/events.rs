use std::collections::VecDeque;

use cascade_schema::{ActiveEvent, AlertCounters, EventLocation, Magnitude, PredictedEffect, Severity};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Caller-supplied description of a trigger event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInjection {
    pub driver_id: String,
    pub magnitude: Magnitude,
    pub location: EventLocation,
    /// Derived from the driver's thresholds when absent.
    pub severity: Option<Severity>,
    /// Defaults to the time of injection.
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventInjection {
    pub fn new(driver_id: impl Into<String>, magnitude: Magnitude, location: EventLocation) -> Self {
        Self {
            driver_id: driver_id.into(),
            magnitude,
            location,
            severity: None,
            timestamp: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub event: ActiveEvent,
    pub predictions: Vec<PredictedEffect>,
}

/// Bounded in-memory history of injected events, oldest evicted first.
#[derive(Debug, Clone)]
pub struct EventLedger {
    entries: VecDeque<LedgerEntry>,
    capacity: usize,
}

impl EventLedger {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&mut self, entry: LedgerEntry) -> Option<LedgerEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            tracing::debug!(
                target: "hazard_cascade::events",
                event = %old.event.id,
                "ledger.evicted"
            );
        }
        self.entries.push_back(entry);
        evicted
    }

    pub fn get(&self, event_id: Uuid) -> Option<&LedgerEntry> {
        self.entries.iter().find(|entry| entry.event.id == event_id)
    }

    /// Returns `false` when the event is unknown or already processed.
    pub fn mark_processed(&mut self, event_id: Uuid) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.event.id == event_id)
        {
            Some(entry) if !entry.event.processed => {
                entry.event.processed = true;
                true
            }
            _ => false,
        }
    }

    pub fn recent(&self, now: DateTime<Utc>, window_hours: u32) -> impl Iterator<Item = &LedgerEntry> {
        let since = now - Duration::hours(i64::from(window_hours));
        self.entries
            .iter()
            .filter(move |entry| entry.event.timestamp >= since && entry.event.timestamp <= now)
    }

    pub fn counters(&self, now: DateTime<Utc>, window_hours: u32) -> AlertCounters {
        let mut counters = AlertCounters {
            window_hours,
            ..AlertCounters::default()
        };
        for entry in self.recent(now, window_hours) {
            counters.total += 1;
            match entry.event.severity {
                Severity::Critical => counters.critical += 1,
                Severity::Warning => counters.warning += 1,
                Severity::Info => {}
            }
        }
        counters
    }
}
