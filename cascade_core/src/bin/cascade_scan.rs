use std::io::{self, BufRead, Write};
use std::thread;

use cascade_core::{CascadeEngine, ObservationUpdate, TessellationRequest};
use cascade_schema::{ClimateIndex, EventLocation, GeoPoint, Magnitude, MagnitudeUnit};
use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug)]
enum Command {
    Observe { node: String, value: f64 },
    Index { name: String, value: f64 },
    Inject { driver: String, magnitude: f64, lat: f64, lon: f64 },
    Effects { driver: String, depth: Option<u32> },
    Causes { effect: String, depth: Option<u32> },
    Simulate { driver: String, trials: Option<u64> },
    Grid { lat: f64, lon: f64, radius_km: f64 },
    Scan,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let engine = CascadeEngine::from_env();
    let commands = spawn_stdin_listener();
    info!(
        target: "hazard_cascade::cli",
        drivers = engine.catalog().drivers.len(),
        "cascade_scan ready"
    );

    while let Ok(command) = commands.recv() {
        handle(&engine, command);
    }
}

fn handle(engine: &CascadeEngine, command: Command) {
    let depth = engine.config().propagation.default_max_depth;
    match command {
        Command::Observe { node, value } => {
            let report = engine.record_observations(vec![ObservationUpdate::new(
                node,
                value,
                Utc::now(),
            )]);
            emit(&report.rejected);
        }
        Command::Index { name, value } => {
            let report = engine
                .update_climate_indices(vec![ClimateIndex::new(name, value, "stdin", Utc::now())]);
            emit(&report.rejected);
        }
        Command::Inject {
            driver,
            magnitude,
            lat,
            lon,
        } => {
            let Some(unit) = engine.catalog().driver(&driver).map(|d| d.magnitude_unit) else {
                warn!(target: "hazard_cascade::cli", %driver, "inject.unknown_driver");
                return;
            };
            let location = EventLocation {
                lat,
                lon,
                name: None,
            };
            match engine.inject_event(&driver, magnitude_in(unit, magnitude), location, None) {
                Ok((event, predictions)) => emit(&(event, predictions)),
                Err(err) => warn!(target: "hazard_cascade::cli", error = %err, "inject.failed"),
            }
        }
        Command::Effects { driver, depth: requested } => {
            match engine.get_all_effects(&driver, requested.unwrap_or(depth)) {
                Ok(effects) => emit(&effects),
                Err(err) => warn!(target: "hazard_cascade::cli", error = %err, "effects.failed"),
            }
        }
        Command::Causes { effect, depth: requested } => {
            match engine.get_all_causes(&effect, requested.unwrap_or(depth)) {
                Ok(report) => emit(&report),
                Err(err) => warn!(target: "hazard_cascade::cli", error = %err, "causes.failed"),
            }
        }
        Command::Simulate { driver, trials } => {
            let trials = trials.unwrap_or(engine.config().simulation.default_trials);
            match engine.simulate_cascade(&driver, trials) {
                Ok(summary) => emit(&summary),
                Err(err) => warn!(target: "hazard_cascade::cli", error = %err, "simulate.failed"),
            }
        }
        Command::Grid {
            lat,
            lon,
            radius_km,
        } => {
            let request = TessellationRequest::new(GeoPoint::new(lat, lon), radius_km);
            match engine.generate_tessellation(&request) {
                Ok(output) => emit(&output.collection),
                Err(err) => warn!(target: "hazard_cascade::cli", error = %err, "grid.failed"),
            }
        }
        Command::Scan => emit(&engine.scan_world_state()),
    }
}

fn magnitude_in(unit: MagnitudeUnit, value: f64) -> Magnitude {
    match unit {
        MagnitudeUnit::MomentMagnitude => Magnitude::MomentMagnitude(value),
        MagnitudeUnit::VolcanicExplosivityIndex => Magnitude::VolcanicExplosivityIndex(value),
        MagnitudeUnit::TemperatureAnomaly => Magnitude::TemperatureAnomaly(value),
        MagnitudeUnit::IndexValue => Magnitude::IndexValue(value),
        MagnitudeUnit::KpIndex => Magnitude::KpIndex(value),
        MagnitudeUnit::Percent => Magnitude::Percent(value),
        MagnitudeUnit::Generic => Magnitude::Generic {
            value,
            unit: "generic".to_string(),
        },
    }
}

fn emit<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => {
            let mut stdout = io::stdout().lock();
            if writeln!(stdout, "{json}").is_err() {
                warn!(target: "hazard_cascade::cli", "stdout closed");
            }
        }
        Err(err) => warn!(target: "hazard_cascade::cli", error = %err, "encode.failed"),
    }
}

fn spawn_stdin_listener() -> Receiver<Command> {
    let (sender, receiver) = unbounded::<Command>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("Command read error: {}", err);
                    break;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "quit" {
                break;
            }
            match parse_command(trimmed) {
                Some(cmd) => {
                    if sender.send(cmd).is_err() {
                        break;
                    }
                }
                None => warn!("Invalid command: {}", trimmed),
            }
        }
    });
    receiver
}

fn parse_command(input: &str) -> Option<Command> {
    let mut parts = input.split_whitespace();
    match parts.next()? {
        "observe" => Some(Command::Observe {
            node: parts.next()?.to_string(),
            value: parts.next()?.parse().ok()?,
        }),
        "index" => Some(Command::Index {
            name: parts.next()?.to_string(),
            value: parts.next()?.parse().ok()?,
        }),
        "inject" => Some(Command::Inject {
            driver: parts.next()?.to_string(),
            magnitude: parts.next()?.parse().ok()?,
            lat: parts.next().unwrap_or("0").parse().ok()?,
            lon: parts.next().unwrap_or("0").parse().ok()?,
        }),
        "effects" => Some(Command::Effects {
            driver: parts.next()?.to_string(),
            depth: parts.next().and_then(|d| d.parse().ok()),
        }),
        "causes" => Some(Command::Causes {
            effect: parts.next()?.to_string(),
            depth: parts.next().and_then(|d| d.parse().ok()),
        }),
        "simulate" => Some(Command::Simulate {
            driver: parts.next()?.to_string(),
            trials: parts.next().and_then(|t| t.parse().ok()),
        }),
        "grid" => Some(Command::Grid {
            lat: parts.next()?.parse().ok()?,
            lon: parts.next()?.parse().ok()?,
            radius_km: parts.next().unwrap_or("50").parse().ok()?,
        }),
        "scan" => Some(Command::Scan),
        _ => None,
    }
}
