//! Hazard cascade engine.
//!
//! Builds a probabilistic causal graph from a validated driver catalog and
//! answers three kinds of question about it: what follows a trigger event
//! ([`propagate`], [`simulate`]), what hazard mix a climate state implies
//! around a point ([`Tessellator`]), and what the observed world currently
//! looks like ([`Scanner`]). [`CascadeEngine`] wires these together behind
//! one shared service object.

pub mod cancellation;
pub mod catalog;
pub mod climate;
mod engine;
pub mod engine_config;
pub mod error;
pub mod events;
pub mod graph;
mod hashing;
pub mod hexgrid;
pub mod monte_carlo;
pub mod observations;
pub mod propagation;
pub mod scanner;
pub mod teleconnection;
pub mod tessellation;
pub mod vulnerability;

pub use cancellation::CancellationToken;
pub use catalog::{
    load_catalog_from_env, Catalog, CatalogError, CatalogSources, DriverCatalog, RegionClassifier,
    RegionTable, TeleconnectionMatrix,
};
pub use engine::CascadeEngine;
pub use engine_config::{load_engine_config_from_env, ConfigSource, EngineConfig, EngineConfigError};
pub use error::EngineError;
pub use events::{EventInjection, EventLedger, LedgerEntry};
pub use graph::CausalGraph;
pub use hexgrid::HexCell;
pub use monte_carlo::{simulate, SimulationRequest};
pub use observations::{
    ApplyReport, ObservationBatch, ObservationFeed, ObservationSnapshot, ObservationStore,
    ObservationUpdate,
};
pub use propagation::{get_all_causes, propagate, Propagation};
pub use scanner::{LedgerView, Scanner};
pub use tessellation::{TessellationOutput, TessellationRequest, Tessellator};
pub use vulnerability::{hazard_multipliers, GeodataProvider, NoGeodata, UniformGeodata};
