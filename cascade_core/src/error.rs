use cascade_schema::MagnitudeUnit;
use thiserror::Error;

/// Failures surfaced by engine operations. Traversal caps and cancellation
/// are not errors; they come back as `truncated` results.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("unknown {kind} `{id}`")]
    NotFound { kind: &'static str, id: String },
    #[error("driver {driver} expects magnitude unit {expected:?}, got {actual:?}")]
    UnitMismatch {
        driver: String,
        expected: MagnitudeUnit,
        actual: MagnitudeUnit,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    pub fn driver_not_found(id: &str) -> Self {
        EngineError::NotFound {
            kind: "driver",
            id: id.to_string(),
        }
    }

    pub fn node_not_found(id: &str) -> Self {
        EngineError::NotFound {
            kind: "node",
            id: id.to_string(),
        }
    }
}
