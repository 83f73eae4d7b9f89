#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use cascade_core::CascadeEngine;
use cascade_schema::{ClimateIndex, EventLocation, GeoPoint};
use chrono::Utc;

static INIT: Once = Once::new();

pub const SYDNEY: GeoPoint = GeoPoint {
    lat: -33.87,
    lon: 151.21,
};

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_engine_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test engine config at {}",
            config_path.display()
        );

        std::env::set_var("CASCADE_ENGINE_CONFIG_PATH", &config_path);
    });
}

pub fn engine() -> CascadeEngine {
    ensure_test_config();
    CascadeEngine::from_env()
}

pub fn strong_el_nino() -> Vec<ClimateIndex> {
    vec![ClimateIndex::new("ONI", 1.8, "test", Utc::now())]
}

pub fn location(lat: f64, lon: f64) -> EventLocation {
    EventLocation {
        lat,
        lon,
        name: None,
    }
}
