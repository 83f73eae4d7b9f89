use std::{fs, sync::Arc};

use cascade_core::{
    Catalog, CatalogError, CascadeEngine, DriverCatalog, EngineConfig, RegionTable,
    TeleconnectionMatrix,
};

const CHAIN_CATALOG: &str = r#"{
  "version": 1,
  "drivers": [
    {
      "id": "dam_breach",
      "name": "Dam breach",
      "category": "anthropogenic",
      "magnitude_unit": "percent",
      "warning_threshold": 10,
      "critical_threshold": 50,
      "effects": [
        {
          "id": "flash_flood",
          "name": "Flash flood",
          "hazard": "flood",
          "probability": 0.8,
          "delay": { "min": 1, "max": 6, "unit": "hours" },
          "regions": ["central_north_america"],
          "mechanism": "Reservoir release overtops the downstream channel."
        }
      ]
    }
  ],
  "cross_links": [
    {
      "source": "flash_flood",
      "target": "debris_flow",
      "name": "Debris flow",
      "hazard": "landslide",
      "probability": 0.25,
      "delay": { "min": 0, "max": 2, "unit": "days" },
      "mechanism": "Saturated banks fail under the flood wave."
    }
  ]
}"#;

fn chain_engine() -> CascadeEngine {
    let drivers = DriverCatalog::from_json_str(CHAIN_CATALOG).expect("chain catalog is valid");
    let catalog = Catalog {
        drivers: Arc::new(drivers),
        teleconnections: TeleconnectionMatrix::builtin(),
        regions: RegionTable::builtin(),
    };
    CascadeEngine::new(catalog, EngineConfig::builtin())
}

#[test]
fn alternate_catalog_drives_the_engine() {
    let engine = chain_engine();
    let effects = engine.get_all_effects("dam_breach", 4).expect("driver exists");
    let ids: Vec<&str> = effects.iter().map(|e| e.effect_id.as_str()).collect();
    assert_eq!(ids, vec!["flash_flood", "debris_flow"]);
    assert_eq!(effects[1].probability, 0.8 * 0.25);
    assert_eq!(effects[1].path, vec!["dam_breach", "flash_flood", "debris_flow"]);
    // Links without regions inherit the parent's.
    assert_eq!(effects[1].regions, effects[0].regions);
}

#[test]
fn causes_walk_back_to_the_driver() {
    let engine = chain_engine();
    let report = engine.get_all_causes("debris_flow", 4).expect("effect exists");
    assert_eq!(report.paths.len(), 1);
    let path = &report.paths[0];
    assert_eq!(path.driver_id, "dam_breach");
    assert_eq!(path.nodes, vec!["dam_breach", "flash_flood", "debris_flow"]);
    assert_eq!(path.probability, 0.8 * 0.25);
}

#[test]
fn invalid_probability_is_fatal_at_load() {
    let broken = CHAIN_CATALOG.replace("\"probability\": 0.8", "\"probability\": 1.8");
    let err = DriverCatalog::from_json_str(&broken).expect_err("probability above one");
    assert!(matches!(err, CatalogError::OutOfRange { field: "probability", .. }));
}

#[test]
fn dangling_link_is_fatal_at_load() {
    let broken = CHAIN_CATALOG.replace("\"source\": \"flash_flood\"", "\"source\": \"levee_failure\"");
    let err = DriverCatalog::from_json_str(&broken).expect_err("unknown link source");
    assert!(matches!(err, CatalogError::UnknownNode { ref id, .. } if id == "levee_failure"));
}

#[test]
fn unknown_region_tag_fails_to_parse() {
    let broken = CHAIN_CATALOG.replace("central_north_america", "atlantis");
    let err = DriverCatalog::from_json_str(&broken).expect_err("closed region enum");
    assert!(matches!(err, CatalogError::Parse(_)));
}

#[test]
fn catalog_loads_from_file() {
    let path = std::env::temp_dir().join(format!("cascade_catalog_{}.json", std::process::id()));
    fs::write(&path, CHAIN_CATALOG).expect("write temp catalog");
    let loaded = DriverCatalog::from_file(&path).expect("file catalog parses");
    fs::remove_file(&path).ok();
    assert!(loaded.driver("dam_breach").is_some());
    assert_eq!(loaded.effect_name("debris_flow"), Some("Debris flow"));

    let missing = DriverCatalog::from_file(&path).expect_err("file removed");
    assert!(matches!(missing, CatalogError::Read { .. }));
}

const DIAMOND_CATALOG: &str = r#"{
  "version": 1,
  "drivers": [
    {
      "id": "levee_overtopping",
      "name": "Levee overtopping",
      "category": "anthropogenic",
      "magnitude_unit": "percent",
      "warning_threshold": 10,
      "critical_threshold": 50,
      "effects": [
        { "id": "river_flood", "name": "River flood", "probability": 0.6,
          "delay": { "min": 0, "max": 1, "unit": "days" } },
        { "id": "power_outage", "name": "Power outage", "probability": 0.5,
          "delay": { "min": 0, "max": 6, "unit": "hours" } }
      ]
    }
  ],
  "cross_links": [
    { "source": "river_flood", "target": "water_contamination", "name": "Water contamination",
      "probability": 0.5, "delay": { "min": 1, "max": 3, "unit": "days" } },
    { "source": "power_outage", "target": "water_contamination",
      "probability": 0.4, "delay": { "min": 0, "max": 2, "unit": "days" } }
  ]
}"#;

#[test]
fn converging_paths_yield_one_prediction_each() {
    let drivers = DriverCatalog::from_json_str(DIAMOND_CATALOG).expect("diamond catalog is valid");
    let catalog = Catalog {
        drivers: Arc::new(drivers),
        teleconnections: TeleconnectionMatrix::builtin(),
        regions: RegionTable::builtin(),
    };
    let engine = CascadeEngine::new(catalog, EngineConfig::builtin());
    let effects = engine
        .get_all_effects("levee_overtopping", 4)
        .expect("driver exists");

    let contamination: Vec<_> = effects
        .iter()
        .filter(|e| e.effect_id == "water_contamination")
        .collect();
    assert_eq!(contamination.len(), 2);
    assert_eq!(
        contamination[0].path,
        vec!["levee_overtopping", "river_flood", "water_contamination"]
    );
    assert_eq!(contamination[0].probability, 0.6 * 0.5);
    assert_eq!(
        contamination[1].path,
        vec!["levee_overtopping", "power_outage", "water_contamination"]
    );
    assert_eq!(contamination[1].probability, 0.5 * 0.4);
    assert!(contamination[0].probability > contamination[1].probability);
    assert_ne!(contamination[0].id, contamination[1].id);
}
