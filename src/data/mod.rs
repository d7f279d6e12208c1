use anyhow::{Context, Result};
use choropleth::map::{MapConfig, MarkerSet, MarkerSpec};
use choropleth::topology::geojson::{import, ImportOptions};
use choropleth::MapTopology;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use log::{info, warn};
use std::fs;
use std::path::Path;

/// Canvas width of imported and built-in topologies.
const CANVAS_WIDTH: f64 = 900.0;

/// The root topology: `world.json` as a map document, else `world.geojson`
/// imported, else the coarse built-in continents.
pub fn load_world(data_dir: &Path) -> Result<MapTopology> {
    let json = data_dir.join("world.json");
    if json.exists() {
        let mut bytes = fs::read(&json).with_context(|| format!("reading {}", json.display()))?;
        info!("loaded topology from {}", json.display());
        return Ok(MapTopology::from_json(&mut bytes)?);
    }

    let geojson = data_dir.join("world.geojson");
    if geojson.exists() {
        match import_geojson(&geojson) {
            Ok(topology) => return Ok(topology),
            Err(e) => warn!("failed to import {}: {e:#}", geojson.display()),
        }
    }

    builtin_world()
}

fn import_geojson(path: &Path) -> Result<MapTopology> {
    let content = fs::read_to_string(path)?;
    let geojson: GeoJson = content.parse()?;
    let options = ImportOptions { width: CANVAS_WIDTH, ..ImportOptions::default() };
    let topology = import(&geojson, &options)?;
    info!("imported {} regions from {}", topology.paths.len(), path.display());
    Ok(topology)
}

/// `config.json` next to the data, if present.
pub fn load_config(data_dir: &Path) -> Result<Option<MapConfig>> {
    let path = data_dir.join("config.json");
    if !path.exists() {
        return Ok(None);
    }
    let mut bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(Some(MapConfig::from_json(&mut bytes)?))
}

/// Simplified continent outlines as (lon, lat) rings.
const CONTINENTS: &[(&str, &str, &[(f64, f64)])] = &[
    ("NA", "North America", &[
        (-168.0, 65.0), (-166.0, 60.0), (-141.0, 60.0), (-130.0, 55.0),
        (-125.0, 48.0), (-124.0, 40.0), (-117.0, 32.0), (-110.0, 25.0),
        (-97.0, 25.0), (-97.0, 28.0), (-82.0, 24.0), (-80.0, 25.0),
        (-81.0, 31.0), (-75.0, 35.0), (-70.0, 41.0), (-67.0, 45.0),
        (-65.0, 47.0), (-55.0, 47.0), (-52.0, 47.0), (-55.0, 52.0),
        (-58.0, 55.0), (-64.0, 60.0), (-73.0, 62.0), (-80.0, 63.0),
        (-95.0, 62.0), (-110.0, 68.0), (-130.0, 70.0), (-145.0, 70.0),
        (-168.0, 65.0),
    ]),
    ("SA", "South America", &[
        (-80.0, 10.0), (-75.0, 5.0), (-70.0, 5.0), (-60.0, 5.0),
        (-50.0, 0.0), (-35.0, -5.0), (-35.0, -10.0), (-38.0, -15.0),
        (-40.0, -22.0), (-48.0, -25.0), (-55.0, -34.0), (-58.0, -38.0),
        (-65.0, -42.0), (-68.0, -50.0), (-75.0, -52.0), (-75.0, -45.0),
        (-72.0, -40.0), (-72.0, -30.0), (-70.0, -20.0), (-70.0, -15.0),
        (-80.0, -5.0), (-80.0, 0.0), (-80.0, 10.0),
    ]),
    ("EU", "Europe", &[
        (-10.0, 36.0), (-5.0, 36.0), (0.0, 38.0), (5.0, 43.0),
        (10.0, 44.0), (15.0, 45.0), (20.0, 40.0), (25.0, 37.0),
        (30.0, 40.0), (35.0, 42.0), (40.0, 43.0), (40.0, 55.0),
        (30.0, 60.0), (25.0, 65.0), (20.0, 70.0), (10.0, 71.0),
        (5.0, 62.0), (5.0, 58.0), (-5.0, 58.0), (-10.0, 52.0),
        (-5.0, 48.0), (-5.0, 43.0), (-10.0, 36.0),
    ]),
    ("AF", "Africa", &[
        (-17.0, 15.0), (-17.0, 20.0), (-15.0, 28.0), (-5.0, 35.0),
        (10.0, 37.0), (20.0, 33.0), (25.0, 32.0), (35.0, 30.0),
        (35.0, 20.0), (42.0, 12.0), (50.0, 12.0), (45.0, 5.0),
        (35.0, -5.0), (35.0, -20.0), (35.0, -25.0), (30.0, -30.0),
        (20.0, -35.0), (18.0, -35.0), (15.0, -30.0), (10.0, -15.0),
        (10.0, 0.0), (5.0, 5.0), (-5.0, 5.0), (-10.0, 10.0),
        (-17.0, 15.0),
    ]),
    ("AS", "Asia", &[
        (40.0, 43.0), (50.0, 40.0), (55.0, 37.0),
        (60.0, 25.0), (65.0, 25.0), (70.0, 20.0), (75.0, 15.0),
        (80.0, 8.0), (80.0, 15.0), (88.0, 22.0), (92.0, 22.0),
        (95.0, 16.0), (100.0, 14.0), (105.0, 10.0), (110.0, 20.0),
        (115.0, 22.0), (120.0, 22.0), (122.0, 25.0), (125.0, 30.0),
        (130.0, 35.0), (135.0, 35.0), (140.0, 40.0), (145.0, 45.0),
        (145.0, 50.0), (140.0, 55.0), (135.0, 55.0), (130.0, 52.0),
        (130.0, 43.0), (120.0, 40.0), (110.0, 45.0), (90.0, 50.0),
        (70.0, 55.0), (60.0, 55.0), (50.0, 50.0), (40.0, 55.0),
        (40.0, 43.0),
    ]),
    ("OC", "Australia", &[
        (115.0, -20.0), (120.0, -18.0), (130.0, -12.0), (140.0, -12.0),
        (145.0, -15.0), (150.0, -25.0), (153.0, -30.0), (150.0, -35.0),
        (145.0, -38.0), (140.0, -38.0), (135.0, -35.0), (130.0, -32.0),
        (125.0, -32.0), (115.0, -35.0), (115.0, -25.0), (115.0, -20.0),
    ]),
];

/// Coarse continents, one region each, for when no data file is available.
pub fn builtin_world() -> Result<MapTopology> {
    let features = CONTINENTS
        .iter()
        .map(|(code, name, ring)| {
            let mut properties = JsonObject::new();
            properties.insert("code".into(), JsonValue::from(*code));
            properties.insert("name".into(), JsonValue::from(*name));
            let ring = ring.iter().map(|&(lon, lat)| vec![lon, lat]).collect();
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    let collection = GeoJson::FeatureCollection(FeatureCollection { bbox: None, features, foreign_members: None });
    let options = ImportOptions {
        width: CANVAS_WIDTH,
        id_property: Some(String::from("code")),
        ..ImportOptions::default()
    };
    Ok(import(&collection, &options)?)
}

/// Major cities as (lon, lat, name).
const CITIES: &[(f64, f64, &str)] = &[
    (-74.0, 40.7, "New York"),
    (-0.1, 51.5, "London"),
    (2.3, 48.9, "Paris"),
    (139.7, 35.7, "Tokyo"),
    (151.2, -33.9, "Sydney"),
    (-43.2, -22.9, "Rio"),
    (37.6, 55.8, "Moscow"),
    (116.4, 39.9, "Beijing"),
    (77.2, 28.6, "Delhi"),
    (-118.2, 34.0, "Los Angeles"),
    (-77.0, 38.9, "Washington"),
    (-99.1, 19.4, "Mexico City"),
    (-58.4, -34.6, "Buenos Aires"),
];

pub fn cities() -> MarkerSet {
    MarkerSet::from_list(CITIES.iter().map(|&(lon, lat, name)| MarkerSpec::geo(lat, lon).named(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_world_has_every_continent() {
        let topology = builtin_world().unwrap();
        assert_eq!(topology.paths.len(), CONTINENTS.len());
        assert_eq!(topology.paths["EU"].name, "Europe");
        assert_eq!(topology.width, CANVAS_WIDTH);
    }

    #[test]
    fn test_missing_files_fall_back() {
        let dir = Path::new("definitely/not/here");
        assert!(load_config(dir).unwrap().is_none());
        assert_eq!(load_world(dir).unwrap().paths.len(), CONTINENTS.len());
    }
}
