//! Build a topology from GeoJSON polygons.

use geojson::{Feature, GeoJson, Geometry, Value};
use glam::DVec2;
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeMap;

use super::{Inset, MapTopology, RegionShape, XY};
use crate::error::{MapError, Result};
use crate::geo::LatLng;
use crate::map::projection::{Projection, ProjectionKind};
use crate::path::{self, BBox};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub projection: Projection,
    /// Canvas width; the height follows the projected aspect ratio.
    pub width: f64,
    /// Property holding the region code. Falls back to the feature id, then
    /// to the feature's position in the collection.
    pub id_property: Option<String>,
    pub name_property: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            projection: Projection::new(ProjectionKind::Miller, 0.0),
            width: 900.0,
            id_property: None,
            name_property: String::from("name"),
        }
    }
}

struct Projected {
    id: String,
    name: String,
    rings: Vec<Vec<DVec2>>,
}

pub fn import(geojson: &GeoJson, options: &ImportOptions) -> Result<MapTopology> {
    let features: Vec<&Feature> = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features.iter().collect(),
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => {
            return Err(MapError::Topology(String::from("expected features, got a bare geometry")));
        }
    };

    let projected: Vec<Projected> = features
        .par_iter()
        .enumerate()
        .filter_map(|(index, feature)| project_feature(feature, index, options))
        .collect();

    let bbox = projected
        .iter()
        .filter_map(|f| path::bbox(&f.rings))
        .reduce(|a, b| a.union(&b))
        .filter(|b| b.width > 0.0 && b.height > 0.0)
        .ok_or_else(|| MapError::Topology(String::from("no polygon features to import")))?;

    let scale = options.width / bbox.width;
    let height = bbox.height * scale;
    let origin = DVec2::new(bbox.x, bbox.y);

    let paths: BTreeMap<String, RegionShape> = projected
        .into_iter()
        .map(|f| {
            let rings: Vec<Vec<DVec2>> = f
                .rings
                .iter()
                .map(|ring| ring.iter().map(|&p| (p - origin) * scale).collect())
                .collect();
            (f.id, RegionShape { path: path::polygon(&rings), name: f.name })
        })
        .collect();

    let topology = MapTopology {
        width: options.width,
        height,
        paths,
        projection: Some(options.projection),
        insets: vec![inset(bbox, options.width, height)],
    };
    topology.validate()?;
    Ok(topology)
}

fn inset(bbox: BBox, width: f64, height: f64) -> Inset {
    Inset {
        left: 0.0,
        top: 0.0,
        width,
        height,
        bbox: [
            XY { x: bbox.x, y: bbox.y },
            XY { x: bbox.x + bbox.width, y: bbox.y + bbox.height },
        ],
    }
}

fn project_feature(feature: &Feature, index: usize, options: &ImportOptions) -> Option<Projected> {
    let id = options
        .id_property
        .as_deref()
        .and_then(|key| feature.property(key))
        .and_then(property_text)
        .or_else(|| feature.id.as_ref().map(|id| match id {
            geojson::feature::Id::String(s) => s.clone(),
            geojson::feature::Id::Number(n) => n.to_string(),
        }))
        .unwrap_or_else(|| index.to_string());
    let name = feature
        .property(&options.name_property)
        .and_then(property_text)
        .unwrap_or_else(|| id.clone());

    let mut rings = Vec::new();
    if let Some(geometry) = &feature.geometry {
        collect_rings(geometry, &options.projection, &mut rings);
    }
    if rings.is_empty() {
        debug!("feature `{id}` has no polygon geometry, skipped");
        return None;
    }
    Some(Projected { id, name, rings })
}

fn property_text(value: &geojson::JsonValue) -> Option<String> {
    match value {
        geojson::JsonValue::String(s) => Some(s.clone()),
        geojson::JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn collect_rings(geometry: &Geometry, projection: &Projection, rings: &mut Vec<Vec<DVec2>>) {
    let project = |ring: &Vec<Vec<f64>>| -> Vec<DVec2> {
        ring.iter()
            .filter(|c| c.len() >= 2)
            .map(|c| projection.to_plane(LatLng::new(c[1], c[0])))
            .collect()
    };
    match &geometry.value {
        Value::Polygon(polygon) => rings.extend(polygon.iter().map(project)),
        Value::MultiPolygon(polygons) => {
            for polygon in polygons {
                rings.extend(polygon.iter().map(project));
            }
        }
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                collect_rings(g, projection, rings);
            }
        }
        _ => {}
    }
}
