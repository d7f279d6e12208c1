//! Map topologies and the process-wide registry they are looked up in.

pub mod geojson;

use glam::DVec2;
use log::info;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use crate::error::{MapError, Result};
use crate::map::projection::Projection;

/// One region's outline and display name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionShape {
    pub path: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct XY {
    pub x: f64,
    pub y: f64,
}

impl From<XY> for DVec2 {
    fn from(p: XY) -> Self {
        DVec2::new(p.x, p.y)
    }
}

/// A rectangle of the canvas showing one projected area. `bbox` holds the
/// projected top-left and bottom-right corners drawn into it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Inset {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub bbox: [XY; 2],
}

impl Inset {
    fn plane_min(&self) -> DVec2 {
        self.bbox[0].into()
    }

    fn plane_size(&self) -> DVec2 {
        DVec2::from(self.bbox[1]) - self.plane_min()
    }

    /// Strictly inside the projected bbox.
    pub fn contains_plane(&self, p: DVec2) -> bool {
        let (lo, hi): (DVec2, DVec2) = (self.bbox[0].into(), self.bbox[1].into());
        p.x > lo.x && p.x < hi.x && p.y > lo.y && p.y < hi.y
    }

    pub fn contains_canvas(&self, p: DVec2) -> bool {
        p.x > self.left && p.x < self.left + self.width && p.y > self.top && p.y < self.top + self.height
    }

    /// Projected point to canvas units.
    pub fn plane_to_canvas(&self, p: DVec2) -> DVec2 {
        let ratio = DVec2::new(self.width, self.height) / self.plane_size();
        DVec2::new(self.left, self.top) + (p - self.plane_min()) * ratio
    }

    pub fn canvas_to_plane(&self, p: DVec2) -> DVec2 {
        let ratio = self.plane_size() / DVec2::new(self.width, self.height);
        self.plane_min() + (p - DVec2::new(self.left, self.top)) * ratio
    }
}

/// Region outlines on a base canvas, plus how geographic points land on it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapTopology {
    pub width: f64,
    pub height: f64,
    pub paths: BTreeMap<String, RegionShape>,
    #[serde(default)]
    pub projection: Option<Projection>,
    #[serde(default)]
    pub insets: Vec<Inset>,
}

impl MapTopology {
    /// Parse a topology document.
    pub fn from_json(bytes: &mut [u8]) -> Result<Self> {
        let topology: MapTopology = simd_json::serde::from_slice(bytes)?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(MapError::Topology(format!(
                "canvas must have a positive size, got {}x{}",
                self.width, self.height
            )));
        }
        if let Some(inset) = self.insets.iter().find(|i| {
            let size = i.plane_size();
            !(size.x > 0.0 && size.y > 0.0 && i.width > 0.0 && i.height > 0.0)
        }) {
            return Err(MapError::Topology(format!("degenerate inset at ({}, {})", inset.left, inset.top)));
        }
        Ok(())
    }

    /// Insets, or a single one covering the whole canvas with canvas units
    /// as projected units when the document lists none.
    pub fn insets(&self) -> Vec<Inset> {
        if !self.insets.is_empty() {
            return self.insets.clone();
        }
        vec![Inset {
            left: 0.0,
            top: 0.0,
            width: self.width,
            height: self.height,
            bbox: [XY { x: 0.0, y: 0.0 }, XY { x: self.width, y: self.height }],
        }]
    }
}

static REGISTRY: LazyLock<RwLock<HashMap<String, Arc<MapTopology>>>> = LazyLock::new(Default::default);

/// Register a topology under `name`; the last registration wins.
pub fn register_map(name: &str, topology: MapTopology) -> Arc<MapTopology> {
    let topology = Arc::new(topology);
    let previous = REGISTRY.write().insert(name.to_string(), Arc::clone(&topology));
    if previous.is_some() {
        info!("replaced map `{name}` ({} regions)", topology.paths.len());
    } else {
        info!("registered map `{name}` ({} regions)", topology.paths.len());
    }
    topology
}

pub fn lookup(name: &str) -> Result<Arc<MapTopology>> {
    REGISTRY.read().get(name).cloned().ok_or_else(|| MapError::UnknownMap(name.to_string()))
}

pub fn is_registered(name: &str) -> bool {
    REGISTRY.read().contains_key(name)
}
