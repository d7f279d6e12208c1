//! Construction options of a single map.

use glam::DVec2;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::geo::LatLng;
use crate::series::SeriesConfig;
use crate::style::{Style, StyleSet};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapConfig {
    /// Registry name of the topology.
    pub map: String,
    pub background_color: String,
    pub zoom_buttons: bool,
    pub zoom_on_scroll: bool,
    /// Wheel sensitivity, 1 to 10.
    pub zoom_on_scroll_speed: f64,
    pub pan_on_drag: bool,
    pub zoom_max: f64,
    pub zoom_min: f64,
    pub zoom_step: f64,
    pub zoom_animate: bool,
    pub regions_selectable: bool,
    pub regions_selectable_one: bool,
    pub markers_selectable: bool,
    pub markers_selectable_one: bool,
    /// Overrides deep-merged onto the default styles.
    pub region_style: StyleSet,
    pub region_label_style: StyleSet,
    pub marker_style: StyleSet,
    pub marker_label_style: StyleSet,
    pub markers: MarkerSet,
    pub series: SeriesSet,
    pub focus_on: Option<FocusSpec>,
    pub selected_regions: Option<SelectionSpec>,
    pub selected_markers: Option<SelectionSpec>,
    #[serde(skip)]
    pub labels: Labels,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            map: String::new(),
            background_color: String::from("#505050"),
            zoom_buttons: true,
            zoom_on_scroll: true,
            zoom_on_scroll_speed: 3.0,
            pan_on_drag: true,
            zoom_max: 8.0,
            zoom_min: 1.0,
            zoom_step: 1.6,
            zoom_animate: true,
            regions_selectable: false,
            regions_selectable_one: false,
            markers_selectable: false,
            markers_selectable_one: false,
            region_style: StyleSet::default(),
            region_label_style: StyleSet::default(),
            marker_style: StyleSet::default(),
            marker_label_style: StyleSet::default(),
            markers: MarkerSet::default(),
            series: SeriesSet::default(),
            focus_on: None,
            selected_regions: None,
            selected_markers: None,
            labels: Labels::default(),
        }
    }
}

impl MapConfig {
    pub fn new(map: &str) -> Self {
        Self { map: map.to_string(), ..Self::default() }
    }

    pub fn from_json(bytes: &mut [u8]) -> Result<Self> {
        Ok(simd_json::serde::from_slice(bytes)?)
    }

    pub fn scroll_speed(&self) -> f64 {
        self.zoom_on_scroll_speed.clamp(1.0, 10.0)
    }

    pub fn region_styles(&self) -> StyleSet {
        StyleSet::region_defaults().merged(&self.region_style)
    }

    pub fn region_label_styles(&self) -> StyleSet {
        StyleSet::label_defaults().merged(&self.region_label_style)
    }

    pub fn marker_styles(&self) -> StyleSet {
        StyleSet::marker_defaults().merged(&self.marker_style)
    }

    pub fn marker_label_styles(&self) -> StyleSet {
        StyleSet::label_defaults().merged(&self.marker_label_style)
    }

    /// Styles and behaviour flags only; for maps built in the same look.
    pub fn inherit(&self, map: &str) -> Self {
        Self {
            map: map.to_string(),
            background_color: self.background_color.clone(),
            zoom_buttons: self.zoom_buttons,
            zoom_on_scroll: self.zoom_on_scroll,
            zoom_on_scroll_speed: self.zoom_on_scroll_speed,
            pan_on_drag: self.pan_on_drag,
            zoom_max: self.zoom_max,
            zoom_min: self.zoom_min,
            zoom_step: self.zoom_step,
            zoom_animate: self.zoom_animate,
            regions_selectable: self.regions_selectable,
            regions_selectable_one: self.regions_selectable_one,
            markers_selectable: self.markers_selectable,
            markers_selectable_one: self.markers_selectable_one,
            region_style: self.region_style.clone(),
            region_label_style: self.region_label_style.clone(),
            marker_style: self.marker_style.clone(),
            marker_label_style: self.marker_label_style.clone(),
            labels: self.labels.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeriesSet {
    pub markers: Vec<SeriesConfig>,
    pub regions: Vec<SeriesConfig>,
}

/// Where a marker is pinned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerAnchor {
    Geo(LatLng),
    /// Canvas coordinates of the topology.
    Plane(DVec2),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawMarker")]
pub struct MarkerSpec {
    pub anchor: MarkerAnchor,
    pub name: Option<String>,
    /// Merged into the marker's initial style.
    pub style: Style,
}

impl MarkerSpec {
    pub fn geo(lat: f64, lng: f64) -> Self {
        Self { anchor: MarkerAnchor::Geo(LatLng::new(lat, lng)), name: None, style: Style::default() }
    }

    pub fn plane(x: f64, y: f64) -> Self {
        Self { anchor: MarkerAnchor::Plane(DVec2::new(x, y)), name: None, style: Style::default() }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn styled(mut self, style: Style) -> Self {
        self.style = style;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMarker {
    Pair([f64; 2]),
    Object {
        #[serde(rename = "latLng")]
        lat_lng: Option<[f64; 2]>,
        lat: Option<f64>,
        lng: Option<f64>,
        coords: Option<[f64; 2]>,
        name: Option<String>,
        #[serde(default)]
        style: Style,
    },
}

impl TryFrom<RawMarker> for MarkerSpec {
    type Error = String;

    fn try_from(raw: RawMarker) -> std::result::Result<Self, String> {
        match raw {
            RawMarker::Pair([lat, lng]) => Ok(MarkerSpec::geo(lat, lng)),
            RawMarker::Object { lat_lng, lat, lng, coords, name, style } => {
                let anchor = match (lat_lng, lat.zip(lng), coords) {
                    (Some(pair), _, _) => MarkerAnchor::Geo(LatLng::from(pair)),
                    (None, Some((lat, lng)), _) => MarkerAnchor::Geo(LatLng::new(lat, lng)),
                    (None, None, Some([x, y])) => MarkerAnchor::Plane(DVec2::new(x, y)),
                    (None, None, None) => return Err(String::from("marker needs latLng, lat/lng or coords")),
                };
                Ok(MarkerSpec { anchor, name, style })
            }
        }
    }
}

/// Markers keyed by id: an array (ids are positions) or an id-keyed
/// object, kept in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerSet(pub Vec<(String, MarkerSpec)>);

impl MarkerSet {
    pub fn from_list(markers: impl IntoIterator<Item = MarkerSpec>) -> Self {
        Self(markers.into_iter().enumerate().map(|(i, m)| (i.to_string(), m)).collect())
    }
}

impl<'de> Deserialize<'de> for MarkerSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct Markers;

        impl<'de> Visitor<'de> for Markers {
            type Value = MarkerSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array of markers or a map of ids to markers")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<MarkerSet, A::Error> {
                let mut markers = Vec::new();
                while let Some(marker) = seq.next_element::<MarkerSpec>()? {
                    markers.push((markers.len().to_string(), marker));
                }
                Ok(MarkerSet(markers))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<MarkerSet, A::Error> {
                let mut markers = Vec::new();
                while let Some(entry) = map.next_entry::<String, MarkerSpec>()? {
                    markers.push(entry);
                }
                Ok(MarkerSet(markers))
            }
        }

        deserializer.deserialize_any(Markers)
    }
}

/// What to bring into view.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FocusSpec {
    Code(String),
    Region {
        region: String,
    },
    Regions {
        regions: Vec<String>,
    },
    LatLng {
        lat: f64,
        lng: f64,
        #[serde(default = "unit_zoom")]
        scale: f64,
    },
    /// `x` and `y` are fractions of the canvas size.
    Point {
        x: f64,
        y: f64,
        #[serde(default = "unit_zoom")]
        scale: f64,
    },
}

fn unit_zoom() -> f64 {
    1.0
}

impl FocusSpec {
    /// The whole map at the base scale.
    pub fn full_extent() -> Self {
        FocusSpec::Point { x: 0.5, y: 0.5, scale: 1.0 }
    }
}

/// Ids to select: one, several, or explicit on/off flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SelectionSpec {
    One(String),
    Many(Vec<String>),
    Flags(BTreeMap<String, bool>),
}

impl SelectionSpec {
    pub fn entries(&self) -> Vec<(String, bool)> {
        match self {
            SelectionSpec::One(id) => vec![(id.clone(), true)],
            SelectionSpec::Many(ids) => ids.iter().map(|id| (id.clone(), true)).collect(),
            SelectionSpec::Flags(flags) => flags.iter().map(|(id, on)| (id.clone(), *on)).collect(),
        }
    }
}

impl From<&str> for SelectionSpec {
    fn from(id: &str) -> Self {
        SelectionSpec::One(id.to_string())
    }
}

impl From<Vec<&str>> for SelectionSpec {
    fn from(ids: Vec<&str>) -> Self {
        SelectionSpec::Many(ids.into_iter().map(String::from).collect())
    }
}

pub type LabelText = Rc<dyn Fn(&str) -> Option<String>>;
pub type LabelOffsets = Rc<dyn Fn(&str) -> Option<DVec2>>;

/// Label callbacks for one element kind. Elements whose `render` yields
/// `None` get no label.
#[derive(Clone)]
pub struct LabelOptions {
    pub render: LabelText,
    pub offsets: Option<LabelOffsets>,
}

impl LabelOptions {
    pub fn new(render: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self { render: Rc::new(render), offsets: None }
    }

    pub fn with_offsets(mut self, offsets: impl Fn(&str) -> Option<DVec2> + 'static) -> Self {
        self.offsets = Some(Rc::new(offsets));
        self
    }

    /// Fixed per-id offsets.
    pub fn with_offset_table(self, table: BTreeMap<String, [f64; 2]>) -> Self {
        self.with_offsets(move |id| table.get(id).map(|&o| DVec2::from_array(o)))
    }

    pub fn offset(&self, id: &str) -> DVec2 {
        self.offsets.as_ref().and_then(|f| f(id)).unwrap_or(DVec2::ZERO)
    }
}

impl fmt::Debug for LabelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelOptions").field("offsets", &self.offsets.is_some()).finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Labels {
    pub regions: Option<LabelOptions>,
    pub markers: Option<LabelOptions>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Attr;

    fn parse(json: &str) -> MapConfig {
        let mut bytes = json.as_bytes().to_vec();
        MapConfig::from_json(&mut bytes).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(r#"{"map": "world_mill"}"#);
        assert_eq!(config.map, "world_mill");
        assert_eq!(config.background_color, "#505050");
        assert_eq!(config.zoom_step, 1.6);
        assert!(config.pan_on_drag && config.zoom_animate);
        assert!(!config.regions_selectable);
        assert_eq!(config.region_styles().initial.fill, Some(Attr::Set("white".into())));
    }

    #[test]
    fn test_camel_case_keys_and_style_merge() {
        let config = parse(
            r##"{"map": "m", "zoomOnScrollSpeed": 40, "regionsSelectableOne": true,
                "regionStyle": {"selectedHover": {"fill": "red"}, "initial": {"stroke": "#000"}}}"##,
        );
        assert_eq!(config.scroll_speed(), 10.0);
        assert!(config.regions_selectable_one);
        let styles = config.region_styles();
        assert_eq!(styles.selected_hover.fill, Some(Attr::Set("red".into())));
        assert_eq!(styles.initial.stroke, Some(Attr::Set("#000".into())));
        assert_eq!(styles.initial.fill, Some(Attr::Set("white".into())));
    }

    #[test]
    fn test_marker_forms() {
        let config = parse(
            r#"{"markers": [[1, 2], {"latLng": [3, 4], "name": "B"}, {"lat": 5, "lng": 6},
                            {"coords": [7, 8], "style": {"r": 9}}]}"#,
        );
        let markers = &config.markers.0;
        assert_eq!(markers[0], ("0".into(), MarkerSpec::geo(1.0, 2.0)));
        assert_eq!(markers[1].1, MarkerSpec::geo(3.0, 4.0).named("B"));
        assert_eq!(markers[2].1.anchor, MarkerAnchor::Geo(LatLng::new(5.0, 6.0)));
        assert_eq!(markers[3].1.anchor, MarkerAnchor::Plane(DVec2::new(7.0, 8.0)));
        assert_eq!(markers[3].1.style.r, Some(Attr::Set(9.0)));

        let keyed = parse(r#"{"markers": {"paris": [48.8, 2.3], "oslo": [59.9, 10.7]}}"#);
        let ids: Vec<&str> = keyed.markers.0.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["paris", "oslo"]);
    }

    #[test]
    fn test_focus_and_selection_forms() {
        let config = parse(r#"{"focusOn": {"lat": 10, "lng": 20, "scale": 3}, "selectedRegions": ["A", "B"]}"#);
        assert_eq!(config.focus_on, Some(FocusSpec::LatLng { lat: 10.0, lng: 20.0, scale: 3.0 }));
        assert_eq!(config.selected_regions.unwrap().entries().len(), 2);
        assert_eq!(parse(r#"{"focusOn": "US"}"#).focus_on, Some(FocusSpec::Code("US".into())));
        assert_eq!(
            parse(r#"{"focusOn": {"x": 0.5, "y": 0.5}}"#).focus_on,
            Some(FocusSpec::full_extent())
        );
        let flags = parse(r#"{"selectedMarkers": {"1": true, "0": false}}"#).selected_markers.unwrap();
        assert_eq!(flags.entries(), vec![("0".into(), false), ("1".into(), true)]);
    }

    #[test]
    fn test_inherit_keeps_styles_and_flags_only() {
        let mut config = parse(r#"{"map": "root", "regionsSelectable": true, "markers": [[0, 0]]}"#);
        config.focus_on = Some(FocusSpec::Code("A".into()));
        let child = config.inherit("child");
        assert_eq!(child.map, "child");
        assert!(child.regions_selectable);
        assert!(child.markers.0.is_empty());
        assert!(child.focus_on.is_none());
    }

    #[test]
    fn test_label_offset_table() {
        let labels = LabelOptions::new(|id| Some(id.to_lowercase()))
            .with_offset_table(BTreeMap::from([("A".to_string(), [2.0, -1.0])]));
        assert_eq!((labels.render)("A").as_deref(), Some("a"));
        assert_eq!(labels.offset("A"), DVec2::new(2.0, -1.0));
        assert_eq!(labels.offset("B"), DVec2::ZERO);
    }
}
