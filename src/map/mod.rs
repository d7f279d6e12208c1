//! One interactive map: a registered topology drawn on a surface, with
//! regions, markers, data series, legends and a viewport driven by pointer
//! input and by the host's clock.

pub mod config;
pub mod events;
pub mod legend;
pub mod projection;
pub mod spatial;
pub mod viewport;

use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use futures::FutureExt;
use glam::DVec2;
use log::{debug, warn};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

pub use config::{FocusSpec, LabelOptions, Labels, MapConfig, MarkerAnchor, MarkerSet, MarkerSpec, SelectionSpec};
pub use events::{ElementKind, EventBus, Flow, MapEvent};
pub use viewport::{Viewport, ViewportOptions, ViewportState, ZoomHandle};

use crate::error::{MapError, Result};
use crate::geo::LatLng;
use crate::model::{Marker, Region};
use crate::path::BBox;
use crate::scale::Normalize;
use crate::series::{AttrUpdate, DataSeries, ElementStyles, SeriesValue};
use crate::style::{merge_style, Attr, AttrValue, Attribute, Style, StyleSet};
use crate::surface::{FixedSizeLoader, ImageLoader, ImageRequest, ImageSize, ImageTarget, NodeId, PatternCache, Surface};
use crate::topology::{self, Inset, MapTopology};
use legend::Legend;
use projection::Projection;
use spatial::FeatureGrid;

/// Grid cells along the longer canvas side, for region hit-testing.
const GRID_CELLS: f64 = 16.0;

/// Which element kind a series styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesTarget {
    Regions,
    Markers,
}

/// The hover tip. The host draws it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tip {
    pub text: String,
    pub visible: bool,
    /// Last pointer position, in container pixels.
    pub position: DVec2,
}

#[derive(Debug, Clone, Copy)]
struct Layers {
    regions: NodeId,
    region_labels: NodeId,
    markers: NodeId,
    marker_labels: NodeId,
    legends: NodeId,
}

#[derive(Debug, Clone)]
struct Styles {
    region: StyleSet,
    region_label: StyleSet,
    marker: StyleSet,
    marker_label: StyleSet,
}

type PendingImage = (ImageRequest, LocalBoxFuture<'static, anyhow::Result<ImageSize>>);

pub struct SingleMap<S: Surface> {
    config: MapConfig,
    topology: Arc<MapTopology>,
    insets: Vec<Inset>,
    surface: S,
    viewport: Viewport,
    layers: Layers,
    styles: Styles,
    regions: Vec<Region>,
    region_index: HashMap<String, usize>,
    grid: FeatureGrid,
    markers: Vec<Marker>,
    region_series: Vec<DataSeries>,
    marker_series: Vec<DataSeries>,
    /// Element under the pointer, hovered or not.
    pointed: Option<(ElementKind, String)>,
    tip: Tip,
    events: EventBus,
    image_loader: Rc<dyn ImageLoader>,
    pending_images: Vec<PendingImage>,
    visible: bool,
}

impl<S: Surface> SingleMap<S> {
    /// Build the map named by `config.map` on `surface`. Images are sized by
    /// a [`FixedSizeLoader`].
    pub fn new(config: MapConfig, surface: S) -> Result<Self> {
        Self::with_image_loader(config, surface, Rc::new(FixedSizeLoader::default()))
    }

    pub fn with_image_loader(config: MapConfig, mut surface: S, image_loader: Rc<dyn ImageLoader>) -> Result<Self> {
        let topology = topology::lookup(&config.map)?;
        topology.validate()?;
        surface.set_background(&config.background_color);

        let root = surface.root();
        let layers = Layers {
            regions: surface.add_group(Some(root)),
            region_labels: surface.add_group(None),
            markers: surface.add_group(None),
            marker_labels: surface.add_group(None),
            legends: surface.add_group(None),
        };
        let styles = Styles {
            region: config.region_styles(),
            region_label: config.region_label_styles(),
            marker: config.marker_styles(),
            marker_label: config.marker_label_styles(),
        };
        let viewport = Viewport::new(
            DVec2::new(topology.width, topology.height),
            surface.size(),
            ViewportOptions { zoom_min: config.zoom_min, zoom_max: config.zoom_max, pan_on_drag: config.pan_on_drag },
        );
        let transform = viewport.transform();
        surface.apply_transform(transform);

        let mut regions = Vec::with_capacity(topology.paths.len());
        for (code, shape) in &topology.paths {
            let mut region = Region::new(&mut surface, layers.regions, code, shape, styles.region.clone());
            if let Some(labels) = &config.labels.regions {
                if let Some(text) = (labels.render)(code) {
                    let offset = labels.offset(code);
                    region.add_label(&mut surface, layers.region_labels, &text, styles.region_label.clone(), offset, transform);
                }
            }
            regions.push(region);
        }
        let region_index = regions.iter().enumerate().map(|(i, r)| (r.code().to_string(), i)).collect();
        let grid = FeatureGrid::build(regions.iter().map(Region::bbox), topology.width.max(topology.height) / GRID_CELLS);

        let mut map = Self {
            insets: topology.insets(),
            topology,
            surface,
            viewport,
            layers,
            styles,
            regions,
            region_index,
            grid,
            markers: Vec::new(),
            region_series: Vec::new(),
            marker_series: Vec::new(),
            pointed: None,
            tip: Tip::default(),
            events: EventBus::new(),
            image_loader,
            pending_images: Vec::new(),
            visible: true,
            config,
        };

        map.add_markers(map.config.markers.clone(), &[])?;
        for series in map.config.series.regions.clone() {
            let mut elements = RegionStyles {
                regions: &mut map.regions,
                index: &map.region_index,
                surface: &mut map.surface,
            };
            map.region_series.push(DataSeries::new(series, &mut elements)?);
        }
        for series in map.config.series.markers.clone() {
            let mut elements = MarkerStyles { markers: &mut map.markers, surface: &mut map.surface };
            map.marker_series.push(DataSeries::new(series, &mut elements)?);
        }
        map.render_legends();

        if let Some(focus) = map.config.focus_on.clone() {
            map.set_focus(&focus, false)?;
        }
        if let Some(selection) = map.config.selected_regions.clone() {
            map.set_selected_regions(&selection)?;
        }
        if let Some(selection) = map.config.selected_markers.clone() {
            map.set_selected_markers(&selection)?;
        }
        map.poll_images();
        Ok(map)
    }

    pub fn name(&self) -> &str {
        &self.config.map
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn topology(&self) -> &MapTopology {
        &self.topology
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn tip(&self) -> &Tip {
        &self.tip
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_image_loader(&mut self, loader: Rc<dyn ImageLoader>) {
        self.image_loader = loader;
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn region(&self, code: &str) -> Option<&Region> {
        self.region_index.get(code).map(|&i| &self.regions[i])
    }

    /// Display name of a region.
    pub fn region_name(&self, code: &str) -> Option<&str> {
        self.region(code).map(Region::name)
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn marker(&self, id: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id() == id)
    }

    // Events

    /// Run `hook` on every event as it is dispatched; it may veto or rewrite it.
    pub fn add_hook(&mut self, hook: impl FnMut(&mut MapEvent) -> Flow + 'static) {
        self.events.add_hook(hook);
    }

    pub fn events(&self) -> &[MapEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<MapEvent> {
        self.events.drain()
    }

    // Time

    /// Advance the zoom animation by one step and settle image loads.
    /// Returns whether anything visible changed.
    pub fn tick(&mut self) -> bool {
        let moved = self.viewport.tick();
        if moved {
            self.apply_transform();
        }
        self.poll_images() || moved
    }

    /// Whether a zoom animation or an image load is still running.
    pub fn is_busy(&self) -> bool {
        self.viewport.is_animating() || !self.pending_images.is_empty()
    }

    fn poll_images(&mut self) -> bool {
        for request in self.surface.take_image_requests() {
            let load = self.image_loader.natural_size(&request.url);
            self.pending_images.push((request, load));
        }
        if self.pending_images.is_empty() {
            return false;
        }

        let mut cx = Context::from_waker(noop_waker_ref());
        let mut loaded = false;
        for (request, mut load) in std::mem::take(&mut self.pending_images) {
            match load.poll_unpin(&mut cx) {
                Poll::Ready(Ok(size)) => {
                    loaded = true;
                    match request.target {
                        // The node may have been rebuilt or its slot reused meanwhile.
                        ImageTarget::Node(node) if self.surface.tree().shows_image(node, &request.url) => {
                            self.surface.image_loaded(node, size)
                        }
                        ImageTarget::Node(_) => {}
                        ImageTarget::Pattern => PatternCache::global().lock().resolve(&request.url, size),
                    }
                }
                Poll::Ready(Err(e)) => warn!("image `{}` could not be sized: {e:#}", request.url),
                Poll::Pending => self.pending_images.push((request, load)),
            }
        }
        if loaded {
            for marker in &self.markers {
                marker.reposition_label(&mut self.surface);
            }
        }
        loaded
    }

    // Viewport

    /// Push the viewport transform to the surface, move everything drawn in
    /// container pixels along and announce the change.
    fn apply_transform(&mut self) {
        let transform = self.viewport.transform();
        self.surface.apply_transform(transform);
        for marker in &mut self.markers {
            marker.move_to(&mut self.surface, transform.apply(marker.canvas()));
        }
        for region in &self.regions {
            region.reposition_label(&mut self.surface, transform);
        }
        self.events.emit(MapEvent::ViewportChanged {
            zoom: self.viewport.zoom(),
            translate: transform.translate,
        });
    }

    /// Apply the transform now unless an animation will take it there.
    fn settle(&mut self, handle: ZoomHandle) -> ZoomHandle {
        if !self.viewport.is_animating() {
            self.apply_transform();
        }
        handle
    }

    pub fn set_scale(&mut self, scale: f64, anchor: Option<DVec2>, centered: bool, animate: bool) -> ZoomHandle {
        let handle = self.viewport.set_scale(scale, anchor, centered, animate);
        self.settle(handle)
    }

    /// Shift the map by `delta` container pixels.
    pub fn pan(&mut self, delta: DVec2) {
        self.viewport.pan(delta);
        self.apply_transform();
    }

    /// Zoom-in button. Does nothing when the map has no zoom buttons.
    pub fn zoom_in(&mut self) -> ZoomHandle {
        self.zoom_by(self.config.zoom_step)
    }

    /// Zoom-out button. Does nothing when the map has no zoom buttons.
    pub fn zoom_out(&mut self) -> ZoomHandle {
        self.zoom_by(1.0 / self.config.zoom_step)
    }

    fn zoom_by(&mut self, factor: f64) -> ZoomHandle {
        if !self.config.zoom_buttons {
            return ZoomHandle::resolved();
        }
        let center = self.viewport.container() / 2.0;
        let scale = self.viewport.scale() * factor;
        self.set_scale(scale, Some(center), false, self.config.zoom_animate)
    }

    /// Bring regions or a point into view.
    pub fn set_focus(&mut self, focus: &FocusSpec, animate: bool) -> Result<ZoomHandle> {
        let handle = match focus {
            FocusSpec::Code(code) | FocusSpec::Region { region: code } => {
                let bbox = self.regions_bbox([code.as_str()]).ok_or(MapError::EmptyFocus)?;
                self.viewport.focus_bbox(&bbox, animate)
            }
            FocusSpec::Regions { regions } => {
                let bbox = self.regions_bbox(regions.iter().map(String::as_str)).ok_or(MapError::EmptyFocus)?;
                self.viewport.focus_bbox(&bbox, animate)
            }
            FocusSpec::LatLng { lat, lng, scale } => {
                let canvas = self.lat_lng_to_canvas(LatLng::new(*lat, *lng))?.ok_or(MapError::EmptyFocus)?;
                self.viewport.focus_point(canvas, *scale, animate)
            }
            FocusSpec::Point { x, y, scale } => {
                let canvas = self.viewport.content() * DVec2::new(*x, *y);
                self.viewport.focus_point(canvas, *scale, animate)
            }
        };
        Ok(self.settle(handle))
    }

    /// Union of the bounding boxes of the known `codes`.
    pub fn regions_bbox<'a>(&self, codes: impl IntoIterator<Item = &'a str>) -> Option<BBox> {
        codes
            .into_iter()
            .filter_map(|code| self.region(code))
            .map(|r| *r.bbox())
            .reduce(|a, b| a.union(&b))
    }

    /// Back to the fitted, centred view.
    pub fn reset_view(&mut self) {
        self.viewport.reset();
        self.apply_transform();
    }

    /// The container changed size.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.surface.set_size(width, height);
        self.viewport.resize(DVec2::new(width, height));
        self.apply_transform();
        self.render_legends();
    }

    /// Re-read the container size from the surface.
    pub fn update_size(&mut self) {
        let size = self.surface.size();
        self.resize(size.x, size.y);
    }

    // Coordinates

    fn projection(&self) -> Result<Projection> {
        self.topology.projection.ok_or_else(|| MapError::NoProjection(self.config.map.clone()))
    }

    /// Canvas position of a geographic point, or `None` outside every inset.
    pub fn lat_lng_to_canvas(&self, at: LatLng) -> Result<Option<DVec2>> {
        let plane = self.projection()?.to_plane(at);
        Ok(self.insets.iter().find(|i| i.contains_plane(plane)).map(|i| i.plane_to_canvas(plane)))
    }

    /// Container pixel of a geographic point.
    pub fn lat_lng_to_point(&self, lat: f64, lng: f64) -> Result<Option<DVec2>> {
        let transform = self.viewport.transform();
        Ok(self.lat_lng_to_canvas(LatLng::new(lat, lng))?.map(|c| transform.apply(c)))
    }

    /// Geographic point under a container pixel.
    pub fn point_to_lat_lng(&self, x: f64, y: f64) -> Result<Option<LatLng>> {
        let projection = self.projection()?;
        let canvas = self.viewport.transform().invert(DVec2::new(x, y));
        Ok(self
            .insets
            .iter()
            .find(|i| i.contains_canvas(canvas))
            .map(|i| projection.to_geo(i.canvas_to_plane(canvas))))
    }

    // Pointer input, in container pixels

    pub fn pointer_down(&mut self, at: DVec2) {
        self.viewport.pointer_down(at);
    }

    /// Pan while dragging; otherwise track what is under the pointer.
    pub fn pointer_move(&mut self, at: DVec2) {
        self.tip.position = at;
        let dragging = matches!(self.viewport.state(), ViewportState::Dragging { .. });
        if self.viewport.pointer_move(at) {
            self.tip.visible = false;
            self.apply_transform();
        }
        if !dragging {
            self.update_pointed(self.hit_test(at));
        }
    }

    /// Release; a press that did not move is a click.
    pub fn pointer_up(&mut self, at: DVec2) {
        if self.viewport.pointer_up() == Some(false) {
            self.click(at);
        }
        self.update_pointed(self.hit_test(at));
    }

    pub fn pointer_leave(&mut self) {
        self.viewport.pointer_up();
        self.update_pointed(None);
    }

    /// One wheel event at `at`; positive `delta_y` zooms in.
    pub fn wheel(&mut self, at: DVec2, delta_y: f64, delta_factor: f64) {
        if !self.config.zoom_on_scroll {
            return;
        }
        self.tip.visible = false;
        self.viewport.wheel(at, delta_y, delta_factor, self.config.scroll_speed());
        self.apply_transform();
    }

    pub fn pinch_start(&mut self, a: DVec2, b: DVec2) {
        self.viewport.pinch_start(a, b);
    }

    pub fn pinch_move(&mut self, a: DVec2, b: DVec2) {
        if self.viewport.pinch_move(a, b) {
            self.tip.visible = false;
            self.apply_transform();
        }
    }

    pub fn pinch_end(&mut self) {
        self.viewport.pinch_end();
    }

    pub fn click(&mut self, at: DVec2) {
        if let Some((kind, id)) = self.hit_test(at) {
            self.click_element(kind, &id);
        }
    }

    /// Topmost element under a container pixel: markers first, then regions.
    pub fn hit_test(&self, at: DVec2) -> Option<(ElementKind, String)> {
        let size = self.surface.size();
        if !self.visible || at.x < 0.0 || at.y < 0.0 || at.x > size.x || at.y > size.y {
            return None;
        }
        if let Some(marker) = self.markers.iter().rev().find(|m| m.contains(&self.surface, at)) {
            return Some((ElementKind::Marker, marker.id().to_string()));
        }
        let canvas = self.viewport.transform().invert(at);
        self.grid
            .query_point(canvas)
            .iter()
            .rev()
            .map(|&i| &self.regions[i])
            .find(|r| r.contains(canvas))
            .map(|r| (ElementKind::Region, r.code().to_string()))
    }

    fn update_pointed(&mut self, hit: Option<(ElementKind, String)>) {
        if hit == self.pointed {
            return;
        }
        if let Some((kind, id)) = self.pointed.take() {
            self.element_out(kind, &id);
        }
        if let Some((kind, id)) = hit {
            self.element_over(kind, &id);
            self.pointed = Some((kind, id));
        }
    }

    fn element_over(&mut self, kind: ElementKind, id: &str) {
        let (allowed, _) = self.events.dispatch(MapEvent::ElementOver { kind, id: id.to_string() });
        if allowed {
            self.set_hovered(kind, id, true);
        }
        let text = self.element_name(kind, id);
        let (show, event) = self.events.dispatch(MapEvent::TipShow { kind, id: id.to_string(), text });
        if let (true, MapEvent::TipShow { text, .. }) = (show, event) {
            self.tip.text = text;
            self.tip.visible = true;
        }
    }

    fn element_out(&mut self, kind: ElementKind, id: &str) {
        self.set_hovered(kind, id, false);
        self.tip.visible = false;
        self.events.emit(MapEvent::ElementOut { kind, id: id.to_string() });
    }

    fn element_name(&self, kind: ElementKind, id: &str) -> String {
        match kind {
            ElementKind::Region => self.region_name(id).unwrap_or_default().to_string(),
            ElementKind::Marker => self.marker(id).and_then(Marker::name).unwrap_or_default().to_string(),
        }
    }

    fn set_hovered(&mut self, kind: ElementKind, id: &str, hovered: bool) {
        match kind {
            ElementKind::Region => {
                if let Some(&i) = self.region_index.get(id) {
                    self.regions[i].set_hovered(&mut self.surface, hovered);
                }
            }
            ElementKind::Marker => {
                if let Some(marker) = self.markers.iter_mut().find(|m| m.id() == id) {
                    marker.set_hovered(&mut self.surface, hovered);
                }
            }
        }
    }

    /// Click an element as if the pointer had: announce it and, if nobody
    /// vetoed and the kind is selectable, toggle its selection.
    pub fn click_element(&mut self, kind: ElementKind, id: &str) {
        let (allowed, _) = self.events.dispatch(MapEvent::ElementClick { kind, id: id.to_string() });
        if !allowed {
            return;
        }
        let (selectable, only_one) = match kind {
            ElementKind::Region => (self.config.regions_selectable, self.config.regions_selectable_one),
            ElementKind::Marker => (self.config.markers_selectable, self.config.markers_selectable_one),
        };
        if !selectable {
            return;
        }
        if only_one {
            self.clear_selected(kind);
        }
        let selected = self.is_selected(kind, id);
        if let Err(e) = self.set_selected(kind, id, !selected) {
            debug!("click ignored: {e}");
        }
    }

    // Selection

    pub fn is_selected(&self, kind: ElementKind, id: &str) -> bool {
        match kind {
            ElementKind::Region => self.region(id).is_some_and(Region::is_selected),
            ElementKind::Marker => self.marker(id).is_some_and(Marker::is_selected),
        }
    }

    pub fn selected(&self, kind: ElementKind) -> Vec<String> {
        match kind {
            ElementKind::Region => {
                self.regions.iter().filter(|r| r.is_selected()).map(|r| r.code().to_string()).collect()
            }
            ElementKind::Marker => {
                self.markers.iter().filter(|m| m.is_selected()).map(|m| m.id().to_string()).collect()
            }
        }
    }

    pub fn selected_regions(&self) -> Vec<String> {
        self.selected(ElementKind::Region)
    }

    pub fn selected_markers(&self) -> Vec<String> {
        self.selected(ElementKind::Marker)
    }

    /// Select or deselect one element. Returns whether its state changed;
    /// a change is announced with the full selection of that kind.
    pub fn set_selected(&mut self, kind: ElementKind, id: &str, selected: bool) -> Result<bool> {
        let changed = match kind {
            ElementKind::Region => {
                let &i = self.region_index.get(id).ok_or_else(|| MapError::UnknownRegion(id.to_string()))?;
                self.regions[i].set_selected(&mut self.surface, selected)
            }
            ElementKind::Marker => self
                .markers
                .iter_mut()
                .find(|m| m.id() == id)
                .ok_or_else(|| MapError::UnknownMarker(id.to_string()))?
                .set_selected(&mut self.surface, selected),
        };
        if changed {
            let selection = self.selected(kind);
            self.events.emit(MapEvent::ElementSelected { kind, id: id.to_string(), selected, selection });
        }
        Ok(changed)
    }

    fn apply_selection(&mut self, kind: ElementKind, spec: &SelectionSpec) -> Result<()> {
        let entries = spec.entries();
        if let Some((id, _)) = entries.iter().find(|(id, _)| match kind {
            ElementKind::Region => self.region(id).is_none(),
            ElementKind::Marker => self.marker(id).is_none(),
        }) {
            return Err(match kind {
                ElementKind::Region => MapError::UnknownRegion(id.clone()),
                ElementKind::Marker => MapError::UnknownMarker(id.clone()),
            });
        }
        for (id, selected) in entries {
            self.set_selected(kind, &id, selected)?;
        }
        Ok(())
    }

    pub fn set_selected_regions(&mut self, spec: &SelectionSpec) -> Result<()> {
        self.apply_selection(ElementKind::Region, spec)
    }

    pub fn set_selected_markers(&mut self, spec: &SelectionSpec) -> Result<()> {
        self.apply_selection(ElementKind::Marker, spec)
    }

    fn clear_selected(&mut self, kind: ElementKind) {
        for id in self.selected(kind) {
            if let Err(e) = self.set_selected(kind, &id, false) {
                debug!("deselect skipped: {e}");
            }
        }
    }

    pub fn clear_selected_regions(&mut self) {
        self.clear_selected(ElementKind::Region);
    }

    pub fn clear_selected_markers(&mut self) {
        self.clear_selected(ElementKind::Marker);
    }

    // Markers

    /// Add markers, replacing any with the same id. `series_data[i]` holds
    /// values for the new markers in marker series `i`. Geographic markers
    /// outside every inset are skipped.
    pub fn add_markers(&mut self, markers: MarkerSet, series_data: &[HashMap<String, SeriesValue>]) -> Result<()> {
        let transform = self.viewport.transform();
        for (id, spec) in markers.0 {
            self.remove_marker(&id);
            let canvas = match spec.anchor {
                MarkerAnchor::Geo(at) => match self.lat_lng_to_canvas(at)? {
                    Some(canvas) => canvas,
                    None => {
                        debug!("marker `{id}` at {at:?} lies outside every inset, skipped");
                        continue;
                    }
                },
                MarkerAnchor::Plane(canvas) => canvas,
            };
            let mut styles = self.styles.marker.clone();
            styles.initial.merge(&spec.style);
            let mut marker = Marker::new(
                &mut self.surface,
                self.layers.markers,
                &id,
                spec.name,
                spec.anchor,
                canvas,
                transform.apply(canvas),
                styles,
            );
            if let Some(labels) = &self.config.labels.markers {
                if let Some(text) = (labels.render)(&id) {
                    let offset = labels.offset(&id);
                    marker.add_label(&mut self.surface, self.layers.marker_labels, &text, self.styles.marker_label.clone(), offset);
                }
            }
            self.markers.push(marker);
        }

        for (index, values) in series_data.iter().enumerate().take(self.marker_series.len()) {
            self.set_series_values(SeriesTarget::Markers, index, values.clone())?;
        }
        Ok(())
    }

    fn remove_marker(&mut self, id: &str) -> bool {
        let Some(index) = self.markers.iter().position(|m| m.id() == id) else {
            return false;
        };
        let marker = self.markers.remove(index);
        marker.remove(&mut self.surface);
        for series in &mut self.marker_series {
            series.forget(id);
        }
        if matches!(&self.pointed, Some((ElementKind::Marker, pointed)) if pointed == id) {
            self.pointed = None;
            self.tip.visible = false;
        }
        true
    }

    pub fn remove_markers(&mut self, ids: &[&str]) {
        for id in ids {
            if !self.remove_marker(id) {
                debug!("no marker `{id}` to remove");
            }
        }
    }

    pub fn remove_all_markers(&mut self) {
        let ids: Vec<String> = self.markers.iter().map(|m| m.id().to_string()).collect();
        for id in ids {
            self.remove_marker(&id);
        }
    }

    // Series

    pub fn series(&self, target: SeriesTarget, index: usize) -> Option<&DataSeries> {
        match target {
            SeriesTarget::Regions => self.region_series.get(index),
            SeriesTarget::Markers => self.marker_series.get(index),
        }
    }

    pub fn series_count(&self, target: SeriesTarget) -> usize {
        match target {
            SeriesTarget::Regions => self.region_series.len(),
            SeriesTarget::Markers => self.marker_series.len(),
        }
    }

    fn with_series<R>(
        &mut self,
        target: SeriesTarget,
        index: usize,
        op: impl FnOnce(&mut DataSeries, &mut dyn ElementStyles) -> R,
    ) -> Result<R> {
        let result = match target {
            SeriesTarget::Regions => {
                let series = self
                    .region_series
                    .get_mut(index)
                    .ok_or(MapError::Series { kind: "region", index })?;
                let mut elements = RegionStyles {
                    regions: &mut self.regions,
                    index: &self.region_index,
                    surface: &mut self.surface,
                };
                op(series, &mut elements)
            }
            SeriesTarget::Markers => {
                let series = self
                    .marker_series
                    .get_mut(index)
                    .ok_or(MapError::Series { kind: "marker", index })?;
                let mut elements = MarkerStyles { markers: &mut self.markers, surface: &mut self.surface };
                op(series, &mut elements)
            }
        };
        self.render_legends();
        Ok(result)
    }

    pub fn set_series_values(
        &mut self,
        target: SeriesTarget,
        index: usize,
        values: HashMap<String, SeriesValue>,
    ) -> Result<()> {
        self.with_series(target, index, |series, elements| series.set_values(values, elements))
    }

    pub fn clear_series(&mut self, target: SeriesTarget, index: usize) -> Result<()> {
        self.with_series(target, index, |series, elements| series.clear(elements))
    }

    pub fn clear_and_set_series(
        &mut self,
        target: SeriesTarget,
        index: usize,
        values: HashMap<String, SeriesValue>,
    ) -> Result<()> {
        self.with_series(target, index, |series, elements| series.clear_and_set(values, elements))
    }

    pub fn set_series_scale(&mut self, target: SeriesTarget, index: usize, stops: &[AttrValue]) -> Result<()> {
        self.with_series(target, index, |series, elements| series.set_scale(stops, elements))?
    }

    pub fn set_series_normalize(&mut self, target: SeriesTarget, index: usize, normalize: Normalize) -> Result<()> {
        self.with_series(target, index, |series, elements| series.set_normalize(normalize, elements))
    }

    fn render_legends(&mut self) {
        self.surface.clear_group(self.layers.legends);
        let legends: Vec<Legend> = self
            .region_series
            .iter()
            .chain(&self.marker_series)
            .filter_map(|s| s.legend().map(|config| Legend::new(config, s.attribute(), &s.ticks())))
            .collect();
        if legends.is_empty() {
            return;
        }
        let marker = merge_style(&self.styles.marker, &Style::default(), false, false);
        let origins = legend::layout(&legends, self.surface.size());
        for (legend, origin) in legends.iter().zip(origins) {
            legend.draw(&mut self.surface, self.layers.legends, origin, &marker);
        }
    }

    // Visibility

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        let Layers { region_labels, markers, marker_labels, legends, .. } = self.layers;
        for layer in [self.surface.root(), region_labels, markers, marker_labels, legends] {
            self.surface.set_visible(layer, visible);
        }
        if !visible {
            self.update_pointed(None);
        }
    }
}

/// Regions as seen by a series.
struct RegionStyles<'a, S: Surface> {
    regions: &'a mut [Region],
    index: &'a HashMap<String, usize>,
    surface: &'a mut S,
}

impl<S: Surface> ElementStyles for RegionStyles<'_, S> {
    fn current(&self, id: &str, attr: Attribute) -> Option<Option<Attr<AttrValue>>> {
        self.index.get(id).map(|&i| self.regions[i].current(attr))
    }

    fn apply(&mut self, attr: Attribute, updates: Vec<AttrUpdate>) {
        for (id, value) in updates {
            if let Some(&i) = self.index.get(&id) {
                let region = &mut self.regions[i];
                region.set_current(attr, value);
                region.restyle(&mut *self.surface);
            }
        }
    }
}

/// Markers as seen by a series.
struct MarkerStyles<'a, S: Surface> {
    markers: &'a mut [Marker],
    surface: &'a mut S,
}

impl<S: Surface> ElementStyles for MarkerStyles<'_, S> {
    fn current(&self, id: &str, attr: Attribute) -> Option<Option<Attr<AttrValue>>> {
        self.markers.iter().find(|m| m.id() == id).map(|m| m.current(attr))
    }

    fn apply(&mut self, attr: Attribute, updates: Vec<AttrUpdate>) {
        for (id, value) in updates {
            if let Some(marker) = self.markers.iter_mut().find(|m| m.id() == id) {
                marker.set_current(attr, value);
                marker.restyle(&mut *self.surface);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::legend::LegendConfig;
    use crate::map::projection::ProjectionKind;
    use crate::scale::ScaleSpec;
    use crate::series::SeriesConfig;
    use crate::surface::{NodeKind, SvgSurface};
    use crate::topology::{RegionShape, XY};
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    /// Two squares side by side; the inset spans the whole globe.
    fn register(name: &str) {
        let paths = BTreeMap::from([
            ("A".to_string(), RegionShape { path: "M0,0 L100,0 L100,100 L0,100 Z".into(), name: "Alpha".into() }),
            ("B".to_string(), RegionShape { path: "M100,0 L200,0 L200,100 L100,100 Z".into(), name: "Beta".into() }),
        ]);
        let topology = MapTopology {
            width: 200.0,
            height: 100.0,
            paths,
            projection: Some(Projection::new(ProjectionKind::Miller, 0.0)),
            insets: vec![Inset {
                left: 0.0,
                top: 0.0,
                width: 200.0,
                height: 100.0,
                bbox: [XY { x: -2.0e7, y: -1.0e7 }, XY { x: 2.0e7, y: 1.0e7 }],
            }],
        };
        topology::register_map(name, topology);
    }

    fn map(name: &str, tweak: impl FnOnce(&mut MapConfig)) -> SingleMap<SvgSurface> {
        register(name);
        let mut config = MapConfig::new(name);
        tweak(&mut config);
        SingleMap::new(config, SvgSurface::new(400.0, 200.0)).unwrap()
    }

    #[test]
    fn test_unknown_map_is_fatal() {
        let result = SingleMap::new(MapConfig::new("map_test_missing"), SvgSurface::new(10.0, 10.0));
        assert!(matches!(result, Err(MapError::UnknownMap(_))));
    }

    #[test]
    fn test_fitted_and_hit_tested() {
        let m = map("map_test_hit", |_| {});
        assert_eq!(m.viewport().base_scale(), 2.0);
        assert_eq!(m.hit_test(DVec2::new(50.0, 50.0)), Some((ElementKind::Region, "A".into())));
        assert_eq!(m.hit_test(DVec2::new(350.0, 50.0)), Some((ElementKind::Region, "B".into())));
        assert_eq!(m.hit_test(DVec2::new(500.0, 50.0)), None);
        assert_eq!(m.region_name("B"), Some("Beta"));
    }

    #[test]
    fn test_hover_emits_over_tip_and_out() {
        let mut m = map("map_test_hover", |_| {});
        m.add_hook(|event| {
            if let MapEvent::TipShow { text, .. } = event {
                *text = format!("{text}!");
            }
            Flow::Continue
        });
        m.drain_events();
        m.pointer_move(DVec2::new(50.0, 50.0));
        assert!(m.region("A").unwrap().is_hovered());
        assert_eq!(m.tip().text, "Alpha!");
        assert!(m.tip().visible);

        m.pointer_move(DVec2::new(60.0, 50.0));
        m.pointer_move(DVec2::new(350.0, 50.0));
        assert!(!m.region("A").unwrap().is_hovered());
        let kinds: Vec<&str> = m
            .drain_events()
            .iter()
            .map(|e| match e {
                MapEvent::ElementOver { .. } => "over",
                MapEvent::ElementOut { .. } => "out",
                MapEvent::TipShow { .. } => "tip",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["over", "tip", "out", "over", "tip"]);
    }

    #[test]
    fn test_vetoed_over_keeps_style() {
        let mut m = map("map_test_veto", |_| {});
        m.add_hook(|event| match event {
            MapEvent::ElementOver { .. } | MapEvent::TipShow { .. } => Flow::Prevent,
            _ => Flow::Continue,
        });
        m.pointer_move(DVec2::new(50.0, 50.0));
        assert!(!m.region("A").unwrap().is_hovered());
        assert!(!m.tip().visible);
    }

    #[test]
    fn test_click_selects_and_drag_does_not() {
        let mut m = map("map_test_click", |c| c.regions_selectable = true);
        m.pointer_down(DVec2::new(50.0, 50.0));
        m.pointer_up(DVec2::new(50.0, 50.0));
        assert_eq!(m.selected_regions(), vec!["A".to_string()]);

        m.pointer_down(DVec2::new(300.0, 50.0));
        m.pointer_move(DVec2::new(310.0, 50.0));
        m.pointer_up(DVec2::new(310.0, 50.0));
        assert_eq!(m.selected_regions(), vec!["A".to_string()]);

        let selected = m
            .events()
            .iter()
            .filter(|e| matches!(e, MapEvent::ElementSelected { .. }))
            .count();
        assert_eq!(selected, 1);
    }

    #[test]
    fn test_unselectable_click_only_announces() {
        let mut m = map("map_test_unselectable", |_| {});
        m.click(DVec2::new(50.0, 50.0));
        assert!(m.selected_regions().is_empty());
        assert!(m.events().iter().any(|e| matches!(e, MapEvent::ElementClick { id, .. } if id == "A")));
    }

    #[test]
    fn test_selection_api() {
        let mut m = map("map_test_selection", |_| {});
        m.set_selected_regions(&vec!["A", "B"].into()).unwrap();
        assert_eq!(m.selected_regions().len(), 2);
        assert!(matches!(m.set_selected_regions(&"Z".into()), Err(MapError::UnknownRegion(_))));
        m.clear_selected_regions();
        assert!(m.selected_regions().is_empty());
    }

    #[test]
    fn test_selecting_twice_notifies_once() {
        let mut m = map("map_test_select_twice", |_| {});
        assert!(m.set_selected(ElementKind::Region, "A", true).unwrap());
        assert!(!m.set_selected(ElementKind::Region, "A", true).unwrap());
        let selected: Vec<_> = m
            .events()
            .iter()
            .filter(|e| matches!(e, MapEvent::ElementSelected { .. }))
            .collect();
        assert_eq!(selected.len(), 1);
        assert!(matches!(
            selected[0],
            MapEvent::ElementSelected { id, selected: true, selection, .. } if id == "A" && selection == &vec!["A".to_string()]
        ));
    }

    #[test]
    fn test_legend_rerender_reuses_nodes() {
        let mut m = map("map_test_legend_churn", |c| {
            let mut series = SeriesConfig::new(Attribute::Fill, Some(ScaleSpec::Stops(vec!["#C8EEFF".into(), "#0071A4".into()])));
            series.legend = Some(LegendConfig::default());
            c.series.regions.push(series);
        });
        let values = HashMap::from([("A".to_string(), SeriesValue::from(1.0)), ("B".to_string(), SeriesValue::from(9.0))]);
        m.set_series_values(SeriesTarget::Regions, 0, values.clone()).unwrap();
        let slots = m.surface().tree().slots();
        for _ in 0..200 {
            m.set_series_values(SeriesTarget::Regions, 0, values.clone()).unwrap();
            m.resize(400.0, 200.0);
        }
        assert_eq!(m.surface().tree().slots(), slots);
    }

    #[test]
    fn test_zoom_buttons_clamp() {
        let mut m = map("map_test_zoom", |c| c.zoom_animate = false);
        for _ in 0..10 {
            m.zoom_in();
        }
        assert_eq!(m.viewport().zoom(), 8.0);
        for _ in 0..10 {
            m.zoom_out();
        }
        assert_eq!(m.viewport().zoom(), 1.0);
    }

    #[test]
    fn test_zoom_buttons_can_be_disabled() {
        register("map_test_no_buttons");
        let mut bytes = br#"{"map": "map_test_no_buttons", "zoomButtons": false, "zoomAnimate": false}"#.to_vec();
        let config = MapConfig::from_json(&mut bytes).unwrap();
        let mut m = SingleMap::new(config, SvgSurface::new(400.0, 200.0)).unwrap();
        assert!(m.zoom_in().is_done());
        assert_eq!(m.viewport().zoom(), 1.0);
        m.zoom_out();
        assert_eq!(m.viewport().zoom(), 1.0);

        m.set_scale(m.viewport().base_scale() * 2.0, None, true, false);
        assert_eq!(m.viewport().zoom(), 2.0);
    }

    #[test]
    fn test_animated_focus_settles_on_ticks() {
        let mut m = map("map_test_focus", |_| {});
        let handle = m.set_focus(&FocusSpec::Point { x: 0.25, y: 0.5, scale: 4.0 }, true).unwrap();
        assert!(!handle.is_done());
        while m.tick() {}
        assert!(handle.is_done());
        assert_eq!(m.viewport().scale(), 8.0);
        let center = m.viewport().transform().apply(DVec2::new(50.0, 50.0));
        assert_eq!(center, DVec2::new(200.0, 100.0));

        let handle = m.set_focus(&FocusSpec::Code("A".into()), false).unwrap();
        assert!(handle.is_done());
        assert_eq!(m.viewport().scale(), 2.0);
        assert!(matches!(m.set_focus(&FocusSpec::Code("Z".into()), false), Err(MapError::EmptyFocus)));
    }

    #[test]
    fn test_lat_lng_round_trip() {
        let m = map("map_test_geo", |_| {});
        let p = m.lat_lng_to_point(10.0, 45.0).unwrap().unwrap();
        let back = m.point_to_lat_lng(p.x, p.y).unwrap().unwrap();
        assert!((back.lat - 10.0).abs() < 1e-6);
        assert!((back.lng - 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_markers_follow_transform() {
        let mut m = map("map_test_markers", |c| {
            c.zoom_animate = false;
            c.markers = MarkerSet::from_list([MarkerSpec::plane(150.0, 50.0).named("Pin")]);
        });
        assert_eq!(m.marker("0").unwrap().screen(), DVec2::new(300.0, 100.0));
        assert_eq!(m.hit_test(DVec2::new(301.0, 100.0)), Some((ElementKind::Marker, "0".into())));
        m.set_scale(4.0, Some(DVec2::new(300.0, 100.0)), false, false);
        assert_eq!(m.marker("0").unwrap().screen(), DVec2::new(300.0, 100.0));
        m.set_focus(&FocusSpec::Point { x: 0.25, y: 0.5, scale: 2.0 }, false).unwrap();
        assert_eq!(m.marker("0").unwrap().screen(), DVec2::new(600.0, 100.0));

        m.remove_markers(&["0"]);
        assert!(m.markers().is_empty());
    }

    #[test]
    fn test_region_series_and_legend() {
        let mut m = map("map_test_series", |c| {
            let mut series = SeriesConfig::new(
                Attribute::Fill,
                Some(ScaleSpec::Stops(vec!["#C8EEFF".into(), "#0071A4".into()])),
            );
            series.values = HashMap::from([("A".to_string(), 0.0.into()), ("B".to_string(), 100.0.into())]);
            series.legend = Some(LegendConfig { vertical: true, ..LegendConfig::default() });
            c.series.regions.push(series);
        });
        let fill = |m: &SingleMap<SvgSurface>, code: &str| {
            let node = m.region(code).unwrap().node();
            m.surface().tree().get(node).unwrap().style.fill.clone()
        };
        assert_eq!(fill(&m, "B").as_deref(), Some("#0071a4"));
        let legend = m.surface().tree().get(m.layers.legends).unwrap();
        assert!(!legend.children.is_empty());

        m.clear_series(SeriesTarget::Regions, 0).unwrap();
        assert_eq!(fill(&m, "B").as_deref(), Some("white"));
        assert!(matches!(
            m.set_series_values(SeriesTarget::Markers, 0, HashMap::new()),
            Err(MapError::Series { kind: "marker", index: 0 })
        ));
    }

    #[test]
    fn test_marker_image_loads_on_tick() {
        struct Later(Rc<RefCell<Option<futures::channel::oneshot::Sender<ImageSize>>>>);
        impl ImageLoader for Later {
            fn natural_size(&self, _url: &str) -> LocalBoxFuture<'static, anyhow::Result<ImageSize>> {
                let (tx, rx) = futures::channel::oneshot::channel();
                *self.0.borrow_mut() = Some(tx);
                async move { rx.await.map_err(anyhow::Error::from) }.boxed_local()
            }
        }

        register("map_test_images");
        let slot = Rc::new(RefCell::new(None));
        let mut config = MapConfig::new("map_test_images");
        let mut style = Style::default();
        style.image = Some(Attr::Set(crate::style::ImageRef::Url("pin.png".into())));
        config.markers = MarkerSet::from_list([MarkerSpec::plane(50.0, 50.0).styled(style)]);
        let mut m = SingleMap::with_image_loader(config, SvgSurface::new(400.0, 200.0), Rc::new(Later(slot.clone())))
            .unwrap();
        let node = m.marker("0").unwrap().node();
        assert!(matches!(m.surface().tree().get(node).unwrap().kind, NodeKind::Image { size: None, .. }));
        assert!(m.is_busy());

        slot.borrow_mut().take().unwrap().send(ImageSize::new(10.0, 10.0)).unwrap();
        assert!(m.tick());
        assert_eq!(m.surface().image_size(node), Some(ImageSize::new(10.0, 10.0)));
        assert!(!m.is_busy());
    }

    #[test]
    fn test_hidden_map_ignores_pointer() {
        let mut m = map("map_test_hidden", |_| {});
        m.set_visible(false);
        assert_eq!(m.hit_test(DVec2::new(50.0, 50.0)), None);
        assert!(!m.surface().tree().is_shown(m.region("A").unwrap().node()));
    }
}
