//! Drill-down: a stack of maps where clicking a region opens a map of that
//! region. Child topologies come from a host-supplied loader and are cached
//! by region code.

use anyhow::Context as _;
use futures::future::{self, LocalBoxFuture};
use futures::task::noop_waker_ref;
use futures::FutureExt;
use glam::DVec2;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::Result;
use crate::map::{ElementKind, EventBus, FocusSpec, MapConfig, MapEvent, SingleMap, ZoomHandle};
use crate::surface::{ImageLoader, Surface};
use crate::topology::{self, MapTopology};

/// What the loader is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRequest {
    pub code: String,
    /// Registry name the topology is stored under.
    pub map_name: String,
    pub fetch_key: String,
}

pub type ChildLoader = Rc<dyn Fn(&ChildRequest) -> LocalBoxFuture<'static, anyhow::Result<MapTopology>>>;

/// Derives a name from a region code.
pub type Naming = Rc<dyn Fn(&str) -> String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DrillDownOptions {
    /// Deepest level reachable; the root map is level 1.
    pub max_level: usize,
}

impl Default for DrillDownOptions {
    fn default() -> Self {
        Self { max_level: 1 }
    }
}

type Fetch = LocalBoxFuture<'static, anyhow::Result<Arc<MapTopology>>>;

enum Transition {
    Down {
        code: String,
        map_name: String,
        focus: ZoomHandle,
        fetch: Option<Fetch>,
        fetched: Option<anyhow::Result<Arc<MapTopology>>>,
    },
    Back {
        /// The map zooming out, still shown until the swap.
        leaving: usize,
        focus: ZoomHandle,
    },
}

pub struct DrillDown<S: Surface> {
    root_config: MapConfig,
    options: DrillDownOptions,
    maps: Vec<SingleMap<S>>,
    /// Indices into `maps`; the map at position `i` is at level `i + 1`.
    history: Vec<usize>,
    shown: usize,
    cache: HashMap<String, Arc<MapTopology>>,
    loader: ChildLoader,
    map_name: Naming,
    fetch_key: Naming,
    new_surface: Box<dyn FnMut(DVec2) -> S>,
    image_loader: Option<Rc<dyn ImageLoader>>,
    size: DVec2,
    transition: Option<Transition>,
    loading: bool,
    events: EventBus,
}

impl<S: Surface> DrillDown<S> {
    /// Build the root map from `config`. `new_surface` makes the surface of
    /// every map, given the container size.
    pub fn new(
        config: MapConfig,
        options: DrillDownOptions,
        size: DVec2,
        mut new_surface: impl FnMut(DVec2) -> S + 'static,
        loader: ChildLoader,
    ) -> Result<Self> {
        let root = SingleMap::new(config.clone(), new_surface(size))?;
        let projection = root.topology().projection.map_or("mill", |p| p.kind.code());
        Ok(Self {
            root_config: config,
            options,
            maps: vec![root],
            history: vec![0],
            shown: 0,
            cache: HashMap::new(),
            loader,
            map_name: Rc::new(move |code| format!("{}_{projection}_en", code.to_lowercase())),
            fetch_key: Rc::new(move |code| format!("{}-{projection}-en.json", code.to_lowercase())),
            new_surface: Box::new(new_surface),
            image_loader: None,
            size,
            transition: None,
            loading: false,
            events: EventBus::new(),
        })
    }

    /// Override how child map names and fetch keys derive from region codes.
    pub fn with_naming(mut self, map_name: impl Fn(&str) -> String + 'static, fetch_key: impl Fn(&str) -> String + 'static) -> Self {
        self.map_name = Rc::new(map_name);
        self.fetch_key = Rc::new(fetch_key);
        self
    }

    /// Used by every map, including those already built.
    pub fn set_image_loader(&mut self, loader: Rc<dyn ImageLoader>) {
        for map in &mut self.maps {
            map.set_image_loader(Rc::clone(&loader));
        }
        self.image_loader = Some(loader);
    }

    pub fn options(&self) -> DrillDownOptions {
        self.options
    }

    /// The map in view.
    pub fn current(&self) -> &SingleMap<S> {
        &self.maps[self.shown]
    }

    pub fn current_mut(&mut self) -> &mut SingleMap<S> {
        &mut self.maps[self.shown]
    }

    pub fn depth(&self) -> usize {
        self.history.len()
    }

    /// Level of the map in view.
    pub fn level(&self) -> usize {
        match &self.transition {
            Some(Transition::Back { .. }) => self.history.len() + 1,
            _ => self.history.len(),
        }
    }

    /// Names of the maps on the history stack, root first.
    pub fn history(&self) -> Vec<&str> {
        self.history.iter().map(|&i| self.maps[i].name()).collect()
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// Whether the busy indicator is up: a child fetch outlasted the focus
    /// animation.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn back_visible(&self) -> bool {
        self.history.len() > 1
    }

    pub fn is_cached(&self, code: &str) -> bool {
        self.cache.contains_key(code)
    }

    pub fn events(&self) -> &[MapEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<MapEvent> {
        self.events.drain()
    }

    // Input, forwarded to the map in view

    pub fn pointer_down(&mut self, at: DVec2) {
        self.current_mut().pointer_down(at);
    }

    pub fn pointer_move(&mut self, at: DVec2) {
        self.current_mut().pointer_move(at);
        self.forward_events();
    }

    pub fn pointer_up(&mut self, at: DVec2) {
        self.current_mut().pointer_up(at);
        self.forward_events();
    }

    pub fn pointer_leave(&mut self) {
        self.current_mut().pointer_leave();
        self.forward_events();
    }

    pub fn click(&mut self, at: DVec2) {
        self.current_mut().click(at);
        self.forward_events();
    }

    pub fn wheel(&mut self, at: DVec2, delta_y: f64, delta_factor: f64) {
        self.current_mut().wheel(at, delta_y, delta_factor);
        self.forward_events();
    }

    pub fn pan(&mut self, delta: DVec2) {
        self.current_mut().pan(delta);
        self.forward_events();
    }

    pub fn zoom_in(&mut self) -> ZoomHandle {
        let handle = self.current_mut().zoom_in();
        self.forward_events();
        handle
    }

    pub fn zoom_out(&mut self) -> ZoomHandle {
        let handle = self.current_mut().zoom_out();
        self.forward_events();
        handle
    }

    pub fn reset_view(&mut self) {
        self.current_mut().reset_view();
        self.forward_events();
    }

    /// The container changed size; hidden maps catch up when revealed.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.size = DVec2::new(width, height);
        self.current_mut().resize(width, height);
        self.forward_events();
    }

    /// Move the map's events to the outbox, drilling into clicked regions.
    fn forward_events(&mut self) {
        let events = self.maps[self.shown].drain_events();
        for event in events {
            let clicked = match &event {
                MapEvent::ElementClick { kind: ElementKind::Region, id } => Some(id.clone()),
                _ => None,
            };
            self.events.emit(event);
            if let Some(code) = clicked {
                if let Err(e) = self.drill_down(&code) {
                    debug!("drill-down into `{code}` refused: {e}");
                }
            }
        }
    }

    /// Zoom onto region `code` and open its map. Returns `false` when the
    /// request is ignored: a transition is running or the deepest level is
    /// in view.
    pub fn drill_down(&mut self, code: &str) -> Result<bool> {
        if self.transition.is_some() {
            debug!("drill-down into `{code}` ignored, a transition is running");
            return Ok(false);
        }
        if self.history.len() >= self.options.max_level {
            debug!("drill-down into `{code}` ignored at level {}", self.history.len());
            return Ok(false);
        }
        let focus = self.maps[self.shown].set_focus(&FocusSpec::Code(code.to_string()), true)?;

        let map_name = (self.map_name)(code);
        let fetch: Fetch = match self.cache.get(code) {
            Some(topology) => future::ready(anyhow::Ok(Arc::clone(topology))).boxed_local(),
            None => {
                let request = ChildRequest {
                    code: code.to_string(),
                    map_name: map_name.clone(),
                    fetch_key: (self.fetch_key)(code),
                };
                debug!("fetching `{}` for region `{code}`", request.fetch_key);
                let load = (self.loader)(&request);
                async move { anyhow::Ok(topology::register_map(&request.map_name, load.await?)) }.boxed_local()
            }
        };

        self.transition = Some(Transition::Down {
            code: code.to_string(),
            map_name,
            focus,
            fetch: Some(fetch),
            fetched: None,
        });
        self.events.emit(MapEvent::DrillDownStarted { code: code.to_string() });
        self.advance()?;
        Ok(true)
    }

    /// Zoom the map in view out and return to its parent. Ignored at the
    /// root or while a transition is running.
    pub fn go_back(&mut self) -> bool {
        if self.transition.is_some() || self.history.len() <= 1 {
            debug!("go back ignored");
            return false;
        }
        let leaving = self.history.pop().unwrap_or(self.shown);
        let focus = self.maps[leaving].set_focus(&FocusSpec::full_extent(), true).unwrap_or_else(|e| {
            debug!("zoom out skipped: {e}");
            ZoomHandle::resolved()
        });
        self.transition = Some(Transition::Back { leaving, focus });
        self.forward_events();
        if let Err(e) = self.advance() {
            warn!("going back failed: {e}");
        }
        true
    }

    /// Advance animations and the running transition by one step. Returns
    /// whether anything visible changed.
    pub fn tick(&mut self) -> Result<bool> {
        let mut changed = self.maps[self.shown].tick();
        self.forward_events();
        if self.transition.is_some() {
            changed |= self.advance()?;
        }
        Ok(changed)
    }

    /// Whether the host should keep ticking.
    pub fn is_busy(&self) -> bool {
        self.transition.is_some() || self.maps[self.shown].is_busy()
    }

    fn advance(&mut self) -> Result<bool> {
        match self.transition.take() {
            Some(Transition::Down { code, map_name, focus, mut fetch, mut fetched }) => {
                if let Some(mut pending) = fetch.take() {
                    let mut cx = Context::from_waker(noop_waker_ref());
                    match pending.poll_unpin(&mut cx) {
                        Poll::Ready(result) => fetched = Some(result),
                        Poll::Pending => fetch = Some(pending),
                    }
                }
                let focused = focus.is_done();
                match fetched {
                    Some(Err(e)) => {
                        warn!("loading the map of `{code}` failed: {e:#}");
                        self.loading = false;
                        self.events.emit(MapEvent::DrillDownFailed { code, reason: format!("{e:#}") });
                        Ok(true)
                    }
                    Some(Ok(topology)) if focused => {
                        if let Err(e) = self.open_child(&code, &map_name) {
                            warn!("building the map of `{code}` failed: {e}");
                            self.loading = false;
                            self.events.emit(MapEvent::DrillDownFailed { code, reason: e.to_string() });
                            return Err(e);
                        }
                        self.cache.entry(code).or_insert(topology);
                        Ok(true)
                    }
                    fetched => {
                        let was_loading = self.loading;
                        self.loading = focused && fetch.is_some();
                        self.transition = Some(Transition::Down { code, map_name, focus, fetch, fetched });
                        Ok(was_loading != self.loading)
                    }
                }
            }
            Some(Transition::Back { leaving, focus }) => {
                if !focus.is_done() {
                    self.transition = Some(Transition::Back { leaving, focus });
                    return Ok(false);
                }
                self.maps[leaving].set_visible(false);
                self.shown = self.history.last().copied().unwrap_or(0);
                let (size, level) = (self.size, self.history.len());
                let map = &mut self.maps[self.shown];
                map.set_visible(true);
                map.resize(size.x, size.y);
                map.reset_view();
                let map_name = map.name().to_string();
                self.forward_events();
                self.events.emit(MapEvent::WentBack { map_name, level });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Hide the parent and show the child map, building it on first visit.
    fn open_child(&mut self, code: &str, map_name: &str) -> Result<()> {
        let child = match self.maps.iter().position(|m| m.name() == map_name) {
            Some(index) => {
                let map = &mut self.maps[index];
                map.set_visible(true);
                map.resize(self.size.x, self.size.y);
                map.reset_view();
                map.drain_events();
                index
            }
            None => {
                let config = self.root_config.inherit(map_name);
                let surface = (self.new_surface)(self.size);
                let map = match &self.image_loader {
                    Some(loader) => SingleMap::with_image_loader(config, surface, Rc::clone(loader))?,
                    None => SingleMap::new(config, surface)?,
                };
                self.maps.push(map);
                self.maps.len() - 1
            }
        };
        self.maps[self.shown].set_visible(false);
        self.maps[self.shown].drain_events();
        self.history.push(child);
        self.shown = child;
        self.loading = false;

        let level = self.history.len();
        info!("drilled into `{code}`, showing `{map_name}` at level {level}");
        self.events.emit(MapEvent::DrillDownCompleted {
            code: code.to_string(),
            map_name: map_name.to_string(),
            level,
        });
        Ok(())
    }
}

impl<S: Surface> std::fmt::Debug for DrillDown<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrillDown")
            .field("history", &self.history())
            .field("transitioning", &self.is_transitioning())
            .field("loading", &self.loading)
            .finish()
    }
}

/// Load child topologies from JSON files under a directory, named by fetch
/// key.
pub fn directory_loader(dir: impl Into<std::path::PathBuf>) -> ChildLoader {
    let dir = dir.into();
    Rc::new(move |request: &ChildRequest| {
        let path = dir.join(&request.fetch_key);
        async move {
            let mut bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let topology = MapTopology::from_json(&mut bytes)?;
            anyhow::Ok(topology)
        }
        .boxed_local()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;
    use crate::map::projection::{Projection, ProjectionKind};
    use crate::surface::SvgSurface;
    use crate::topology::{Inset, RegionShape, XY};
    use futures::channel::oneshot;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    fn two_squares(codes: [&str; 2]) -> MapTopology {
        let paths = BTreeMap::from([
            (codes[0].to_string(), RegionShape { path: "M0,0 L100,0 L100,100 L0,100 Z".into(), name: codes[0].into() }),
            (codes[1].to_string(), RegionShape { path: "M100,0 L200,0 L200,100 L100,100 Z".into(), name: codes[1].into() }),
        ]);
        MapTopology {
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
        }
    }

    type Pending = Rc<RefCell<Vec<oneshot::Sender<anyhow::Result<MapTopology>>>>>;

    /// A loader whose fetches resolve when the test says so.
    fn manual_loader(calls: Rc<Cell<usize>>, pending: Pending) -> ChildLoader {
        Rc::new(move |_request: &ChildRequest| {
            calls.set(calls.get() + 1);
            let (tx, rx) = oneshot::channel();
            pending.borrow_mut().push(tx);
            async move { rx.await? }.boxed_local()
        })
    }

    fn drill(root: &str, codes: [&str; 2], loader: ChildLoader) -> DrillDown<SvgSurface> {
        topology::register_map(root, two_squares(codes));
        let mut config = MapConfig::new(root);
        config.zoom_animate = false;
        DrillDown::new(
            config,
            DrillDownOptions { max_level: 2 },
            DVec2::new(400.0, 200.0),
            |size| SvgSurface::new(size.x, size.y),
            loader,
        )
        .unwrap()
    }

    fn settle(d: &mut DrillDown<SvgSurface>) {
        for _ in 0..200 {
            d.tick().unwrap();
        }
    }

    #[test]
    fn test_default_naming_uses_projection() {
        let calls = Rc::new(Cell::new(0));
        let requests = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&requests);
        let loader: ChildLoader = Rc::new(move |request: &ChildRequest| {
            calls.set(calls.get() + 1);
            seen.borrow_mut().push(request.clone());
            future::pending::<anyhow::Result<MapTopology>>().boxed_local()
        });
        let mut d = drill("dd_naming_root", ["NA1", "NA2"], loader);
        assert!(d.drill_down("NA1").unwrap());
        assert_eq!(
            requests.borrow()[0],
            ChildRequest { code: "NA1".into(), map_name: "na1_mill_en".into(), fetch_key: "na1-mill-en.json".into() }
        );
    }

    #[test]
    fn test_click_drills_down_and_back() {
        let calls = Rc::new(Cell::new(0));
        let pending: Pending = Rc::default();
        let mut d = drill("dd_click_root", ["CK1", "CK2"], manual_loader(calls.clone(), pending.clone()));
        assert!(!d.back_visible());

        d.pointer_down(DVec2::new(50.0, 50.0));
        d.pointer_up(DVec2::new(50.0, 50.0));
        assert!(d.is_transitioning());
        assert_eq!(calls.get(), 1);

        settle(&mut d);
        assert!(d.is_loading());
        pending.borrow_mut().remove(0).send(Ok(two_squares(["C1", "C2"]))).unwrap();
        settle(&mut d);

        assert!(!d.is_loading());
        assert_eq!(d.history(), vec!["dd_click_root", "ck1_mill_en"]);
        assert_eq!(d.level(), 2);
        assert!(d.back_visible());
        assert!(!d.maps[0].is_visible());
        assert!(d.events().iter().any(|e| matches!(e, MapEvent::DrillDownCompleted { level: 2, .. })));

        d.click(DVec2::new(50.0, 50.0));
        assert!(!d.is_transitioning(), "deepest level does not drill further");

        assert!(d.go_back());
        settle(&mut d);
        assert_eq!(d.depth(), 1);
        assert!(!d.back_visible());
        assert!(d.current().is_visible());
        assert_eq!(d.current().viewport().zoom(), 1.0, "the parent shows its full extent again");
        assert!(d.events().iter().any(|e| matches!(e, MapEvent::WentBack { level: 1, .. })));
        assert!(!d.go_back());
    }

    #[test]
    fn test_second_request_is_dropped_and_cache_skips_loader() {
        let calls = Rc::new(Cell::new(0));
        let pending: Pending = Rc::default();
        let mut d = drill("dd_cache_root", ["CA1", "CA2"], manual_loader(calls.clone(), pending.clone()));
        assert!(d.drill_down("CA1").unwrap());
        assert!(!d.drill_down("CA1").unwrap());
        assert_eq!(calls.get(), 1);

        pending.borrow_mut().remove(0).send(Ok(two_squares(["X1", "X2"]))).unwrap();
        settle(&mut d);
        assert!(d.is_cached("CA1"));
        d.go_back();
        settle(&mut d);

        assert!(d.drill_down("CA1").unwrap());
        settle(&mut d);
        assert_eq!(calls.get(), 1);
        assert_eq!(d.depth(), 2);
        assert_eq!(d.maps.len(), 2, "the child map is revealed, not rebuilt");
    }

    #[test]
    fn test_failed_fetch_keeps_parent() {
        let calls = Rc::new(Cell::new(0));
        let pending: Pending = Rc::default();
        let mut d = drill("dd_fail_root", ["FA1", "FA2"], manual_loader(calls, pending.clone()));
        d.drill_down("FA2").unwrap();
        pending.borrow_mut().remove(0).send(Err(anyhow::anyhow!("404"))).unwrap();
        settle(&mut d);

        assert!(!d.is_transitioning());
        assert!(!d.is_loading());
        assert_eq!(d.depth(), 1);
        assert!(d.current().is_visible());
        assert!(!d.is_cached("FA2"));
        assert!(d
            .events()
            .iter()
            .any(|e| matches!(e, MapEvent::DrillDownFailed { code, reason } if code == "FA2" && reason == "404")));
    }

    #[test]
    fn test_broken_child_clears_busy_and_keeps_parent() {
        let calls = Rc::new(Cell::new(0));
        let pending: Pending = Rc::default();
        let mut d = drill("dd_broken_root", ["BR1", "BR2"], manual_loader(calls, pending.clone()));
        d.drill_down("BR1").unwrap();
        settle(&mut d);
        assert!(d.is_loading());

        let mut broken = two_squares(["B1", "B2"]);
        broken.width = 0.0;
        pending.borrow_mut().remove(0).send(Ok(broken)).unwrap();
        assert!(matches!(d.tick(), Err(MapError::Topology(_))));

        assert!(!d.is_loading());
        assert!(!d.is_transitioning());
        assert_eq!(d.depth(), 1);
        assert!(d.current().is_visible());
        assert!(!d.is_cached("BR1"));
        assert!(d.events().iter().any(|e| matches!(e, MapEvent::DrillDownFailed { code, .. } if code == "BR1")));
    }

    #[test]
    fn test_unknown_code_is_an_error() {
        let calls = Rc::new(Cell::new(0));
        let mut d = drill("dd_unknown_root", ["UN1", "UN2"], manual_loader(calls, Rc::default()));
        assert!(matches!(d.drill_down("ZZ"), Err(MapError::EmptyFocus)));
        assert!(!d.is_transitioning());
    }
}
