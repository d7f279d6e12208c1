use anyhow::Result;
use choropleth::drilldown::{directory_loader, DrillDown, DrillDownOptions};
use choropleth::map::{MapConfig, MapEvent};
use choropleth::surface::{BrailleFrame, BrailleSurface};
use choropleth::topology;
use glam::DVec2;
use log::debug;
use std::path::Path;

use crate::data;

/// Registry name of the root map.
pub const WORLD: &str = "world";

/// Keyboard pan step in braille pixels.
const PAN_STEP: f64 = 20.0;

/// Wheel notches are reported as one unit; this many units per notch.
const WHEEL_DELTA_FACTOR: f64 = 100.0;

/// Terminal viewer state: the drill-down stack plus pointer bookkeeping
pub struct App {
    pub maps: DrillDown<BrailleSurface>,
    pub should_quit: bool,
    /// Last mouse position in terminal cells
    pub mouse_pos: Option<(u16, u16)>,
    /// Frame counter for the busy spinner
    pub frame: u64,
    /// Most recent selection change, for the status bar
    pub last_selection: Vec<String>,
}

impl App {
    pub fn new(width: usize, height: usize, data_dir: &Path) -> Result<Self> {
        topology::register_map(WORLD, data::load_world(data_dir)?);
        let config = match data::load_config(data_dir)? {
            Some(config) => config,
            None => {
                let mut config = MapConfig::new(WORLD);
                config.regions_selectable = true;
                config.markers = data::cities();
                config
            }
        };

        let size = pixel_size(width, height);
        let maps = DrillDown::new(
            config,
            DrillDownOptions { max_level: 2 },
            size,
            |size| BrailleSurface::new(size.x, size.y),
            directory_loader(data_dir),
        )?;

        Ok(Self {
            maps,
            should_quit: false,
            mouse_pos: None,
            frame: 0,
            last_selection: Vec::new(),
        })
    }

    /// Update the map size when the terminal resizes
    pub fn resize(&mut self, width: usize, height: usize) {
        let size = pixel_size(width, height);
        self.maps.resize(size.x, size.y);
    }

    /// Pan the map by whole steps
    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.maps.pan(DVec2::new(dx as f64, dy as f64) * PAN_STEP);
    }

    pub fn zoom_in(&mut self) {
        self.maps.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.maps.zoom_out();
    }

    /// Wheel zoom towards a screen position (terminal column/row)
    pub fn wheel_at(&mut self, col: u16, row: u16, notches: f64) {
        self.maps.wheel(cell_to_pixel(col, row), notches, WHEEL_DELTA_FACTOR);
    }

    pub fn go_back(&mut self) {
        self.maps.go_back();
    }

    pub fn reset(&mut self) {
        self.maps.reset_view();
    }

    /// Request quit
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn mouse_down(&mut self, col: u16, row: u16) {
        self.mouse_pos = Some((col, row));
        self.maps.pointer_down(cell_to_pixel(col, row));
    }

    /// Pointer motion, pressed or not
    pub fn mouse_move(&mut self, col: u16, row: u16) {
        self.mouse_pos = Some((col, row));
        self.maps.pointer_move(cell_to_pixel(col, row));
    }

    pub fn mouse_up(&mut self, col: u16, row: u16) {
        self.maps.pointer_up(cell_to_pixel(col, row));
    }

    /// Advance animations; call once per frame
    pub fn tick(&mut self) -> Result<()> {
        self.frame = self.frame.wrapping_add(1);
        self.maps.tick()?;
        for event in self.maps.drain_events() {
            match event {
                MapEvent::ElementSelected { selection, .. } => self.last_selection = selection,
                MapEvent::DrillDownCompleted { .. } | MapEvent::WentBack { .. } => self.last_selection.clear(),
                other => debug!("{other:?}"),
            }
        }
        Ok(())
    }

    pub fn render_map(&self) -> BrailleFrame {
        self.maps.current().surface().render()
    }

    /// Current zoom level as a string
    pub fn zoom_level(&self) -> String {
        format!("{:.1}x", self.maps.current().viewport().zoom())
    }

    /// Geographic position under the mouse, if the map is projected
    pub fn pointer_coords(&self) -> Option<String> {
        let (col, row) = self.mouse_pos?;
        let at = cell_to_pixel(col, row);
        let point = self.maps.current().point_to_lat_lng(at.x, at.y).ok()??;
        Some(format!(
            "{:.1}°{}, {:.1}°{}",
            point.lat.abs(),
            if point.lat >= 0.0 { "N" } else { "S" },
            point.lng.abs(),
            if point.lng >= 0.0 { "E" } else { "W" }
        ))
    }

    pub fn spinner(&self) -> char {
        const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
        FRAMES[(self.frame / 4 % 4) as usize]
    }
}

/// Braille pixels of the map area inside the border, above the status bar
fn pixel_size(width: usize, height: usize) -> DVec2 {
    let inner_width = width.saturating_sub(2);
    let inner_height = height.saturating_sub(3);
    DVec2::new((inner_width * 2) as f64, (inner_height * 4) as f64)
}

/// Terminal cell to braille pixel, at the cell centre. Accounts for the
/// one-cell border.
fn cell_to_pixel(col: u16, row: u16) -> DVec2 {
    let px = col.saturating_sub(1) as f64 * 2.0 + 1.0;
    let py = row.saturating_sub(1) as f64 * 4.0 + 2.0;
    DVec2::new(px, py)
}
