//! Legends: a series' ticks drawn as samples with labels on an
//! untransformed layer.

use glam::DVec2;
use serde::Deserialize;
use std::fmt;
use std::rc::Rc;

use crate::scale::{Tick, TickLabel};
use crate::style::{is_image_url, AttrValue, Attribute, ImageRef, StyleAttributes};
use crate::surface::{NodeId, Surface, TextAlign};

const PADDING: f64 = 10.0;
const SWATCH: f64 = 20.0;
const GAP: f64 = 5.0;
const LINE: f64 = 16.0;
const FONT_SIZE: f64 = 12.0;
/// Rough advance of one label character at [`FONT_SIZE`].
const CHAR_WIDTH: f64 = 7.0;

/// Rewrites tick labels before they are drawn.
#[derive(Clone)]
pub struct LabelRender(pub Rc<dyn Fn(&TickLabel) -> String>);

impl fmt::Debug for LabelRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LabelRender(..)")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LegendConfig {
    pub title: Option<String>,
    /// Stacked along the right edge; otherwise along the bottom edge.
    pub vertical: bool,
    #[serde(skip)]
    pub label_render: Option<LabelRender>,
}

#[derive(Debug, Clone, PartialEq)]
enum Sample {
    Swatch(String),
    Circle(f64),
    Image(ImageRef),
    None,
}

impl Sample {
    fn new(attribute: Attribute, value: &AttrValue) -> Self {
        match attribute {
            Attribute::Fill | Attribute::Stroke => Sample::Swatch(value.as_text()),
            Attribute::R => value.as_number().map_or(Sample::None, Sample::Circle),
            Attribute::Image => value.as_image().map_or(Sample::None, Sample::Image),
            _ => Sample::None,
        }
    }

    fn size(&self) -> DVec2 {
        match self {
            Sample::Circle(r) => DVec2::splat(2.0 * r.max(0.0)),
            Sample::None => DVec2::new(0.0, LINE),
            Sample::Swatch(_) | Sample::Image(_) => DVec2::splat(SWATCH),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    sample: Sample,
    label: String,
}

impl Entry {
    fn label_width(&self) -> f64 {
        self.label.chars().count() as f64 * CHAR_WIDTH
    }
}

/// A legend ready to be laid out and drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    title: Option<String>,
    vertical: bool,
    entries: Vec<Entry>,
}

impl Legend {
    pub fn new(config: &LegendConfig, attribute: Attribute, ticks: &[Tick]) -> Self {
        let entries = ticks
            .iter()
            .map(|tick| Entry {
                sample: Sample::new(attribute, &tick.value),
                label: match &config.label_render {
                    Some(render) => (render.0)(&tick.label),
                    None => tick.label.to_string(),
                },
            })
            .collect();
        Self { title: config.title.clone(), vertical: config.vertical, entries }
    }

    pub fn is_vertical(&self) -> bool {
        self.vertical
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    fn title_height(&self) -> f64 {
        if self.title.is_some() {
            LINE + GAP
        } else {
            0.0
        }
    }

    fn title_width(&self) -> f64 {
        self.title.as_ref().map_or(0.0, |t| t.chars().count() as f64 * CHAR_WIDTH)
    }

    pub fn size(&self) -> DVec2 {
        let body = if self.vertical {
            self.entries.iter().fold(DVec2::ZERO, |acc, e| {
                let sample = e.sample.size();
                let row = sample.y.max(LINE);
                DVec2::new(acc.x.max(sample.x + GAP + e.label_width()), acc.y + row + GAP)
            })
        } else {
            let tallest = self.entries.iter().map(|e| e.sample.size().y).fold(0.0, f64::max);
            let width = self
                .entries
                .iter()
                .map(|e| e.sample.size().x.max(e.label_width()) + GAP)
                .sum::<f64>();
            DVec2::new(width, tallest + GAP + LINE)
        };
        DVec2::new(body.x.max(self.title_width()), body.y + self.title_height())
    }

    /// Draw into `group` with the top-left corner at `origin`. Circle
    /// samples borrow the marker stroke and fill.
    pub fn draw<S: Surface + ?Sized>(&self, surface: &mut S, group: NodeId, origin: DVec2, marker: &StyleAttributes) {
        let text = StyleAttributes {
            fill: Some(String::from("black")),
            font_family: Some(String::from("Verdana")),
            font_size: Some(FONT_SIZE),
            ..StyleAttributes::default()
        };
        if let Some(title) = &self.title {
            surface.add_text(group, None, origin + DVec2::new(0.0, LINE / 2.0), title, TextAlign::Start, &text);
        }

        let mut cursor = origin + DVec2::new(0.0, self.title_height());
        for entry in &self.entries {
            let sample = entry.sample.size();
            self.draw_sample(surface, group, &entry.sample, cursor, marker);
            if self.vertical {
                let row = sample.y.max(LINE);
                let at = cursor + DVec2::new(sample.x + GAP, row / 2.0);
                surface.add_text(group, None, at, &entry.label, TextAlign::Start, &text);
                cursor.y += row + GAP;
            } else {
                let column = sample.x.max(entry.label_width());
                let tallest = self.size().y - self.title_height() - GAP - LINE;
                let at = cursor + DVec2::new(column / 2.0, tallest + GAP + LINE / 2.0);
                surface.add_text(group, None, at, &entry.label, TextAlign::Middle, &text);
                cursor.x += column + GAP;
            }
        }
    }

    fn draw_sample<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        group: NodeId,
        sample: &Sample,
        corner: DVec2,
        marker: &StyleAttributes,
    ) {
        let size = sample.size();
        match sample {
            Sample::Swatch(color) => {
                let d = format!(
                    "M{},{} L{},{} L{},{} L{},{} Z",
                    corner.x,
                    corner.y,
                    corner.x + size.x,
                    corner.y,
                    corner.x + size.x,
                    corner.y + size.y,
                    corner.x,
                    corner.y + size.y
                );
                let style = StyleAttributes {
                    fill: Some(color.clone()),
                    stroke: is_image_url(color).then(|| String::from("none")),
                    ..StyleAttributes::default()
                };
                surface.add_path(group, None, &d, &style);
            }
            Sample::Circle(r) => {
                let style = StyleAttributes {
                    fill: marker.fill.clone(),
                    stroke: marker.stroke.clone(),
                    stroke_width: marker.stroke_width,
                    r: Some(*r),
                    ..StyleAttributes::default()
                };
                surface.add_circle(group, None, corner + size / 2.0, &style);
            }
            Sample::Image(image) => {
                let style = StyleAttributes { image: Some(image.clone()), ..StyleAttributes::default() };
                surface.add_image(group, None, corner + size / 2.0, &style);
            }
            Sample::None => {}
        }
    }
}

/// Top-left corners for `legends` inside a container: vertical legends
/// stack down the right edge, horizontal ones leftwards along the bottom.
pub fn layout(legends: &[Legend], container: DVec2) -> Vec<DVec2> {
    let mut top = PADDING;
    let mut right = container.x - PADDING;
    legends
        .iter()
        .map(|legend| {
            let size = legend.size();
            if legend.vertical {
                let at = DVec2::new(container.x - PADDING - size.x, top);
                top += size.y + PADDING;
                at
            } else {
                right -= size.x;
                let at = DVec2::new(right, container.y - PADDING - size.y);
                right -= PADDING;
                at
            }
        })
        .collect()
}
