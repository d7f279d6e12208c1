//! Typed style records and the four-state merge shared by regions, markers
//! and their labels.
//!
//! A [`Style`] is a partial patch: every attribute is either absent (inherit),
//! [`Attr::Set`] or [`Attr::Unset`] (a JSON `null`, which removes the key from
//! the merged result). [`StyleAttributes`] is the fully merged record handed to
//! a rendering surface.

use glam::DVec2;
use serde::{Deserialize, Deserializer};
use std::fmt;

/// One attribute entry in a style patch.
#[derive(Debug, Clone, PartialEq)]
pub enum Attr<T> {
    Set(T),
    Unset,
}

impl<T> Attr<T> {
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Attr::Set(v) => Some(v),
            Attr::Unset => None,
        }
    }
}

/// `null` deserialises to [`Attr::Unset`]; a missing key stays `None`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Attr<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(match Option::<T>::deserialize(deserializer)? {
        Some(v) => Attr::Set(v),
        None => Attr::Unset,
    }))
}

/// Image attribute: a bare URL or a URL with a pixel offset from the anchor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Url(String),
    WithOffset {
        url: String,
        #[serde(default)]
        offset: [f64; 2],
    },
}

impl ImageRef {
    pub fn url(&self) -> &str {
        match self {
            ImageRef::Url(url) | ImageRef::WithOffset { url, .. } => url,
        }
    }

    pub fn offset(&self) -> DVec2 {
        match self {
            ImageRef::Url(_) => DVec2::ZERO,
            ImageRef::WithOffset { offset, .. } => DVec2::from_array(*offset),
        }
    }
}

/// Whether a fill value names an image file rather than a colour.
pub fn is_image_url(value: &str) -> bool {
    value.rsplit_once('.').is_some_and(|(stem, ext)| {
        !stem.is_empty()
            && (3..=4).contains(&ext.len())
            && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

macro_rules! style_fields {
    ($($field:ident: $ty:ty => $key:literal),* $(,)?) => {
        /// Partial style patch, deserialised from the hyphenated attribute names.
        #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
        #[serde(default)]
        pub struct Style {
            $(
                #[serde(rename = $key, deserialize_with = "nullable")]
                pub $field: Option<Attr<$ty>>,
            )*
        }

        /// Merged attributes as painted by a surface.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct StyleAttributes {
            $(pub $field: Option<$ty>,)*
        }

        impl Style {
            /// Overlay `other` onto `self`, key by key.
            pub fn merge(&mut self, other: &Style) {
                $(
                    if let Some(v) = &other.$field {
                        self.$field = Some(v.clone());
                    }
                )*
            }

            /// Apply this patch to merged attributes.
            pub fn apply_to(&self, attrs: &mut StyleAttributes) {
                $(
                    match &self.$field {
                        Some(Attr::Set(v)) => attrs.$field = Some(v.clone()),
                        Some(Attr::Unset) => attrs.$field = None,
                        None => {}
                    }
                )*
            }

            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())*
            }
        }
    };
}

style_fields! {
    fill: String => "fill",
    fill_opacity: f64 => "fill-opacity",
    stroke: String => "stroke",
    stroke_width: f64 => "stroke-width",
    stroke_opacity: f64 => "stroke-opacity",
    opacity: f64 => "opacity",
    r: f64 => "r",
    image: ImageRef => "image",
    cursor: String => "cursor",
    font_family: String => "font-family",
    font_size: f64 => "font-size",
    font_weight: String => "font-weight",
}

fn set<T>(v: T) -> Option<Attr<T>> {
    Some(Attr::Set(v))
}

/// Attributes a data series can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Attribute {
    #[serde(rename = "fill")]
    Fill,
    #[serde(rename = "stroke")]
    Stroke,
    #[serde(rename = "fill-opacity")]
    FillOpacity,
    #[serde(rename = "stroke-width")]
    StrokeWidth,
    #[serde(rename = "stroke-opacity")]
    StrokeOpacity,
    #[serde(rename = "opacity")]
    Opacity,
    #[serde(rename = "r")]
    R,
    #[serde(rename = "image")]
    Image,
}

impl Attribute {
    pub fn name(self) -> &'static str {
        match self {
            Attribute::Fill => "fill",
            Attribute::Stroke => "stroke",
            Attribute::FillOpacity => "fill-opacity",
            Attribute::StrokeWidth => "stroke-width",
            Attribute::StrokeOpacity => "stroke-opacity",
            Attribute::Opacity => "opacity",
            Attribute::R => "r",
            Attribute::Image => "image",
        }
    }

    /// Colour attributes interpolate in RGB space.
    pub fn is_color(self) -> bool {
        matches!(self, Attribute::Fill | Attribute::Stroke)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed attribute value produced by a scale.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
    Image(ImageRef),
}

impl AttrValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(s) => s.trim().parse().ok(),
            AttrValue::Image(_) => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            AttrValue::Number(n) => n.to_string(),
            AttrValue::Text(s) => s.clone(),
            AttrValue::Image(image) => image.url().to_string(),
        }
    }

    pub fn as_image(&self) -> Option<ImageRef> {
        match self {
            AttrValue::Image(image) => Some(image.clone()),
            AttrValue::Text(s) => Some(ImageRef::Url(s.clone())),
            AttrValue::Number(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

fn convert<T>(value: &Attr<AttrValue>, f: impl FnOnce(&AttrValue) -> Option<T>) -> Attr<T> {
    match value {
        Attr::Set(v) => f(v).map_or(Attr::Unset, Attr::Set),
        Attr::Unset => Attr::Unset,
    }
}

impl Style {
    /// Read one series-drivable attribute from the patch.
    pub fn get(&self, attr: Attribute) -> Option<Attr<AttrValue>> {
        fn lift<T>(a: &Option<Attr<T>>, f: impl FnOnce(&T) -> AttrValue) -> Option<Attr<AttrValue>> {
            a.as_ref().map(|a| match a {
                Attr::Set(v) => Attr::Set(f(v)),
                Attr::Unset => Attr::Unset,
            })
        }
        match attr {
            Attribute::Fill => lift(&self.fill, |s| AttrValue::Text(s.clone())),
            Attribute::Stroke => lift(&self.stroke, |s| AttrValue::Text(s.clone())),
            Attribute::FillOpacity => lift(&self.fill_opacity, |n| AttrValue::Number(*n)),
            Attribute::StrokeWidth => lift(&self.stroke_width, |n| AttrValue::Number(*n)),
            Attribute::StrokeOpacity => lift(&self.stroke_opacity, |n| AttrValue::Number(*n)),
            Attribute::Opacity => lift(&self.opacity, |n| AttrValue::Number(*n)),
            Attribute::R => lift(&self.r, |n| AttrValue::Number(*n)),
            Attribute::Image => lift(&self.image, |i| AttrValue::Image(i.clone())),
        }
    }

    /// Write one attribute. `None` drops the key from the patch entirely.
    /// Values of the wrong shape for the attribute become [`Attr::Unset`].
    pub fn set(&mut self, attr: Attribute, value: Option<Attr<AttrValue>>) {
        let Some(value) = value else {
            self.clear(attr);
            return;
        };
        match attr {
            Attribute::Fill => self.fill = Some(convert(&value, |v| Some(v.as_text()))),
            Attribute::Stroke => self.stroke = Some(convert(&value, |v| Some(v.as_text()))),
            Attribute::FillOpacity => self.fill_opacity = Some(convert(&value, AttrValue::as_number)),
            Attribute::StrokeWidth => self.stroke_width = Some(convert(&value, AttrValue::as_number)),
            Attribute::StrokeOpacity => {
                self.stroke_opacity = Some(convert(&value, AttrValue::as_number))
            }
            Attribute::Opacity => self.opacity = Some(convert(&value, AttrValue::as_number)),
            Attribute::R => self.r = Some(convert(&value, AttrValue::as_number)),
            Attribute::Image => self.image = Some(convert(&value, AttrValue::as_image)),
        }
    }

    fn clear(&mut self, attr: Attribute) {
        match attr {
            Attribute::Fill => self.fill = None,
            Attribute::Stroke => self.stroke = None,
            Attribute::FillOpacity => self.fill_opacity = None,
            Attribute::StrokeWidth => self.stroke_width = None,
            Attribute::StrokeOpacity => self.stroke_opacity = None,
            Attribute::Opacity => self.opacity = None,
            Attribute::R => self.r = None,
            Attribute::Image => self.image = None,
        }
    }
}

impl StyleAttributes {
    pub fn get(&self, attr: Attribute) -> Option<AttrValue> {
        match attr {
            Attribute::Fill => self.fill.clone().map(AttrValue::Text),
            Attribute::Stroke => self.stroke.clone().map(AttrValue::Text),
            Attribute::FillOpacity => self.fill_opacity.map(AttrValue::Number),
            Attribute::StrokeWidth => self.stroke_width.map(AttrValue::Number),
            Attribute::StrokeOpacity => self.stroke_opacity.map(AttrValue::Number),
            Attribute::Opacity => self.opacity.map(AttrValue::Number),
            Attribute::R => self.r.map(AttrValue::Number),
            Attribute::Image => self.image.clone().map(AttrValue::Image),
        }
    }

    /// Fill naming an image file, painted as a tiled pattern.
    pub fn fill_pattern(&self) -> Option<&str> {
        self.fill.as_deref().filter(|f| is_image_url(f))
    }
}

/// The four visual states of an element.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StyleSet {
    pub initial: Style,
    pub hover: Style,
    pub selected: Style,
    pub selected_hover: Style,
}

impl StyleSet {
    /// Deep-merge `overrides` onto `self`, state by state and key by key.
    pub fn merged(mut self, overrides: &StyleSet) -> StyleSet {
        self.initial.merge(&overrides.initial);
        self.hover.merge(&overrides.hover);
        self.selected.merge(&overrides.selected);
        self.selected_hover.merge(&overrides.selected_hover);
        self
    }

    pub fn region_defaults() -> StyleSet {
        StyleSet {
            initial: Style {
                fill: set("white".into()),
                fill_opacity: set(1.0),
                stroke: set("none".into()),
                stroke_width: set(0.0),
                stroke_opacity: set(1.0),
                ..Style::default()
            },
            hover: Style {
                fill_opacity: set(0.8),
                cursor: set("pointer".into()),
                ..Style::default()
            },
            selected: Style {
                fill: set("yellow".into()),
                ..Style::default()
            },
            selected_hover: Style::default(),
        }
    }

    pub fn label_defaults() -> StyleSet {
        StyleSet {
            initial: Style {
                font_family: set("Verdana".into()),
                font_size: set(12.0),
                font_weight: set("bold".into()),
                cursor: set("default".into()),
                fill: set("black".into()),
                ..Style::default()
            },
            hover: Style {
                cursor: set("pointer".into()),
                ..Style::default()
            },
            ..StyleSet::default()
        }
    }

    pub fn marker_defaults() -> StyleSet {
        StyleSet {
            initial: Style {
                fill: set("grey".into()),
                stroke: set("#505050".into()),
                fill_opacity: set(1.0),
                stroke_width: set(1.0),
                stroke_opacity: set(1.0),
                r: set(5.0),
                ..Style::default()
            },
            hover: Style {
                stroke: set("black".into()),
                stroke_width: set(2.0),
                cursor: set("pointer".into()),
                ..Style::default()
            },
            selected: Style {
                fill: set("blue".into()),
                ..Style::default()
            },
            selected_hover: Style::default(),
        }
    }
}

/// Merge the style an element paints with, from its state flags.
///
/// Order: initial, current override, hover, selected, then selected+hover
/// when both flags are set. Later entries win; [`Attr::Unset`] removes a key.
pub fn merge_style(set: &StyleSet, current: &Style, hovered: bool, selected: bool) -> StyleAttributes {
    let mut attrs = StyleAttributes::default();
    set.initial.apply_to(&mut attrs);
    current.apply_to(&mut attrs);
    if hovered {
        set.hover.apply_to(&mut attrs);
    }
    if selected {
        set.selected.apply_to(&mut attrs);
        if hovered {
            set.selected_hover.apply_to(&mut attrs);
        }
    }
    attrs
}
