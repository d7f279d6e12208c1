//! Scales turning series values into visual attribute values, plus legend
//! ticks.

use glam::DVec3;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::rc::Rc;

use crate::color::Rgb;
use crate::error::{MapError, Result};
use crate::path::EPSILON;
use crate::style::{AttrValue, Attribute};

/// Target tick count for numeric legends.
const TICK_TARGET: f64 = 5.0;

/// A raw value bound to an element by a data series.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SeriesValue {
    Number(f64),
    Text(String),
}

impl SeriesValue {
    /// Numeric reading; strings are parsed, NaN counts as missing.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            SeriesValue::Number(n) => *n,
            SeriesValue::Text(s) => s.trim().parse().ok()?,
        };
        (!n.is_nan()).then_some(n)
    }

    /// Lookup key for ordinal scales; integral numbers print without a fraction.
    pub fn key(&self) -> String {
        match self {
            SeriesValue::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            SeriesValue::Number(n) => n.to_string(),
            SeriesValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for SeriesValue {
    fn from(n: f64) -> Self {
        SeriesValue::Number(n)
    }
}

impl From<&str> for SeriesValue {
    fn from(s: &str) -> Self {
        SeriesValue::Text(s.to_string())
    }
}

/// Scale configuration: an array of stops or a key → value dictionary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScaleSpec {
    Stops(Vec<AttrValue>),
    Keyed(#[serde(deserialize_with = "ordered_map")] Vec<(String, AttrValue)>),
}

/// Keep dictionary keys in document order; ordinal legends list them that way.
fn ordered_map<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, AttrValue)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Ordered;

    impl<'de> Visitor<'de> for Ordered {
        type Value = Vec<(String, AttrValue)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of keys to scale values")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut entries = Vec::new();
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(Ordered)
}

/// Transform applied to values and to the min/max bounds before interpolating.
#[derive(Clone, Default)]
pub enum Normalize {
    #[default]
    Linear,
    /// `x^0.2`, spreading out heavily skewed data.
    Polynomial,
    Custom(Rc<dyn Fn(f64) -> f64>),
}

impl Normalize {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Normalize::Linear => value,
            Normalize::Polynomial => value.powf(0.2),
            Normalize::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Normalize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalize::Linear => f.write_str("Linear"),
            Normalize::Polynomial => f.write_str("Polynomial"),
            Normalize::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for Normalize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        match name.as_str() {
            "linear" => Ok(Normalize::Linear),
            "polynomial" => Ok(Normalize::Polynomial),
            other => Err(de::Error::unknown_variant(other, &["linear", "polynomial"])),
        }
    }
}

/// Legend tick label.
#[derive(Debug, Clone, PartialEq)]
pub enum TickLabel {
    Number(f64),
    Key(String),
}

impl fmt::Display for TickLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickLabel::Number(n) => write!(f, "{}", SeriesValue::Number(*n).key()),
            TickLabel::Key(k) => f.write_str(k),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub label: TickLabel,
    pub value: AttrValue,
}

/// A scale, chosen by the shape of its configuration.
#[derive(Debug, Clone)]
pub enum Scale {
    /// Values are already attribute values.
    Simple,
    Ordinal(OrdinalScale),
    Numeric(NumericScale),
}

impl Scale {
    pub fn new(
        attribute: Attribute,
        spec: Option<&ScaleSpec>,
        normalize: Normalize,
        min: f64,
        max: f64,
    ) -> Result<Scale> {
        match spec {
            None => Ok(Scale::Simple),
            Some(ScaleSpec::Keyed(entries)) => Ok(Scale::Ordinal(OrdinalScale::new(entries.clone()))),
            Some(ScaleSpec::Stops(stops)) => {
                NumericScale::new(attribute, stops, normalize, min, max).map(Scale::Numeric)
            }
        }
    }

    /// Attribute value for a series value; `None` when it cannot be scaled.
    pub fn value(&self, value: &SeriesValue) -> Option<AttrValue> {
        match self {
            Scale::Simple => Some(match value {
                SeriesValue::Number(n) => AttrValue::Number(*n),
                SeriesValue::Text(s) => AttrValue::Text(s.clone()),
            }),
            Scale::Ordinal(scale) => scale.value(&value.key()),
            Scale::Numeric(scale) => value.as_number().map(|n| scale.value(n)),
        }
    }

    pub fn ticks(&self) -> Vec<Tick> {
        match self {
            Scale::Simple => Vec::new(),
            Scale::Ordinal(scale) => scale.ticks(),
            Scale::Numeric(scale) => scale.ticks(),
        }
    }

    pub fn as_numeric_mut(&mut self) -> Option<&mut NumericScale> {
        match self {
            Scale::Numeric(scale) => Some(scale),
            _ => None,
        }
    }
}

/// Exact dictionary lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct OrdinalScale {
    entries: Vec<(String, AttrValue)>,
}

impl OrdinalScale {
    pub fn new(entries: Vec<(String, AttrValue)>) -> Self {
        Self { entries }
    }

    pub fn value(&self, key: &str) -> Option<AttrValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    /// One tick per key, in key order.
    pub fn ticks(&self) -> Vec<Tick> {
        self.entries
            .iter()
            .map(|(k, v)| Tick { label: TickLabel::Key(k.clone()), value: v.clone() })
            .collect()
    }
}

/// Piecewise-linear interpolation along a polyline of stops, parameterised
/// by cumulative arc length. Colour stops live in RGB space, other stops are
/// one-dimensional.
#[derive(Debug, Clone)]
pub struct NumericScale {
    stops: Vec<DVec3>,
    color: bool,
    round: bool,
    normalize: Normalize,
    clear_min: f64,
    clear_max: f64,
}

impl NumericScale {
    pub fn new(attribute: Attribute, stops: &[AttrValue], normalize: Normalize, min: f64, max: f64) -> Result<Self> {
        let color = attribute.is_color();
        let stops = parse_stops(stops, color)?;
        Ok(Self {
            stops,
            color,
            round: !matches!(
                attribute,
                Attribute::FillOpacity | Attribute::StrokeOpacity | Attribute::Opacity
            ),
            normalize,
            clear_min: min,
            clear_max: max,
        })
    }

    pub fn set_stops(&mut self, stops: &[AttrValue]) -> Result<()> {
        self.stops = parse_stops(stops, self.color)?;
        Ok(())
    }

    pub fn set_min(&mut self, min: f64) {
        self.clear_min = min;
    }

    pub fn set_max(&mut self, max: f64) {
        self.clear_max = max;
    }

    pub fn set_normalize(&mut self, normalize: Normalize) {
        self.normalize = normalize;
    }

    /// Bounds as configured, before normalisation.
    pub fn bounds(&self) -> (f64, f64) {
        (self.clear_min, self.clear_max)
    }

    pub fn value(&self, value: f64) -> AttrValue {
        let min = self.normalize.apply(self.clear_min);
        let max = self.normalize.apply(self.clear_max);
        let value = self.normalize.apply(value).clamp(min.min(max), max.max(min));
        self.output(self.interpolate(value, min, max))
    }

    fn interpolate(&self, value: f64, min: f64, max: f64) -> DVec3 {
        let last = self.stops.len() - 1;
        let span = max - min;
        if span.abs() < EPSILON {
            return self.stops[last];
        }

        let lengths: Vec<f64> = self.stops.windows(2).map(|w| (w[1] - w[0]).length()).collect();
        let full: f64 = lengths.iter().sum();

        let mut p = (value - min) / span * full;
        let mut i = 0;
        while i < last && p - lengths[i] >= 0.0 {
            p -= lengths[i];
            i += 1;
        }
        if i == last {
            return self.stops[last];
        }
        self.stops[i] + (self.stops[i + 1] - self.stops[i]) * (p / lengths[i])
    }

    fn output(&self, v: DVec3) -> AttrValue {
        if self.color {
            AttrValue::Text(Rgb::from_vec(v).to_hex())
        } else if self.round {
            AttrValue::Number(v.x.round())
        } else {
            AttrValue::Number(v.x)
        }
    }

    /// Human-friendly ticks: step is 1, 2, 5 or 10 times a power of ten
    /// aiming at five ticks, the axis snaps outward to whole steps, and the
    /// outermost ticks carry the values of the true min and max.
    pub fn ticks(&self) -> Vec<Tick> {
        let (min, max) = (self.clear_min, self.clear_max);
        let span = max - min;
        if !(span > EPSILON) {
            return vec![
                Tick { label: TickLabel::Number(min), value: self.value(min) },
                Tick { label: TickLabel::Number(max), value: self.value(max) },
            ];
        }

        let mut step = 10f64.powf((span / TICK_TARGET).log10().floor());
        let err = TICK_TARGET / span * step;
        if err <= 0.15 {
            step *= 10.0;
        } else if err <= 0.35 {
            step *= 5.0;
        } else if err <= 0.75 {
            step *= 2.0;
        }

        let lo = (min / step).floor() * step;
        let hi = (max / step).ceil() * step;
        let count = ((hi - lo) / step).round() as usize;

        (0..=count)
            .map(|i| {
                let tick = lo + i as f64 * step;
                let v = if i == 0 {
                    min
                } else if i == count {
                    max
                } else {
                    tick
                };
                Tick { label: TickLabel::Number(tick), value: self.value(v) }
            })
            .collect()
    }
}

fn parse_stops(stops: &[AttrValue], color: bool) -> Result<Vec<DVec3>> {
    if stops.len() < 2 {
        return Err(MapError::Scale(format!("need at least two stops, got {}", stops.len())));
    }
    stops
        .iter()
        .map(|stop| {
            let parsed = if color {
                Rgb::parse(&stop.as_text()).map(Rgb::to_vec)
            } else {
                stop.as_number().map(|n| DVec3::new(n, 0.0, 0.0))
            };
            parsed.ok_or_else(|| MapError::Scale(format!("unusable stop {stop:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> NumericScale {
        let stops = [AttrValue::from("#C8EEFF"), AttrValue::from("#0071A4")];
        NumericScale::new(Attribute::Fill, &stops, Normalize::Linear, 0.0, 100.0).unwrap()
    }

    #[test]
    fn test_color_endpoints_and_midpoint() {
        let scale = colors();
        assert_eq!(scale.value(0.0), AttrValue::from("#c8eeff"));
        assert_eq!(scale.value(100.0), AttrValue::from("#0071a4"));
        // (100, 175.5, 209.5) rounded per channel.
        assert_eq!(scale.value(50.0), AttrValue::from("#64b0d2"));
    }

    #[test]
    fn test_values_outside_bounds_clamp() {
        let scale = colors();
        assert_eq!(scale.value(-20.0), scale.value(0.0));
        assert_eq!(scale.value(250.0), scale.value(100.0));
    }

    #[test]
    fn test_collapsed_bounds_use_last_stop() {
        let stops = [AttrValue::Number(2.0), AttrValue::Number(10.0)];
        let scale = NumericScale::new(Attribute::R, &stops, Normalize::Linear, 10.0, 10.0).unwrap();
        assert_eq!(scale.value(10.0), AttrValue::Number(10.0));
    }

    #[test]
    fn test_piecewise_arc_length() {
        // Segments of length 10 and 30: a quarter of the range ends the first.
        let stops = [AttrValue::Number(0.0), AttrValue::Number(10.0), AttrValue::Number(-20.0)];
        let scale = NumericScale::new(Attribute::R, &stops, Normalize::Linear, 0.0, 40.0).unwrap();
        assert_eq!(scale.value(10.0), AttrValue::Number(10.0));
        assert_eq!(scale.value(25.0), AttrValue::Number(-5.0));
    }

    #[test]
    fn test_ticks_keep_true_extremes() {
        let mut scale = colors();
        scale.set_min(3.0);
        scale.set_max(97.0);
        let ticks = scale.ticks();
        assert!(ticks.len() >= 2);
        assert_eq!(ticks[0].value, scale.value(3.0));
        assert_eq!(ticks[ticks.len() - 1].value, scale.value(97.0));
        let labels: Vec<_> = ticks.iter().map(|t| t.label.to_string()).collect();
        assert_eq!(labels, ["0", "20", "40", "60", "80", "100"]);
    }

    #[test]
    fn test_ticks_degenerate_span() {
        let mut scale = colors();
        scale.set_min(5.0);
        scale.set_max(5.0);
        assert_eq!(scale.ticks().len(), 2);
    }

    #[test]
    fn test_polynomial_normalises_bounds_too() {
        let stops = [AttrValue::Number(0.0), AttrValue::Number(100.0)];
        let scale = NumericScale::new(Attribute::R, &stops, Normalize::Polynomial, 0.0, 1.0).unwrap();
        // 0.5^0.2 ≈ 0.87
        assert_eq!(scale.value(0.5), AttrValue::Number(87.0));
    }

    #[test]
    fn test_opacity_is_not_rounded() {
        let stops = [AttrValue::Number(0.2), AttrValue::Number(1.0)];
        let scale = NumericScale::new(Attribute::FillOpacity, &stops, Normalize::Linear, 0.0, 1.0).unwrap();
        match scale.value(0.5) {
            AttrValue::Number(n) => assert!((n - 0.6).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ordinal_lookup_and_ticks_in_key_order() {
        let mut json = br##"{"zeta": "#ff0000", "alpha": "#00ff00"}"##.to_vec();
        let spec: ScaleSpec = simd_json::serde::from_slice(&mut json).unwrap();
        let scale = Scale::new(Attribute::Fill, Some(&spec), Normalize::Linear, 0.0, 0.0).unwrap();
        assert_eq!(scale.value(&"alpha".into()), Some(AttrValue::from("#00ff00")));
        assert_eq!(scale.value(&"beta".into()), None);
        let keys: Vec<_> = scale.ticks().into_iter().map(|t| t.label.to_string()).collect();
        assert_eq!(keys, ["zeta", "alpha"]);
    }

    #[test]
    fn test_numeric_rejects_unparsable_series_value() {
        let scale = Scale::Numeric(colors());
        assert_eq!(scale.value(&"n/a".into()), None);
        assert_eq!(scale.value(&"50".into()), Some(AttrValue::from("#64b0d2")));
    }

    #[test]
    fn test_single_stop_is_an_error() {
        let stops = [AttrValue::Number(1.0)];
        assert!(NumericScale::new(Attribute::R, &stops, Normalize::Linear, 0.0, 1.0).is_err());
    }
}
