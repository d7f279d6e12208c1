//! Data series: values bound to regions or markers, turned into one visual
//! attribute through a [`Scale`].

use log::debug;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::Result;
use crate::map::legend::LegendConfig;
use crate::scale::{Normalize, Scale, ScaleSpec, Tick};
use crate::style::{Attr, AttrValue, Attribute};

pub use crate::scale::SeriesValue;

/// Override for one element's attribute; `None` drops the override.
pub type AttrUpdate = (String, Option<Attr<AttrValue>>);

/// The elements a series styles. Implemented by the map for its regions and
/// its markers.
pub trait ElementStyles {
    /// Current override of `attr` on element `id`, or `None` when the
    /// element does not exist.
    fn current(&self, id: &str, attr: Attribute) -> Option<Option<Attr<AttrValue>>>;

    /// Apply a batch of overrides. The batch lands as a whole.
    fn apply(&mut self, attr: Attribute, updates: Vec<AttrUpdate>);
}

fn default_attribute() -> Attribute {
    Attribute::Fill
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesConfig {
    #[serde(default = "default_attribute")]
    pub attribute: Attribute,
    #[serde(default)]
    pub scale: Option<ScaleSpec>,
    #[serde(default)]
    pub normalize_function: Normalize,
    #[serde(default)]
    pub values: HashMap<String, SeriesValue>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub legend: Option<LegendConfig>,
}

impl SeriesConfig {
    pub fn new(attribute: Attribute, scale: Option<ScaleSpec>) -> Self {
        Self {
            attribute,
            scale,
            normalize_function: Normalize::Linear,
            values: HashMap::new(),
            min: None,
            max: None,
            legend: None,
        }
    }
}

#[derive(Debug)]
pub struct DataSeries {
    attribute: Attribute,
    scale: Scale,
    values: HashMap<String, SeriesValue>,
    pinned_min: Option<f64>,
    pinned_max: Option<f64>,
    /// Each touched element's override from before the series first styled it.
    baseline: HashMap<String, Option<Attr<AttrValue>>>,
    legend: Option<LegendConfig>,
}

impl DataSeries {
    pub fn new(config: SeriesConfig, elements: &mut dyn ElementStyles) -> Result<Self> {
        let scale = Scale::new(
            config.attribute,
            config.scale.as_ref(),
            config.normalize_function.clone(),
            config.min.unwrap_or(0.0),
            config.max.unwrap_or(0.0),
        )?;
        let mut series = Self {
            attribute: config.attribute,
            scale,
            values: HashMap::new(),
            pinned_min: config.min,
            pinned_max: config.max,
            baseline: HashMap::new(),
            legend: config.legend,
        };
        if !config.values.is_empty() {
            series.set_values(config.values, elements);
        }
        Ok(series)
    }

    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    pub fn values(&self) -> &HashMap<String, SeriesValue> {
        &self.values
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    pub fn legend(&self) -> Option<&LegendConfig> {
        self.legend.as_ref()
    }

    pub fn ticks(&self) -> Vec<Tick> {
        self.scale.ticks()
    }

    /// Bind `values`, recompute unpinned bounds over everything bound and
    /// restyle every bound element in one batch.
    pub fn set_values(&mut self, values: HashMap<String, SeriesValue>, elements: &mut dyn ElementStyles) {
        let updates = self.merge_values(values, elements);
        elements.apply(self.attribute, updates);
    }

    /// Revert every element this series styled to its pre-series override.
    pub fn clear(&mut self, elements: &mut dyn ElementStyles) {
        let updates = self.take_baseline();
        elements.apply(self.attribute, updates);
    }

    /// Clear, then bind `values`, as one batch.
    pub fn clear_and_set(&mut self, values: HashMap<String, SeriesValue>, elements: &mut dyn ElementStyles) {
        let mut updates: HashMap<String, Option<Attr<AttrValue>>> = self.take_baseline().into_iter().collect();
        let restored = Restored { inner: &*elements, restored: &updates, attr: self.attribute };
        let fresh = self.merge_values(values, &restored);
        updates.extend(fresh);
        elements.apply(self.attribute, updates.into_iter().collect());
    }

    pub fn set_scale(&mut self, stops: &[AttrValue], elements: &mut dyn ElementStyles) -> Result<()> {
        if let Some(numeric) = self.scale.as_numeric_mut() {
            numeric.set_stops(stops)?;
        } else {
            let spec = ScaleSpec::Stops(stops.to_vec());
            self.scale = Scale::new(self.attribute, Some(&spec), Normalize::Linear, 0.0, 0.0)?;
        }
        self.refresh(elements);
        Ok(())
    }

    pub fn set_normalize(&mut self, normalize: Normalize, elements: &mut dyn ElementStyles) {
        if let Some(numeric) = self.scale.as_numeric_mut() {
            numeric.set_normalize(normalize);
        }
        self.refresh(elements);
    }

    /// Drop bookkeeping for an element that no longer exists.
    pub fn forget(&mut self, id: &str) {
        self.values.remove(id);
        self.baseline.remove(id);
    }

    fn refresh(&mut self, elements: &mut dyn ElementStyles) {
        let updates = self.merge_values(HashMap::new(), elements);
        elements.apply(self.attribute, updates);
    }

    fn take_baseline(&mut self) -> Vec<AttrUpdate> {
        self.values.clear();
        self.baseline.drain().collect()
    }

    fn merge_values(&mut self, values: HashMap<String, SeriesValue>, elements: &dyn ElementStyles) -> Vec<AttrUpdate> {
        for (id, value) in values {
            if !self.baseline.contains_key(&id) {
                match elements.current(&id, self.attribute) {
                    Some(current) => {
                        self.baseline.insert(id.clone(), current);
                    }
                    None => {
                        debug!("series value for unknown element `{id}` ignored");
                        continue;
                    }
                }
            }
            self.values.insert(id, value);
        }

        self.update_bounds();

        self.values
            .iter()
            .map(|(id, value)| {
                let styled = match self.scale.value(value) {
                    Some(v) => Some(Attr::Set(v)),
                    None => self.baseline.get(id).cloned().flatten(),
                };
                (id.clone(), styled)
            })
            .collect()
    }

    fn update_bounds(&mut self) {
        let (pinned_min, pinned_max) = (self.pinned_min, self.pinned_max);
        let (min, max) = self
            .values
            .values()
            .filter_map(SeriesValue::as_number)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let Some(numeric) = self.scale.as_numeric_mut() else {
            return;
        };
        if min > max {
            return;
        }
        numeric.set_min(pinned_min.unwrap_or(min));
        numeric.set_max(pinned_max.unwrap_or(max));
    }
}

/// View of the elements as they will be once pending restorations land.
struct Restored<'a> {
    inner: &'a dyn ElementStyles,
    restored: &'a HashMap<String, Option<Attr<AttrValue>>>,
    attr: Attribute,
}

impl ElementStyles for Restored<'_> {
    fn current(&self, id: &str, attr: Attribute) -> Option<Option<Attr<AttrValue>>> {
        match self.restored.get(id) {
            Some(value) if attr == self.attr => {
                self.inner.current(id, attr)?;
                Some(value.clone())
            }
            _ => self.inner.current(id, attr),
        }
    }

    fn apply(&mut self, _attr: Attribute, _updates: Vec<AttrUpdate>) {}
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::style::Style;

    /// In-memory element set recording how many batches were applied.
    #[derive(Default)]
    pub(crate) struct Elements {
        pub styles: HashMap<String, Style>,
        pub batches: usize,
    }

    impl Elements {
        pub fn with(ids: &[&str]) -> Self {
            Self {
                styles: ids.iter().map(|id| (id.to_string(), Style::default())).collect(),
                batches: 0,
            }
        }

        pub fn fill(&self, id: &str) -> Option<String> {
            self.styles[id].fill.as_ref().and_then(|f| f.as_set().cloned())
        }
    }

    impl ElementStyles for Elements {
        fn current(&self, id: &str, attr: Attribute) -> Option<Option<Attr<AttrValue>>> {
            self.styles.get(id).map(|s| s.get(attr))
        }

        fn apply(&mut self, attr: Attribute, updates: Vec<AttrUpdate>) {
            self.batches += 1;
            for (id, value) in updates {
                if let Some(style) = self.styles.get_mut(&id) {
                    style.set(attr, value);
                }
            }
        }
    }

    fn values(pairs: &[(&str, SeriesValue)]) -> HashMap<String, SeriesValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn color_config() -> SeriesConfig {
        SeriesConfig::new(
            Attribute::Fill,
            Some(ScaleSpec::Stops(vec!["#C8EEFF".into(), "#0071A4".into()])),
        )
    }

    #[test]
    fn test_bounds_computed_from_bound_values() {
        let mut elements = Elements::with(&["A", "B", "C"]);
        let mut series = DataSeries::new(color_config(), &mut elements).unwrap();
        series.set_values(values(&[("A", 0.0.into()), ("B", 100.0.into()), ("C", 50.0.into())]), &mut elements);
        assert_eq!(elements.fill("A").as_deref(), Some("#c8eeff"));
        assert_eq!(elements.fill("B").as_deref(), Some("#0071a4"));
        assert_eq!(elements.fill("C").as_deref(), Some("#64b0d2"));
        assert_eq!(elements.batches, 1);
    }

    #[test]
    fn test_unparsable_value_falls_back_to_pre_series_style() {
        let mut elements = Elements::with(&["A", "B"]);
        elements.styles.get_mut("B").unwrap().set(Attribute::Fill, Some(Attr::Set("#123456".into())));
        let mut series = DataSeries::new(color_config(), &mut elements).unwrap();
        series.set_values(values(&[("A", 1.0.into()), ("B", "n/a".into())]), &mut elements);
        assert_eq!(elements.fill("B").as_deref(), Some("#123456"));
    }

    #[test]
    fn test_clear_and_set_then_clear_restores_original() {
        let mut elements = Elements::with(&["A", "B"]);
        elements.styles.get_mut("A").unwrap().set(Attribute::Fill, Some(Attr::Set("#abcdef".into())));
        let mut series = DataSeries::new(color_config(), &mut elements).unwrap();
        series.set_values(values(&[("A", 1.0.into()), ("B", 2.0.into())]), &mut elements);
        series.clear_and_set(values(&[("A", 5.0.into())]), &mut elements);
        assert_eq!(series.values().len(), 1);
        assert_eq!(elements.fill("B"), None);
        series.clear(&mut elements);
        assert_eq!(elements.fill("A").as_deref(), Some("#abcdef"));
        assert_eq!(elements.fill("B"), None);
        assert!(elements.styles["B"].fill.is_none());
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let mut elements = Elements::with(&["A"]);
        let mut series = DataSeries::new(color_config(), &mut elements).unwrap();
        series.set_values(values(&[("ZZ", 1.0.into())]), &mut elements);
        assert!(series.values().is_empty());
    }

    #[test]
    fn test_pinned_bounds_are_kept() {
        let mut elements = Elements::with(&["A"]);
        let mut config = color_config();
        config.min = Some(0.0);
        config.max = Some(200.0);
        let mut series = DataSeries::new(config, &mut elements).unwrap();
        series.set_values(values(&[("A", 100.0.into())]), &mut elements);
        assert_eq!(elements.fill("A").as_deref(), Some("#64b0d2"));
    }

    #[test]
    fn test_ordinal_series() {
        let mut elements = Elements::with(&["A", "B"]);
        let spec = ScaleSpec::Keyed(vec![("hot".into(), "#ff0000".into()), ("cold".into(), "#0000ff".into())]);
        let mut series = DataSeries::new(SeriesConfig::new(Attribute::Fill, Some(spec)), &mut elements).unwrap();
        series.set_values(values(&[("A", "cold".into()), ("B", "warm".into())]), &mut elements);
        assert_eq!(elements.fill("A").as_deref(), Some("#0000ff"));
        assert_eq!(elements.fill("B"), None);
    }
}
