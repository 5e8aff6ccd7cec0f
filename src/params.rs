//! Parameter descriptions.
//!
//! Every task publishes a static set of [`ParameterDescription`]s at
//! construction.  They are aggregated by the task manager into a
//! [`DescriptionMap`] that sizes the shared buffer and the store registry
//! and is handed to the consumer side on `DESCRIBE`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `source → parameter → description`.
pub type DescriptionMap = BTreeMap<String, BTreeMap<String, ParameterDescription>>;

/// Category tag.  Drives downstream scaling and formatting only; nothing
/// inside the acquisition core branches on it except the storage
/// multiplier chosen when a store file is first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[serde(rename = "temp")]
    Temperature,
    #[serde(rename = "humid")]
    Humidity,
    Light,
    #[serde(rename = "moist")]
    Moisture,
    #[serde(rename = "valve_pos")]
    ValvePosition,
    HeatLevel,
    FanLevel,
    LightLevel,
    #[serde(other)]
    Unknown,
}

impl Category {
    /// Factor mapping a real value to the stored integer for a freshly
    /// created store.  Existing stores keep whatever they recorded.
    pub const fn compression_multiplier(self) -> i64 {
        match self {
            Self::Temperature => 100,
            Self::Humidity => 10,
            _ => 1,
        }
    }
}

/// Scalar kind of the sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Float,
    Int,
    Bool,
}

/// Static metadata for one measurable or controllable quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescription {
    pub name: String,
    pub display_text: String,
    pub category: Category,
    pub kind: ScalarKind,
    pub min: f64,
    pub max: f64,
    pub units: String,
    /// Name of the task that owns this parameter.
    pub source: String,
}

impl ParameterDescription {
    /// Float parameter with an empty `source`; the owning task stamps it
    /// with [`with_source`](Self::with_source).
    pub fn float(
        name: &str,
        display_text: &str,
        category: Category,
        min: f64,
        max: f64,
        units: &str,
    ) -> Self {
        Self {
            name: name.to_owned(),
            display_text: display_text.to_owned(),
            category,
            kind: ScalarKind::Float,
            min,
            max,
            units: units.to_owned(),
            source: String::new(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: &str) -> Self {
        source.clone_into(&mut self.source);
        self
    }
}

/// Insert `descs` for `source` into `map`.
pub fn insert_all(map: &mut DescriptionMap, source: &str, descs: &[ParameterDescription]) {
    let entry = map.entry(source.to_owned()).or_default();
    for d in descs {
        entry.insert(d.name.clone(), d.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipliers_follow_category() {
        assert_eq!(Category::Temperature.compression_multiplier(), 100);
        assert_eq!(Category::Humidity.compression_multiplier(), 10);
        assert_eq!(Category::Light.compression_multiplier(), 1);
        assert_eq!(Category::ValvePosition.compression_multiplier(), 1);
    }

    #[test]
    fn category_uses_short_tags() {
        let json = serde_json::to_string(&Category::Temperature).unwrap();
        assert_eq!(json, "\"temp\"");
        let c: Category = serde_json::from_str("\"heat_level\"").unwrap();
        assert_eq!(c, Category::HeatLevel);
        let c: Category = serde_json::from_str("\"pressure\"").unwrap();
        assert_eq!(c, Category::Unknown);
    }

    #[test]
    fn insert_all_groups_by_source() {
        let mut map = DescriptionMap::new();
        let d = ParameterDescription::float("Temp", "Temperature", Category::Temperature, -10.0, 40.0, "C")
            .with_source("probe");
        insert_all(&mut map, "probe", &[d]);
        assert_eq!(map["probe"]["Temp"].source, "probe");
    }
}
