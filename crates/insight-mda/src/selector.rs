use insight_crossfilter::{Key, Value};
use std::fmt;

/// Stable, class-name-safe identifier for a selected value: `in_` followed by the value's string
/// form with every character outside `[A-Za-z0-9]` replaced by `_`.
///
/// Every widget derives the same selector for the same value, which is how a selection made in
/// one widget is matched against elements rendered by another.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionSelector(String);

impl DimensionSelector {
    pub fn from_value(value: &Value) -> Self {
        Self::from_label(&value.to_string())
    }

    pub fn from_key(key: &Key) -> Self {
        Self::from_label(&key.to_string())
    }

    fn from_label(label: &str) -> Self {
        let mut out = String::with_capacity(label.len() + 3);
        out.push_str("in_");
        out.extend(
            label
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }),
        );
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DimensionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Value> for DimensionSelector {
    fn from(value: &Value) -> Self {
        Self::from_value(value)
    }
}

impl From<&Key> for DimensionSelector {
    fn from(key: &Key) -> Self {
        Self::from_key(key)
    }
}
