#![forbid(unsafe_code)]

use ordered_float::OrderedFloat;
use std::fmt;
use std::sync::Arc;

/// A field value inside a [`crate::Record`], or the result of a slicing function.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    Text(Arc<str>),
    /// A multi-valued field (e.g. a list of tags).
    List(Arc<[Value]>),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Whether a list value contains an element equal to `key`.
    ///
    /// Scalars never contain anything.
    pub fn contains(&self, key: &Key) -> bool {
        match self {
            Value::List(items) => items
                .iter()
                .any(|item| Key::from_scalar(item).as_ref() == Some(key)),
            _ => false,
        }
    }

    /// Group keys derived from this value.
    ///
    /// A scalar yields exactly one key. A list yields one key per distinct scalar element, in
    /// first-seen order; nested lists are skipped.
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Value::List(items) => {
                let mut keys: Vec<Key> = Vec::with_capacity(items.len());
                for key in items.iter().filter_map(Key::from_scalar) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                keys
            }
            scalar => vec![Key::from_value(scalar)],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(Arc::from(value))
    }
}

impl From<Arc<str>> for Value {
    fn from(value: Arc<str>) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<&Key> for Value {
    fn from(key: &Key) -> Self {
        match key {
            Key::Null => Value::Null,
            Key::Boolean(b) => Value::Boolean(*b),
            Key::Number(n) => Value::Number(n.into_inner()),
            Key::Text(s) => Value::Text(s.clone()),
        }
    }
}

/// A hashable, totally ordered group key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Null,
    Boolean(bool),
    Number(OrderedFloat<f64>),
    Text(Arc<str>),
}

impl Key {
    /// Converts a scalar value; lists have no single key.
    pub fn from_scalar(value: &Value) -> Option<Key> {
        match value {
            Value::Null => Some(Key::Null),
            Value::Boolean(b) => Some(Key::Boolean(*b)),
            Value::Number(n) => Some(Key::Number(OrderedFloat(*n))),
            Value::Text(s) => Some(Key::Text(s.clone())),
            Value::List(_) => None,
        }
    }

    /// Like [`Key::from_scalar`], but a list collapses to its string form.
    pub fn from_value(value: &Value) -> Key {
        Key::from_scalar(value).unwrap_or_else(|| Key::Text(Arc::from(value.to_string())))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(n.into_inner()),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => Ok(()),
            Key::Boolean(b) => write!(f, "{b}"),
            Key::Number(n) => write!(f, "{}", n.into_inner()),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(Arc::from(value))
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Key::Number(OrderedFloat(value))
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Boolean(value)
    }
}
