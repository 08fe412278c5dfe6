//! The canonical native value model.
//!
//! Every value that crosses the scripting bridge, in either direction, is
//! first expressed as a [`NativeValue`]. Host types never cross directly.

use crate::capability::CapabilitySet;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

/// A host-side value that can be handed to or received from a script.
#[derive(Debug, Clone, Default)]
pub enum NativeValue {
    /// No value (`nil` in Lua, `null` in JSON).
    #[default]
    Absent,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Double precision float.
    Float(f64),
    /// UTF-8 text. Single characters are plain text too.
    Text(String),
    /// Arbitrary bytes that are not valid UTF-8 text.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    Sequence(Vec<NativeValue>),
    /// Key/value mapping.
    Map(NativeMap),
    /// Reference to a capability set, exposed to scripts as a read-only object.
    Capability(Arc<CapabilitySet>),
}

impl NativeValue {
    /// Name of the value kind, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeValue::Absent => "absent",
            NativeValue::Bool(_) => "bool",
            NativeValue::Integer(_) => "integer",
            NativeValue::Float(_) => "float",
            NativeValue::Text(_) => "text",
            NativeValue::Bytes(_) => "bytes",
            NativeValue::Sequence(_) => "sequence",
            NativeValue::Map(_) => "map",
            NativeValue::Capability(_) => "capability",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, NativeValue::Absent)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NativeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::Integer(i) => Some(*i as f64),
            NativeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[NativeValue]> {
        match self {
            NativeValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&NativeMap> {
        match self {
            NativeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_capability(&self) -> Option<&Arc<CapabilitySet>> {
        match self {
            NativeValue::Capability(set) => Some(set),
            _ => None,
        }
    }

    /// Applies the numeric normalization rule: a float with no fractional
    /// part that fits in an `i64` becomes an integer.
    pub fn from_number(n: f64) -> Self {
        // 2^63 is exactly representable; anything at or above it overflows i64.
        const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
        if n.is_finite() && n.fract() == 0.0 && n >= -I64_BOUND && n < I64_BOUND {
            NativeValue::Integer(n as i64)
        } else {
            NativeValue::Float(n)
        }
    }

    /// Convert from a JSON document.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => NativeValue::Absent,
            JsonValue::Bool(b) => NativeValue::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => NativeValue::Integer(i),
                None => NativeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => NativeValue::Text(s.clone()),
            JsonValue::Array(items) => {
                NativeValue::Sequence(items.iter().map(NativeValue::from_json).collect())
            }
            JsonValue::Object(fields) => NativeValue::Map(
                fields
                    .iter()
                    .map(|(k, v)| (NativeValue::Text(k.clone()), NativeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a JSON document.
    ///
    /// Map keys are rendered as strings. Capability references and
    /// non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            NativeValue::Absent | NativeValue::Capability(_) => JsonValue::Null,
            NativeValue::Bool(b) => JsonValue::Bool(*b),
            NativeValue::Integer(i) => JsonValue::Number((*i).into()),
            NativeValue::Float(f) => JsonNumber::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            NativeValue::Text(s) => JsonValue::String(s.clone()),
            NativeValue::Bytes(bytes) => {
                JsonValue::String(String::from_utf8_lossy(bytes).into_owned())
            }
            NativeValue::Sequence(items) => {
                JsonValue::Array(items.iter().map(NativeValue::to_json).collect())
            }
            NativeValue::Map(map) => {
                let mut object = JsonMap::new();
                for (key, value) in map.iter() {
                    object.insert(key.to_string(), value.to_json());
                }
                JsonValue::Object(object)
            }
        }
    }
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NativeValue::Absent, NativeValue::Absent) => true,
            (NativeValue::Bool(a), NativeValue::Bool(b)) => a == b,
            (NativeValue::Integer(a), NativeValue::Integer(b)) => a == b,
            (NativeValue::Float(a), NativeValue::Float(b)) => a == b,
            (NativeValue::Text(a), NativeValue::Text(b)) => a == b,
            (NativeValue::Bytes(a), NativeValue::Bytes(b)) => a == b,
            (NativeValue::Sequence(a), NativeValue::Sequence(b)) => a == b,
            (NativeValue::Map(a), NativeValue::Map(b)) => a == b,
            (NativeValue::Capability(a), NativeValue::Capability(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Absent => f.write_str("nil"),
            NativeValue::Bool(b) => write!(f, "{b}"),
            NativeValue::Integer(i) => write!(f, "{i}"),
            NativeValue::Float(n) => write!(f, "{n}"),
            NativeValue::Text(s) => f.write_str(s),
            NativeValue::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            NativeValue::Capability(set) => write!(f, "capability<{}>", set.name()),
            NativeValue::Sequence(_) | NativeValue::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Bool(b)
    }
}

impl From<i64> for NativeValue {
    fn from(i: i64) -> Self {
        NativeValue::Integer(i)
    }
}

impl From<i32> for NativeValue {
    fn from(i: i32) -> Self {
        NativeValue::Integer(i64::from(i))
    }
}

impl From<f64> for NativeValue {
    fn from(n: f64) -> Self {
        NativeValue::Float(n)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::Text(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::Text(s)
    }
}

impl From<Vec<NativeValue>> for NativeValue {
    fn from(items: Vec<NativeValue>) -> Self {
        NativeValue::Sequence(items)
    }
}

impl From<NativeMap> for NativeValue {
    fn from(map: NativeMap) -> Self {
        NativeValue::Map(map)
    }
}

impl From<Arc<CapabilitySet>> for NativeValue {
    fn from(set: Arc<CapabilitySet>) -> Self {
        NativeValue::Capability(set)
    }
}

impl<T: Into<NativeValue>> From<Option<T>> for NativeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(NativeValue::Absent)
    }
}

/// An insertion-ordered key/value mapping.
///
/// Lookups are linear. Equality ignores entry order, since script tables
/// carry no order of their own.
#[derive(Debug, Clone, Default)]
pub struct NativeMap {
    entries: Vec<(NativeValue, NativeValue)>,
}

impl NativeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing the value of an equal key in place.
    pub fn insert(&mut self, key: impl Into<NativeValue>, value: impl Into<NativeValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &NativeValue) -> Option<&NativeValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Shorthand for looking up a text key.
    pub fn get_str(&self, key: &str) -> Option<&NativeValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NativeValue, &NativeValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl PartialEq for NativeMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}

impl<K: Into<NativeValue>, V: Into<NativeValue>> FromIterator<(K, V)> for NativeMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = NativeMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for NativeMap {
    type Item = (NativeValue, NativeValue);
    type IntoIter = std::vec::IntoIter<(NativeValue, NativeValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_normalization() {
        assert_eq!(NativeValue::from_number(3.0), NativeValue::Integer(3));
        assert_eq!(NativeValue::from_number(-0.0), NativeValue::Integer(0));
        assert_eq!(NativeValue::from_number(2.5), NativeValue::Float(2.5));
        assert!(matches!(
            NativeValue::from_number(f64::INFINITY),
            NativeValue::Float(_)
        ));
        assert!(matches!(NativeValue::from_number(1e19), NativeValue::Float(_)));
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let a: NativeMap = [("x", 1), ("y", 2)].into_iter().collect();
        let b: NativeMap = [("y", 2), ("x", 1)].into_iter().collect();
        let c: NativeMap = [("y", 2), ("x", 3)].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_map_insert_replaces() {
        let mut map = NativeMap::new();
        map.insert("k", 1);
        map.insert("k", 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_str("k"), Some(&NativeValue::Integer(2)));
    }

    #[test]
    fn test_json_conversion() {
        let doc = json!({
            "name": "calendar",
            "tags": ["a", "b"],
            "count": 3,
            "ratio": 0.5,
            "missing": null,
        });

        let native = NativeValue::from_json(&doc);
        let map = native.as_map().unwrap();
        assert_eq!(map.get_str("name"), Some(&NativeValue::from("calendar")));
        assert_eq!(map.get_str("count"), Some(&NativeValue::Integer(3)));
        assert_eq!(map.get_str("ratio"), Some(&NativeValue::Float(0.5)));
        assert_eq!(map.get_str("missing"), Some(&NativeValue::Absent));

        assert_eq!(native.to_json(), doc);
    }

    #[test]
    fn test_non_text_keys_render_as_strings() {
        let map: NativeMap = [(NativeValue::Integer(7), NativeValue::Bool(true))]
            .into_iter()
            .collect();
        assert_eq!(NativeValue::Map(map).to_json(), json!({"7": true}));
    }
}
