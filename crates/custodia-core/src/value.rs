//! Recursive tagged-union value, used anywhere the platform needs dynamic,
//! path-addressable data: config entries, event-bus payloads, sensitive-path
//! filtering. Mirrors the dynamic object/field access the config store and
//! event bus both need without reaching for `serde_json::Value` directly, so
//! path traversal stays a single, testable implementation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Fetch the value at a dotted path, e.g. `"card.pan"`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                Value::Map(m) => m.get(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set the value at a dotted path, creating intermediate maps as needed.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::set_path_rec(self, &segments, value);
    }

    fn set_path_rec(node: &mut Value, segments: &[&str], value: Value) {
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        if !matches!(node, Value::Map(_)) {
            *node = Value::Map(BTreeMap::new());
        }
        let Value::Map(map) = node else { unreachable!() };
        if rest.is_empty() {
            map.insert(head.to_string(), value);
        } else {
            let child = map.entry(head.to_string()).or_insert(Value::Null);
            Self::set_path_rec(child, rest, value);
        }
    }

    /// Return a clone of `self` with every path in `paths` removed. Paths
    /// that don't exist are silently ignored, matching the config store's
    /// "strip if present" filtering semantics.
    pub fn strip_paths(&self, paths: &[String]) -> Value {
        let mut out = self.clone();
        for path in paths {
            out.remove_path(path);
        }
        out
    }

    fn remove_path(&mut self, path: &str) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::remove_path_rec(self, &segments);
    }

    fn remove_path_rec(node: &mut Value, segments: &[&str]) -> bool {
        let Value::Map(map) = node else { return false };
        let Some((head, rest)) = segments.split_first() else {
            return false;
        };
        if rest.is_empty() {
            return map.remove(*head).is_some();
        }
        if let Some(child) = map.get_mut(*head) {
            Self::remove_path_rec(child, rest)
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        let mut inner = BTreeMap::new();
        inner.insert("pan".to_string(), Value::String("4111111111111111".to_string()));
        inner.insert("last4".to_string(), Value::String("1111".to_string()));
        let mut root = BTreeMap::new();
        root.insert("card".to_string(), Value::Map(inner));
        root.insert("label".to_string(), Value::String("primary".to_string()));
        Value::Map(root)
    }

    #[test]
    fn get_path_traverses_nested_maps() {
        let v = sample();
        assert_eq!(
            v.get_path("card.pan"),
            Some(&Value::String("4111111111111111".to_string()))
        );
        assert_eq!(v.get_path("card.missing"), None);
        assert_eq!(v.get_path("missing.nested"), None);
    }

    #[test]
    fn strip_paths_removes_only_named_paths() {
        let v = sample();
        let stripped = v.strip_paths(&["card.pan".to_string()]);
        assert_eq!(stripped.get_path("card.pan"), None);
        assert_eq!(
            stripped.get_path("card.last4"),
            Some(&Value::String("1111".to_string()))
        );
        assert_eq!(
            stripped.get_path("label"),
            Some(&Value::String("primary".to_string()))
        );
    }

    #[test]
    fn set_path_creates_intermediate_maps() {
        let mut v = Value::Map(BTreeMap::new());
        v.set_path("a.b.c", Value::Int(42));
        assert_eq!(v.get_path("a.b.c"), Some(&Value::Int(42)));
    }
}
