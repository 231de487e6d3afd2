//! Node parameter storage.
//!
//! String key → typed value, insertion-ordered so saved graphs diff cleanly.
//! Values serialize untagged: `{"rows": 4, "spacing": 32.0, "texture": "dot"}`.
//! Hashing goes through `to_bits` for floats and walks keys in sorted order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Generic parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vec2([f32; 2]),
}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use ParamValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Bool(v) => v.hash(state),
            Int(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Str(v) => v.hash(state),
            Vec2(arr) => arr.iter().for_each(|f| f.to_bits().hash(state)),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<[f32; 2]> for ParamValue {
    fn from(v: [f32; 2]) -> Self {
        ParamValue::Vec2(v)
    }
}

/// Parameter container of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    map: IndexMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    /// Builder-style set, for default parameter tables.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.map.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.map.get(key) {
            Some(ParamValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer value; whole floats are accepted.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.map.get(key) {
            Some(ParamValue::Int(v)) => Some(*v),
            Some(ParamValue::Float(v)) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.map.get(key) {
            Some(ParamValue::Float(v)) => Some(*v),
            Some(ParamValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key) {
            Some(ParamValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_vec2(&self, key: &str) -> Option<[f32; 2]> {
        match self.map.get(key) {
            Some(ParamValue::Vec2(v)) => Some(*v),
            _ => None,
        }
    }

    // Defaults

    pub fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    pub fn get_float_or(&self, key: &str, default: f64) -> f64 {
        self.get_float(key).unwrap_or(default)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    pub fn get_str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_str(key).unwrap_or(default)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.map.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.map.iter()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Fill keys missing here from `defaults`, keeping existing values.
    pub fn merge_defaults(&mut self, defaults: &Params) {
        for (key, value) in defaults.iter() {
            if !self.map.contains_key(key) {
                self.map.insert(key.clone(), value.clone());
            }
        }
    }

    /// Order-independent hash of every parameter.
    pub fn hash_all(&self) -> u64 {
        let mut keys: Vec<&String> = self.map.keys().collect();
        keys.sort_unstable();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for key in keys {
            key.hash(&mut hasher);
            if let Some(val) = self.map.get(key) {
                val.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access_and_coercion() {
        let p = Params::new()
            .with("rows", 4)
            .with("spacing", 32.5)
            .with("whole", 3.0)
            .with("texture", "dot");

        assert_eq!(p.get_int("rows"), Some(4));
        assert_eq!(p.get_float("rows"), Some(4.0));
        assert_eq!(p.get_int("whole"), Some(3));
        assert_eq!(p.get_int("spacing"), None);
        assert_eq!(p.get_str("texture"), Some("dot"));
        assert_eq!(p.get_float_or("missing", 1.5), 1.5);
    }

    #[test]
    fn test_json_untagged() {
        let p: Params = serde_json::from_str(r#"{"amount": 500, "scale": 1.5, "on": true}"#).unwrap();
        assert_eq!(p.get("amount"), Some(&ParamValue::Int(500)));
        assert_eq!(p.get_float("scale"), Some(1.5));
        assert_eq!(p.get_bool("on"), Some(true));
    }

    #[test]
    fn test_hash_ignores_order() {
        let a = Params::new().with("x", 1).with("y", 2);
        let b = Params::new().with("y", 2).with("x", 1);
        assert_eq!(a.hash_all(), b.hash_all());
        assert_ne!(a.hash_all(), Params::new().with("x", 2).with("y", 2).hash_all());
    }

    #[test]
    fn test_merge_defaults_keeps_existing() {
        let mut p = Params::new().with("amount", 10);
        p.merge_defaults(&Params::new().with("amount", 0).with("count", 1));
        assert_eq!(p.get_int("amount"), Some(10));
        assert_eq!(p.get_int("count"), Some(1));
    }
}
