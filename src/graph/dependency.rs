//! Dependency descriptors and evaluation-context queries.

use std::fmt;

use bitflags::bitflags;
use indexmap::IndexMap;

use super::path::NodePath;

bitflags! {
    /// What a node's last result was observed to depend on, beyond its inputs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DependencyKinds: u8 {
        /// Read the time cursor (directly or through an input)
        const TIME = 1 << 0;
        const TEXTURE = 1 << 1;
        const BEATMAP = 1 << 2;
        const AUDIO = 1 << 3;
        /// Result differs per element index
        const ELEMENT_INDEX = 1 << 4;
        /// Read a value injected by an ancestor; never persisted across jobs
        const PARENT_VALUE = 1 << 5;
    }
}

impl DependencyKinds {
    /// Kinds invalidated when assets reload.
    pub const ASSETS: DependencyKinds = DependencyKinds::TEXTURE
        .union(DependencyKinds::BEATMAP)
        .union(DependencyKinds::AUDIO);
}

/// One evaluation-context value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Float(f64),
    Int(i64),
    Str(String),
}

impl QueryValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            QueryValue::Float(v) => Some(*v),
            QueryValue::Int(v) => Some(*v as f64),
            QueryValue::Str(_) => None,
        }
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Float(v) => write!(f, "{}", v),
            QueryValue::Int(v) => write!(f, "{}", v),
            QueryValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for QueryValue {
    fn from(v: f64) -> Self {
        QueryValue::Float(v)
    }
}

impl From<i64> for QueryValue {
    fn from(v: i64) -> Self {
        QueryValue::Int(v)
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue::Str(v.to_string())
    }
}

/// Named query values, insertion-ordered.
pub type QueryMap = IndexMap<String, QueryValue>;

/// Build a query map from pairs.
pub fn query<K, V, I>(pairs: I) -> QueryMap
where
    K: Into<String>,
    V: Into<QueryValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Memo/cache key for one evaluation: `path#slot?k=v&k=v`.
///
/// Overrides are written in insertion order, so the same overrides applied
/// in a different order produce a different key.
pub fn evaluation_key(path: &NodePath, output_slot: usize, overrides: &QueryMap) -> String {
    let mut key = format!("{}#{}", path, output_slot);
    for (i, (name, value)) in overrides.iter().enumerate() {
        key.push(if i == 0 { '?' } else { '&' });
        key.push_str(name);
        key.push('=');
        key.push_str(&value.to_string());
    }
    key
}

/// Reference from a node to something it needs.
///
/// `node == None` means "no connection"; fetching it yields an empty
/// collection. `kinds` is the referenced node's last observed kind set.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDependency {
    pub node: Option<NodePath>,
    pub input_slot: Option<usize>,
    pub output_slot: usize,
    pub dirty: bool,
    pub key: Option<QueryMap>,
    pub kinds: DependencyKinds,
}

impl NodeDependency {
    pub fn new(node: NodePath, output_slot: usize) -> Self {
        Self {
            node: Some(node),
            input_slot: None,
            output_slot,
            dirty: false,
            key: None,
            kinds: DependencyKinds::empty(),
        }
    }

    /// Unconnected input slot.
    pub fn none(input_slot: usize) -> Self {
        Self {
            node: None,
            input_slot: Some(input_slot),
            output_slot: 0,
            dirty: false,
            key: None,
            kinds: DependencyKinds::empty(),
        }
    }

    pub fn with_input_slot(mut self, slot: usize) -> Self {
        self.input_slot = Some(slot);
        self
    }

    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    pub fn with_kinds(mut self, kinds: DependencyKinds) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_key(mut self, key: QueryMap) -> Self {
        self.key = Some(key);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.node.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_key_keeps_insertion_order() {
        let path = NodePath::parse("/sim/out");
        let a = query([("time", 16.0), ("delta", 8.0)]);
        let b = query([("delta", 8.0), ("time", 16.0)]);

        assert_eq!(evaluation_key(&path, 0, &QueryMap::new()), "/sim/out#0");
        assert_eq!(evaluation_key(&path, 0, &a), "/sim/out#0?time=16&delta=8");
        assert_ne!(evaluation_key(&path, 0, &a), evaluation_key(&path, 0, &b));
    }

    #[test]
    fn test_assets_mask() {
        assert!(DependencyKinds::ASSETS.contains(DependencyKinds::TEXTURE));
        assert!(!DependencyKinds::ASSETS.intersects(DependencyKinds::TIME));
    }
}
