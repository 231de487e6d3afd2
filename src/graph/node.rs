//! Node - one operator instance in the graph.
//!
//! A node owns its parameters and its [`NodeKind`] (the operator itself,
//! plus a child [`NodeSystem`] for containers). Cook bookkeeping lives in
//! an interior-mutable [`NodeState`] so a cook pass can walk a shared
//! `&Node` tree while updating status and caches.
//!
//! Lifecycle of `status`:
//! - created → `Dirty`
//! - job picks it up → `Cooking`
//! - success → `Cooked`, failure → `Error` (sticky until a successful re-cook)
//! - canceled mid-cook → back to `Dirty`
//! - any `mark_dirty` → `Dirty`

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cache::ResultCache;
use super::dependency::DependencyKinds;
use super::dirty::DirtyReason;
use super::node_kind::{Cookable, NodeKind};
use super::params::Params;
use super::path::NodePath;
use super::system::NodeSystem;
use crate::config::DEFAULT_CACHE_CAPACITY;
use crate::nodes::Subnet;

/// Stable node identity; connections reference nodes by id so renames keep edges.
pub type NodeId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CookStatus {
    Dirty,
    Cooking,
    Cooked,
    Error,
}

impl CookStatus {
    /// Cooked nodes are fresh; everything else needs a cook.
    pub fn is_fresh(self) -> bool {
        self == CookStatus::Cooked
    }
}

/// Mutable cook bookkeeping of one node.
#[derive(Debug)]
pub struct NodeState {
    pub status: CookStatus,
    pub cache: ResultCache,
    /// Kinds observed during the last successful cook
    pub kinds: DependencyKinds,
    pub errors: Vec<String>,
    /// Failed nodes this node fetched during its last cook
    pub upstream_errors: Vec<NodePath>,
    pub cook_count: u64,
}

impl NodeState {
    fn new(cache_capacity: usize) -> Self {
        Self {
            status: CookStatus::Dirty,
            cache: ResultCache::new(cache_capacity),
            kinds: DependencyKinds::empty(),
            errors: Vec::new(),
            upstream_errors: Vec::new(),
            cook_count: 0,
        }
    }
}

pub struct Node {
    id: NodeId,
    name: String,
    /// Editor position, carried through save/load only
    pub position: [f32; 2],
    params: Params,
    kind: NodeKind,
    state: Mutex<NodeState>,
}

impl Node {
    /// New node with the kind's default parameters. Starts `Dirty`.
    pub fn new(name: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        let kind = kind.into();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            position: [0.0, 0.0],
            params: kind.default_params(),
            kind,
            state: Mutex::new(NodeState::new(DEFAULT_CACHE_CAPACITY)),
        }
    }

    /// Root container: an unnamed subnet whose path is `/`.
    pub fn root() -> Self {
        Self::new("", Subnet::new())
    }

    /// Override parameters; keys absent from `params` keep their defaults.
    pub fn with_params(mut self, params: Params) -> Self {
        for (key, value) in params.iter() {
            self.params.set(key.clone(), value.clone());
        }
        self
    }

    pub fn with_position(mut self, position: [f32; 2]) -> Self {
        self.position = position;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Mutable parameters. Callers mark the node dirty afterwards.
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn system(&self) -> Option<&NodeSystem> {
        self.kind.system()
    }

    pub fn system_mut(&mut self) -> Option<&mut NodeSystem> {
        self.kind.system_mut()
    }

    // --- Cook state ---

    /// Lock the cook state. Poisoned locks are recovered.
    pub fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> CookStatus {
        self.state().status
    }

    pub fn is_fresh(&self) -> bool {
        self.status().is_fresh()
    }

    pub fn cook_count(&self) -> u64 {
        self.state().cook_count
    }

    pub fn kinds(&self) -> DependencyKinds {
        self.state().kinds
    }

    pub fn errors(&self) -> Vec<String> {
        self.state().errors.clone()
    }

    pub fn upstream_errors(&self) -> Vec<NodePath> {
        self.state().upstream_errors.clone()
    }

    pub fn set_cache_capacity(&self, capacity: usize) {
        self.state().cache.resize(capacity);
    }

    /// Mark only this node: status Dirty, cache dropped, kind notified.
    /// Graph-wide propagation lives in [`super::dirty::mark_dirty`].
    pub(crate) fn invalidate(&self, reason: DirtyReason) {
        {
            let mut state = self.state();
            state.status = CookStatus::Dirty;
            state.cache.clear();
        }
        self.kind.invalidate(reason);
    }

    // --- Tree walking ---

    /// Descendant at `path`, treating `self` as the root.
    pub fn find(&self, path: &NodePath) -> Option<&Node> {
        let mut current = self;
        for seg in path.segments() {
            current = current.system()?.node_by_name(seg)?;
        }
        Some(current)
    }

    pub fn find_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let mut current = self;
        for seg in path.segments() {
            current = current.system_mut()?.node_by_name_mut(seg)?;
        }
        Some(current)
    }

    /// Every node under `self` (excluding `self`), parents before children.
    pub fn descendants(&self) -> Vec<NodePath> {
        let mut out = Vec::new();
        collect_paths(self, &NodePath::root(), &mut out);
        out
    }
}

fn collect_paths(node: &Node, path: &NodePath, out: &mut Vec<NodePath>) {
    let Some(system) = node.system() else {
        return;
    };
    for child in system.nodes() {
        let child_path = path.child(child.name());
        out.push(child_path.clone());
        collect_paths(child, &child_path, out);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.type_tag())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Grid, Null};

    #[test]
    fn test_new_node_is_dirty_with_defaults() {
        let node = Node::new("grid", Grid::new());
        assert_eq!(node.status(), CookStatus::Dirty);
        assert_eq!(node.type_tag(), "Grid");
        assert!(node.params().contains(crate::graph::keys::P_ROWS));
        assert_eq!(node.cook_count(), 0);
    }

    #[test]
    fn test_find_and_descendants() {
        let mut root = Node::root();
        let mut inner = Node::new("inner", Subnet::new());
        inner
            .system_mut()
            .unwrap()
            .add_node(Node::new("leaf", Null::new()))
            .unwrap();
        root.system_mut().unwrap().add_node(inner).unwrap();

        let leaf = root.find(&NodePath::parse("/inner/leaf")).unwrap();
        assert_eq!(leaf.name(), "leaf");
        assert!(root.find(&NodePath::parse("/inner/missing")).is_none());
        assert!(root.find(&NodePath::root()).is_some());
        assert_eq!(
            root.descendants(),
            vec![NodePath::parse("/inner"), NodePath::parse("/inner/leaf")]
        );
    }
}
