//! Node graph: paths, parameters, nodes, systems, dependency tracking,
//! dirty propagation, per-node result caches and graph files.

pub mod cache;
pub mod dependency;
pub mod dirty;
pub mod keys;
pub mod node;
pub mod node_kind;
pub mod params;
pub mod path;
pub mod persist;
pub mod registry;
pub mod system;

pub use cache::{CacheStats, CachedResult, ResultCache};
pub use dependency::{DependencyKinds, NodeDependency, QueryMap, QueryValue, evaluation_key, query};
pub use dirty::{
    DirtyReason, dependencies_of, find_dirty_dependencies, find_dirty_dependencies_deep, mark_dirty,
    mark_kinds_dirty,
};
pub use node::{CookStatus, Node, NodeId, NodeState};
pub use node_kind::{Cookable, InputPort, NodeKind, PortLayout};
pub use params::{ParamValue, Params};
pub use path::NodePath;
pub use persist::{GraphFile, graph_from_str, graph_to_string, load_graph, save_graph};
pub use system::{Connection, NodeSystem};
