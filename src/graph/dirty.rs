//! Dirty propagation and dirty-closure discovery.
//!
//! All functions take the root node and address nodes by [`NodePath`].
//!
//! Who depends on a node:
//! - targets of its outgoing connections
//! - its container, when it is the container's designated output
//! - `SubnetInput` children, when the node is a container whose inputs changed
//!
//! What a node depends on ([`dependencies_of`]):
//! - the sources of its input connections (unconnected slots yield `NodeDependency::none`)
//! - `Subnet`: its output child
//! - `SubnetInput`: the source feeding the container's matching input
//! - `Simulation`: inputs only; children are cooked on demand per step

use std::collections::{HashSet, VecDeque};

use log::{debug, trace, warn};

use super::dependency::{DependencyKinds, NodeDependency};
use super::keys::P_INDEX;
use super::node::Node;
use super::node_kind::Cookable;
use super::path::NodePath;
use crate::error::{CookError, CookResult};

/// Why a node was marked dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirtyReason {
    /// Own parameters edited
    Params,
    /// Connections, children or output designation changed
    Structure,
    /// Time cursor moved
    Time,
    /// Textures, beatmap or audio reloaded
    Assets,
    /// Something upstream changed
    Upstream,
}

impl DirtyReason {
    /// Reason handed to dependants. Time stays time so stepped caches survive.
    fn downstream(self) -> DirtyReason {
        match self {
            DirtyReason::Time => DirtyReason::Time,
            _ => DirtyReason::Upstream,
        }
    }
}

/// Mark `path` and everything depending on it dirty.
///
/// Returns the number of nodes touched. Unknown paths touch nothing.
pub fn mark_dirty(root: &Node, path: &NodePath, reason: DirtyReason) -> usize {
    mark_many(root, std::iter::once(path.clone()), reason)
}

/// Mark every node whose last observed kinds intersect `kinds`.
pub fn mark_kinds_dirty(root: &Node, kinds: DependencyKinds, reason: DirtyReason) -> usize {
    let seeds: Vec<NodePath> = root
        .descendants()
        .into_iter()
        .filter(|p| root.find(p).is_some_and(|n| n.kinds().intersects(kinds)))
        .collect();
    if seeds.is_empty() {
        return 0;
    }
    let touched = mark_many(root, seeds, reason);
    debug!("mark_kinds_dirty({:?}): {} nodes", kinds, touched);
    touched
}

fn mark_many(root: &Node, seeds: impl IntoIterator<Item = NodePath>, reason: DirtyReason) -> usize {
    // (path, reason, descend into SubnetInput children)
    let mut queue: VecDeque<(NodePath, DirtyReason, bool)> =
        seeds.into_iter().map(|p| (p, reason, true)).collect();
    let mut visited: HashSet<NodePath> = HashSet::new();

    while let Some((path, reason, descend)) = queue.pop_front() {
        if !visited.insert(path.clone()) {
            continue;
        }
        let Some(node) = root.find(&path) else {
            continue;
        };
        trace!("mark_dirty: {} ({:?})", path, reason);
        node.invalidate(reason);
        let next = reason.downstream();

        if let Some(parent_path) = path.parent() {
            let container = root.find(&parent_path);
            if let Some(system) = container.and_then(|c| c.system()) {
                let id = node.id();
                for conn in system.outgoing(id) {
                    if let Some(target) = system.node(conn.to) {
                        queue.push_back((parent_path.child(target.name()), next, true));
                    }
                }
                if system.output() == Some(id) {
                    queue.push_back((parent_path.clone(), next, false));
                }
            }
        }

        if descend {
            if let Some(system) = node.system() {
                for child in system.nodes().filter(|c| c.kind().is_subnet_input()) {
                    queue.push_back((path.child(child.name()), next, true));
                }
            }
        }
    }
    visited.len()
}

/// Dependencies of the node at `path` (empty for unknown paths).
pub fn dependencies_of(root: &Node, path: &NodePath) -> Vec<NodeDependency> {
    let Some(node) = root.find(path) else {
        return Vec::new();
    };
    let mut deps = Vec::new();

    for slot in 0..node.kind().ports().input_count() {
        let key = node.kind().input_key(node.params(), slot);
        deps.extend(input_dependencies(root, path, slot).into_iter().map(|dep| {
            match (&key, dep.is_connected()) {
                (Some(key), true) => dep.with_key(key.clone()),
                _ => dep,
            }
        }));
    }

    if node.kind().is_subnet_input() {
        let index = node.params().get_int_or(P_INDEX, 0).max(0) as usize;
        if let Some(container) = path.parent() {
            deps.extend(input_dependencies(root, &container, index));
        }
    } else if !node.kind().is_simulation() {
        if let Some(output) = node.system().and_then(|s| s.output_name()) {
            deps.push(described(root, path.child(output), 0));
        }
    }
    deps
}

/// Dependencies feeding one input slot of the node at `path`.
pub fn input_dependencies(root: &Node, path: &NodePath, slot: usize) -> Vec<NodeDependency> {
    let sources = input_sources(root, path, slot);
    if sources.is_empty() {
        return vec![NodeDependency::none(slot)];
    }
    sources
        .into_iter()
        .map(|(source, from_slot)| described(root, source, from_slot).with_input_slot(slot))
        .collect()
}

/// Paths and output slots connected into `slot` of the node at `path`.
pub fn input_sources(root: &Node, path: &NodePath, slot: usize) -> Vec<(NodePath, usize)> {
    let (Some(node), Some(parent)) = (root.find(path), path.parent()) else {
        return Vec::new();
    };
    let Some(system) = root.find(&parent).and_then(|c| c.system()) else {
        return Vec::new();
    };
    system
        .input_sources(node.id(), slot)
        .into_iter()
        .map(|(name, from_slot)| (parent.child(&name), from_slot))
        .collect()
}

fn described(root: &Node, path: NodePath, output_slot: usize) -> NodeDependency {
    let (dirty, kinds) = root
        .find(&path)
        .map(|n| {
            let state = n.state();
            (!state.status.is_fresh(), state.kinds)
        })
        .unwrap_or((true, DependencyKinds::empty()));
    NodeDependency::new(path, output_slot)
        .with_dirty(dirty)
        .with_kinds(kinds)
}

/// Direct dependencies that need a cook.
pub fn find_dirty_dependencies(root: &Node, path: &NodePath) -> Vec<NodeDependency> {
    dependencies_of(root, path)
        .into_iter()
        .filter(|d| d.is_connected() && d.dirty)
        .collect()
}

/// Every transitive dependency that needs a cook, dependencies first.
///
/// The order is stable for a given graph. A dependency that is already on
/// the current walk is a cycle: the error carries the cycle path, closed by
/// repeating its first node.
pub fn find_dirty_dependencies_deep(root: &Node, path: &NodePath) -> CookResult<Vec<NodePath>> {
    if root.find(path).is_none() {
        return Err(CookError::MissingNode(path.clone()));
    }
    let mut walk = Walk::default();
    walk.visit(root, path)?;
    Ok(walk.order)
}

#[derive(Default)]
struct Walk {
    stack: Vec<NodePath>,
    done: HashSet<NodePath>,
    order: Vec<NodePath>,
}

impl Walk {
    fn visit(&mut self, root: &Node, path: &NodePath) -> CookResult<()> {
        self.stack.push(path.clone());
        for dep in dependencies_of(root, path) {
            let Some(dep_path) = dep.node else {
                continue;
            };
            if let Some(pos) = self.stack.iter().position(|p| *p == dep_path) {
                let mut cycle = self.stack[pos..].to_vec();
                cycle.push(dep_path);
                warn!(
                    "Cycle detected: {}",
                    cycle.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" -> ")
                );
                return Err(CookError::Circular { cycle });
            }
            if self.done.contains(&dep_path) {
                continue;
            }
            self.visit(root, &dep_path)?;
            if dep.dirty && !self.order.contains(&dep_path) {
                self.order.push(dep_path);
            }
        }
        self.stack.pop();
        self.done.insert(path.clone());
        Ok(())
    }
}

/// Flag the connections along `cycle` (as returned in `CookError::Circular`).
///
/// Consecutive entries `a, b` mean `a` depends on `b`, i.e. the edge `b -> a`.
/// Pairs that do not share a system (container/output links) have no edge.
pub fn mark_circular(root: &Node, cycle: &[NodePath]) -> usize {
    let mut marked = 0;
    for pair in cycle.windows(2) {
        let (dependant, dependency) = (&pair[0], &pair[1]);
        let (Some(parent), Some(other_parent)) = (dependant.parent(), dependency.parent()) else {
            continue;
        };
        if parent != other_parent {
            continue;
        }
        let Some(system) = root.find(&parent).and_then(|c| c.system()) else {
            continue;
        };
        let (Some(from), Some(to)) = (
            dependency.name().and_then(|n| system.id_of(n)),
            dependant.name().and_then(|n| system.id_of(n)),
        ) else {
            continue;
        };
        marked += system.mark_circular(from, to);
    }
    marked
}

/// Reset cycle flags on the connections into the node at `path`.
pub fn clear_circular(root: &Node, path: &NodePath) {
    let (Some(node), Some(parent)) = (root.find(path), path.parent()) else {
        return;
    };
    if let Some(system) = root.find(&parent).and_then(|c| c.system()) {
        system.clear_circular(node.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::CookStatus;
    use crate::graph::params::Params;
    use crate::nodes::{Grid, Merge, Null, Offset, Subnet, SubnetInput};

    /// /grid -> /off -> /out
    fn chain() -> Node {
        let mut root = Node::root();
        let sys = root.system_mut().unwrap();
        let g = sys.add_node(Node::new("grid", Grid::new())).unwrap();
        let o = sys.add_node(Node::new("off", Offset::new())).unwrap();
        let n = sys.add_node(Node::new("out", Null::new())).unwrap();
        sys.connect(g, 0, o, 0).unwrap();
        sys.connect(o, 0, n, 0).unwrap();
        sys.set_output(n).unwrap();
        root
    }

    fn set_cooked(root: &Node, path: &str) {
        root.find(&NodePath::parse(path)).unwrap().state().status = CookStatus::Cooked;
    }

    fn status(root: &Node, path: &str) -> CookStatus {
        root.find(&NodePath::parse(path)).unwrap().status()
    }

    #[test]
    fn test_mark_dirty_propagates_downstream_and_to_container() {
        let root = chain();
        for p in ["/grid", "/off", "/out", "/"] {
            set_cooked(&root, p);
        }
        let touched = mark_dirty(&root, &NodePath::parse("/off"), DirtyReason::Params);
        assert_eq!(touched, 3);
        assert_eq!(status(&root, "/grid"), CookStatus::Cooked);
        assert_eq!(status(&root, "/off"), CookStatus::Dirty);
        assert_eq!(status(&root, "/out"), CookStatus::Dirty);
        assert_eq!(status(&root, "/"), CookStatus::Dirty);
    }

    #[test]
    fn test_deep_closure_is_dependency_first() {
        let root = chain();
        let order = find_dirty_dependencies_deep(&root, &NodePath::parse("/out")).unwrap();
        assert_eq!(order, vec![NodePath::parse("/grid"), NodePath::parse("/off")]);

        set_cooked(&root, "/grid");
        let direct = find_dirty_dependencies(&root, &NodePath::parse("/off"));
        assert!(direct.is_empty());
        let order = find_dirty_dependencies_deep(&root, &NodePath::parse("/out")).unwrap();
        assert_eq!(order, vec![NodePath::parse("/off")]);
    }

    #[test]
    fn test_unconnected_slot_is_none_dependency() {
        let mut root = Node::root();
        root.system_mut()
            .unwrap()
            .add_node(Node::new("lonely", Null::new()))
            .unwrap();
        let deps = dependencies_of(&root, &NodePath::parse("/lonely"));
        assert_eq!(deps, vec![NodeDependency::none(0)]);
    }

    #[test]
    fn test_cycle_reports_path() {
        let mut root = Node::root();
        let sys = root.system_mut().unwrap();
        let a = sys.add_node(Node::new("a", Null::new())).unwrap();
        let b = sys.add_node(Node::new("b", Null::new())).unwrap();
        sys.connect(a, 0, b, 0).unwrap();
        sys.connect(b, 0, a, 0).unwrap();

        let err = find_dirty_dependencies_deep(&root, &NodePath::parse("/a")).unwrap_err();
        let CookError::Circular { cycle } = err else {
            panic!("expected cycle, got {:?}", err);
        };
        assert_eq!(
            cycle,
            vec![NodePath::parse("/a"), NodePath::parse("/b"), NodePath::parse("/a")]
        );
        assert_eq!(mark_circular(&root, &cycle), 2);
        assert!(root.system().unwrap().connections().iter().all(|c| c.is_circular()));
    }

    #[test]
    fn test_cycle_behind_a_tail() {
        // /grid -> /a <-> /b -> /c
        let mut root = Node::root();
        let sys = root.system_mut().unwrap();
        let g = sys.add_node(Node::new("grid", Grid::new())).unwrap();
        let a = sys.add_node(Node::new("a", Merge::new())).unwrap();
        let b = sys.add_node(Node::new("b", Null::new())).unwrap();
        let c = sys.add_node(Node::new("c", Null::new())).unwrap();
        sys.connect(g, 0, a, 0).unwrap();
        sys.connect(a, 0, b, 0).unwrap();
        sys.connect(b, 0, a, 0).unwrap();
        sys.connect(b, 0, c, 0).unwrap();

        let err = find_dirty_dependencies_deep(&root, &NodePath::parse("/c")).unwrap_err();
        let CookError::Circular { cycle } = err else {
            panic!("expected cycle, got {:?}", err);
        };
        assert!(!cycle.contains(&NodePath::parse("/c")));
        assert!(!cycle.contains(&NodePath::parse("/grid")));
        assert_eq!(mark_circular(&root, &cycle), 2);
        let flags: Vec<bool> = root
            .system()
            .unwrap()
            .connections()
            .iter()
            .map(|c| c.is_circular())
            .collect();
        assert_eq!(flags, vec![false, true, true, false]);
    }

    #[test]
    fn test_subnet_dependencies_cross_the_boundary() {
        // /grid -> /box[0]; inside /box: in (SubnetInput 0) -> out (output)
        let mut root = Node::root();
        let mut container = Node::new("box", Subnet::new());
        {
            let inner = container.system_mut().unwrap();
            let i = inner
                .add_node(Node::new("in", SubnetInput::new()).with_params(Params::new().with(P_INDEX, 0)))
                .unwrap();
            let o = inner.add_node(Node::new("out", Null::new())).unwrap();
            inner.connect(i, 0, o, 0).unwrap();
            inner.set_output(o).unwrap();
        }
        let sys = root.system_mut().unwrap();
        let g = sys.add_node(Node::new("grid", Grid::new())).unwrap();
        let b = sys.add_node(container).unwrap();
        sys.connect(g, 0, b, 0).unwrap();

        let order = find_dirty_dependencies_deep(&root, &NodePath::parse("/box")).unwrap();
        assert_eq!(
            order,
            vec![
                NodePath::parse("/grid"),
                NodePath::parse("/box/in"),
                NodePath::parse("/box/out"),
            ]
        );

        for p in ["/grid", "/box", "/box/in", "/box/out"] {
            set_cooked(&root, p);
        }
        // Editing the grid reaches the inside of the container and back out
        mark_dirty(&root, &NodePath::parse("/grid"), DirtyReason::Params);
        assert_eq!(status(&root, "/box/in"), CookStatus::Dirty);
        assert_eq!(status(&root, "/box/out"), CookStatus::Dirty);
        assert_eq!(status(&root, "/box"), CookStatus::Dirty);
    }

    #[test]
    fn test_kinds_dirty_only_hits_matching_nodes() {
        let root = chain();
        for p in ["/grid", "/off", "/out", "/"] {
            set_cooked(&root, p);
        }
        root.find(&NodePath::parse("/off")).unwrap().state().kinds = DependencyKinds::TIME;
        let touched = mark_kinds_dirty(&root, DependencyKinds::TIME, DirtyReason::Time);
        assert_eq!(touched, 3);
        assert_eq!(status(&root, "/grid"), CookStatus::Cooked);
        assert_eq!(mark_kinds_dirty(&root, DependencyKinds::TEXTURE, DirtyReason::Assets), 0);
    }
}
