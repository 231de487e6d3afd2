//! NodeSystem - the graph inside one container.
//!
//! Owns its nodes (insertion-ordered), a name index, the connection list and
//! the designated output node. Connections reference nodes by [`NodeId`] and
//! never cross system boundaries; containers reach their parent's inputs
//! through `SubnetInput` nodes instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use indexmap::IndexMap;
use log::trace;

use super::node::{Node, NodeId};
use super::node_kind::Cookable;

/// Edge from one node's output slot to another node's input slot.
#[derive(Debug)]
pub struct Connection {
    pub from: NodeId,
    pub from_slot: usize,
    pub to: NodeId,
    pub to_slot: usize,
    /// Set by the cook job when this edge is part of a detected cycle
    circular: AtomicBool,
}

impl Connection {
    pub fn new(from: NodeId, from_slot: usize, to: NodeId, to_slot: usize) -> Self {
        Self {
            from,
            from_slot,
            to,
            to_slot,
            circular: AtomicBool::new(false),
        }
    }

    pub fn is_circular(&self) -> bool {
        self.circular.load(Ordering::Relaxed)
    }

    pub fn set_circular(&self, circular: bool) {
        self.circular.store(circular, Ordering::Relaxed);
    }

    fn same_edge(&self, from: NodeId, from_slot: usize, to: NodeId, to_slot: usize) -> bool {
        self.from == from && self.from_slot == from_slot && self.to == to && self.to_slot == to_slot
    }
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            from: self.from,
            from_slot: self.from_slot,
            to: self.to,
            to_slot: self.to_slot,
            circular: AtomicBool::new(self.is_circular()),
        }
    }
}

#[derive(Debug, Default)]
pub struct NodeSystem {
    nodes: IndexMap<NodeId, Node>,
    names: HashMap<String, NodeId>,
    connections: Vec<Connection>,
    output: Option<NodeId>,
}

impl NodeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Nodes ---

    /// Add a node. Names must be unique within the system and free of `/`.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        validate_name(node.name())?;
        if self.names.contains_key(node.name()) {
            bail!("Node name '{}' already exists", node.name());
        }
        let id = node.id();
        trace!("add_node: {} ({})", node.name(), node.type_tag());
        self.names.insert(node.name().to_string(), id);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Remove a node together with every connection touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.shift_remove(&id)?;
        self.names.remove(node.name());
        self.connections.retain(|c| c.from != id && c.to != id);
        if self.output == Some(id) {
            self.output = None;
        }
        Some(node)
    }

    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        if let Some(existing) = self.names.get(new_name) {
            if *existing == id {
                return Ok(());
            }
            bail!("Node name '{}' already exists", new_name);
        }
        let Some(node) = self.nodes.get_mut(&id) else {
            bail!("Unknown node {}", id);
        };
        self.names.remove(node.name());
        node.set_name(new_name.to_string());
        self.names.insert(new_name.to_string(), id);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.id_of(name).and_then(|id| self.nodes.get(&id))
    }

    pub fn node_by_name_mut(&mut self, name: &str) -> Option<&mut Node> {
        let id = self.id_of(name)?;
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // --- Connections ---

    /// Connect `from`'s output to `to`'s input slot.
    ///
    /// A single-connection input drops its previous connection. Connecting an
    /// existing edge again is a no-op.
    pub fn connect(&mut self, from: NodeId, from_slot: usize, to: NodeId, to_slot: usize) -> Result<()> {
        let Some(source) = self.nodes.get(&from) else {
            bail!("Unknown source node {}", from);
        };
        let Some(target) = self.nodes.get(&to) else {
            bail!("Unknown target node {}", to);
        };
        if from_slot >= super::node_kind::PortLayout::OUTPUTS {
            bail!("'{}' has no output slot {}", source.name(), from_slot);
        }
        let ports = target.kind().ports();
        let Some(port) = ports.port(to_slot) else {
            bail!("'{}' has no input slot {}", target.name(), to_slot);
        };

        if self
            .connections
            .iter()
            .any(|c| c.same_edge(from, from_slot, to, to_slot))
        {
            return Ok(());
        }
        if !port.multiple {
            self.connections.retain(|c| !(c.to == to && c.to_slot == to_slot));
        }
        trace!(
            "connect: {}[{}] -> {}[{}]",
            source.name(),
            from_slot,
            target.name(),
            to_slot
        );
        self.connections.push(Connection::new(from, from_slot, to, to_slot));
        Ok(())
    }

    /// Remove one edge. Returns whether it existed.
    pub fn disconnect(&mut self, from: NodeId, from_slot: usize, to: NodeId, to_slot: usize) -> bool {
        let before = self.connections.len();
        self.connections
            .retain(|c| !c.same_edge(from, from_slot, to, to_slot));
        self.connections.len() != before
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Connections into `to`'s input slot, in connection order.
    pub fn incoming(&self, to: NodeId, slot: usize) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.to == to && c.to_slot == slot)
    }

    pub fn outgoing(&self, from: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.from == from)
    }

    /// Source names and output slots feeding `to`'s input slot.
    pub fn input_sources(&self, to: NodeId, slot: usize) -> Vec<(String, usize)> {
        self.incoming(to, slot)
            .filter_map(|c| {
                self.nodes
                    .get(&c.from)
                    .map(|n| (n.name().to_string(), c.from_slot))
            })
            .collect()
    }

    /// Flag the edge `from -> to` as part of a cycle.
    pub fn mark_circular(&self, from: NodeId, to: NodeId) -> usize {
        let mut marked = 0;
        for c in self.connections.iter().filter(|c| c.from == from && c.to == to) {
            c.set_circular(true);
            marked += 1;
        }
        marked
    }

    pub fn clear_circular(&self, to: NodeId) {
        for c in self.connections.iter().filter(|c| c.to == to) {
            c.set_circular(false);
        }
    }

    // --- Output ---

    pub fn set_output(&mut self, id: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            bail!("Unknown node {}", id);
        }
        self.output = Some(id);
        Ok(())
    }

    pub fn clear_output(&mut self) {
        self.output = None;
    }

    pub fn output(&self) -> Option<NodeId> {
        self.output
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output
            .and_then(|id| self.nodes.get(&id))
            .map(|n| n.name())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        bail!("Invalid node name '{}'", name);
    }
    Ok(())
}
