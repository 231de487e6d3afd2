//! Graph files (JSON).
//!
//! ```json
//! {
//!   "nodes": [
//!     {"type": "Grid", "name": "grid", "position": [0, 0], "params": {"rows": 2}},
//!     {"type": "Subnet", "name": "fx", "children": {"nodes": [...], "connections": [...]}}
//!   ],
//!   "connections": [{"from": {"node": "grid", "index": 0}, "to": {"node": "fx", "index": 0}}],
//!   "output": "fx"
//! }
//! ```
//!
//! Parameters missing from the file take the operator's defaults. Cook state
//! is never saved; loaded nodes start dirty.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use super::node::Node;
use super::params::Params;
use super::registry;
use super::system::NodeSystem;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFile {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub name: String,
    #[serde(default)]
    pub position: [f32; 2],
    #[serde(default)]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<GraphFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub from: Endpoint,
    pub to: Endpoint,
}

impl GraphFile {
    /// Snapshot of a container's system.
    pub fn from_system(system: &NodeSystem) -> Self {
        let nodes = system
            .nodes()
            .map(|node| NodeRecord {
                type_tag: node.type_tag().to_string(),
                name: node.name().to_string(),
                position: node.position,
                params: node.params().clone(),
                children: node.system().map(GraphFile::from_system),
            })
            .collect();

        let name_of = |id| system.node(id).map(|n| n.name().to_string());
        let connections = system
            .connections()
            .iter()
            .filter_map(|c| {
                Some(ConnectionRecord {
                    from: Endpoint {
                        node: name_of(c.from)?,
                        index: c.from_slot,
                    },
                    to: Endpoint {
                        node: name_of(c.to)?,
                        index: c.to_slot,
                    },
                })
            })
            .collect();

        Self {
            nodes,
            connections,
            output: system.output_name().map(str::to_string),
        }
    }

    /// Fill `system` with this file's nodes and connections.
    pub fn build_into(&self, system: &mut NodeSystem) -> Result<()> {
        for record in &self.nodes {
            let kind = registry::create(&record.type_tag)
                .ok_or_else(|| anyhow!("Unknown node type '{}' ({})", record.type_tag, record.name))?;
            let mut node = Node::new(record.name.clone(), kind)
                .with_params(record.params.clone())
                .with_position(record.position);

            if let Some(children) = &record.children {
                let child_system = node
                    .system_mut()
                    .ok_or_else(|| anyhow!("Node '{}' ({}) cannot hold children", record.name, record.type_tag))?;
                children
                    .build_into(child_system)
                    .with_context(|| format!("In container '{}'", record.name))?;
            }
            system.add_node(node)?;
        }

        for conn in &self.connections {
            let (Some(from), Some(to)) = (system.id_of(&conn.from.node), system.id_of(&conn.to.node)) else {
                bail!(
                    "Connection {} -> {} references an unknown node",
                    conn.from.node,
                    conn.to.node
                );
            };
            system
                .connect(from, conn.from.index, to, conn.to.index)
                .with_context(|| format!("Connecting {} -> {}", conn.from.node, conn.to.node))?;
        }

        if let Some(output) = &self.output {
            let id = system
                .id_of(output)
                .ok_or_else(|| anyhow!("Output node '{}' does not exist", output))?;
            system.set_output(id)?;
        }
        Ok(())
    }
}

/// Parse a graph document into a new root.
pub fn graph_from_str(text: &str) -> Result<Node> {
    let file: GraphFile = serde_json::from_str(text).context("Parse graph error")?;
    let mut root = Node::root();
    let system = root
        .system_mut()
        .ok_or_else(|| anyhow!("Root node has no system"))?;
    file.build_into(system)?;
    Ok(root)
}

pub fn graph_to_string(root: &Node) -> Result<String> {
    let system = root
        .system()
        .ok_or_else(|| anyhow!("Root node has no system"))?;
    serde_json::to_string_pretty(&GraphFile::from_system(system)).context("Serialize graph error")
}

pub fn load_graph(path: &Path) -> Result<Node> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph: {}", path.display()))?;
    let root = graph_from_str(&text).with_context(|| format!("Failed to load graph: {}", path.display()))?;
    log::info!("Loaded graph {} ({} nodes)", path.display(), root.descendants().len());
    Ok(root)
}

pub fn save_graph(root: &Node, path: &Path) -> Result<()> {
    let text = graph_to_string(root)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write graph: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::keys::{P_AMOUNT, P_ROWS, P_SPACING};
    use crate::graph::path::NodePath;

    const DOC: &str = r#"{
        "nodes": [
            {"type": "Grid", "name": "grid", "params": {"rows": 2}},
            {"type": "Offset", "name": "off", "position": [120, 0], "params": {"amount": 250.0}},
            {"type": "Subnet", "name": "fx", "children": {
                "nodes": [
                    {"type": "SubnetInput", "name": "in"},
                    {"type": "Null", "name": "out"}
                ],
                "connections": [{"from": {"node": "in", "index": 0}, "to": {"node": "out", "index": 0}}],
                "output": "out"
            }}
        ],
        "connections": [
            {"from": {"node": "grid", "index": 0}, "to": {"node": "off", "index": 0}},
            {"from": {"node": "off", "index": 0}, "to": {"node": "fx", "index": 0}}
        ],
        "output": "fx"
    }"#;

    #[test]
    fn test_load_fills_defaults_and_children() {
        let root = graph_from_str(DOC).unwrap();
        let grid = root.find(&NodePath::parse("/grid")).unwrap();
        assert_eq!(grid.params().get_int(P_ROWS), Some(2));
        assert_eq!(grid.params().get_float(P_SPACING), Some(32.0));

        let off = root.find(&NodePath::parse("/off")).unwrap();
        assert_eq!(off.params().get_float(P_AMOUNT), Some(250.0));
        assert_eq!(off.position, [120.0, 0.0]);

        let fx = root.find(&NodePath::parse("/fx")).unwrap().system().unwrap();
        assert_eq!(fx.output_name(), Some("out"));
        assert_eq!(fx.connections().len(), 1);
        assert_eq!(root.system().unwrap().output_name(), Some("fx"));
    }

    #[test]
    fn test_save_then_load_keeps_structure() {
        let root = graph_from_str(DOC).unwrap();
        let text = graph_to_string(&root).unwrap();
        let again = graph_from_str(&text).unwrap();
        assert_eq!(
            GraphFile::from_system(again.system().unwrap()),
            GraphFile::from_system(root.system().unwrap())
        );
    }

    #[test]
    fn test_rejects_bad_documents() {
        assert!(graph_from_str(r#"{"nodes": [{"type": "Blur", "name": "b"}]}"#).is_err());
        assert!(graph_from_str(r#"{"nodes": [{"type": "Null", "name": "a"}], "output": "zz"}"#).is_err());
        let not_container = r#"{"nodes": [{"type": "Null", "name": "a", "children": {}}]}"#;
        assert!(graph_from_str(not_container).is_err());
        assert!(graph_from_str("{").is_err());
    }
}
