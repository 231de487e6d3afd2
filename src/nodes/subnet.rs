//! Subnet containers.

use crate::cook::CookContext;
use crate::error::CookResult;
use crate::geometry::ElementCollection;
use crate::graph::keys::P_INDEX;
use crate::graph::{Cookable, NodeSystem, Params, PortLayout, QueryMap};

/// Inputs exposed by container operators
pub const CONTAINER_INPUTS: [&str; 4] = ["input0", "input1", "input2", "input3"];

pub(crate) fn container_ports() -> PortLayout {
    CONTAINER_INPUTS
        .into_iter()
        .fold(PortLayout::none(), |ports, name| ports.input(name))
}

/// Child graph whose result is its designated output node's result.
/// An empty subnet (no output) cooks to an empty collection.
#[derive(Debug, Default)]
pub struct Subnet {
    system: NodeSystem,
}

impl Subnet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cookable for Subnet {
    fn type_tag(&self) -> &'static str {
        "Subnet"
    }

    fn ports(&self) -> PortLayout {
        container_ports()
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        ctx.fetch_output_child(&QueryMap::new())
    }

    fn system(&self) -> Option<&NodeSystem> {
        Some(&self.system)
    }

    fn system_mut(&mut self) -> Option<&mut NodeSystem> {
        Some(&mut self.system)
    }
}

/// Reads input `index` of the containing node.
#[derive(Debug, Default)]
pub struct SubnetInput;

impl SubnetInput {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for SubnetInput {
    fn type_tag(&self) -> &'static str {
        "SubnetInput"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::none()
    }

    fn default_params(&self) -> Params {
        Params::new().with(P_INDEX, 0)
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let index = ctx.params().get_int_or(P_INDEX, 0).max(0) as usize;
        ctx.fetch_parent_input(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::keys::{P_AMOUNT, P_COLS, P_ROWS};
    use crate::graph::{CookStatus, DirtyReason, Node, NodePath, mark_dirty};
    use crate::nodes::testing::{add, connect, cook_at, host};
    use crate::nodes::{Grid, Offset};

    /// /grid -> /box[1]; inside /box: in(index 1) -> shift(100) [output]
    fn boxed() -> Node {
        let mut container = Node::new("box", Subnet::new());
        {
            let inner = container.system_mut().unwrap();
            let i = inner
                .add_node(Node::new("in", SubnetInput::new()).with_params(Params::new().with(P_INDEX, 1)))
                .unwrap();
            let o = inner
                .add_node(Node::new("shift", Offset::new()).with_params(Params::new().with(P_AMOUNT, 100.0)))
                .unwrap();
            inner.connect(i, 0, o, 0).unwrap();
            inner.set_output(o).unwrap();
        }
        let mut root = Node::root();
        let g = add(
            &mut root,
            Node::new("grid", Grid::new()).with_params(Params::new().with(P_ROWS, 1).with(P_COLS, 2)),
        );
        let b = add(&mut root, container);
        connect(&mut root, g, b, 1);
        root
    }

    #[test]
    fn test_subnet_cooks_through_its_output() {
        let root = boxed();
        let host = host();
        let report = cook_at(&root, &host, "/box", 0.0);
        let out = report.collection.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.time_span(), Some((100.0, 600.0)));
        assert_eq!(
            root.find(&NodePath::parse("/box/in")).unwrap().status(),
            CookStatus::Cooked
        );
    }

    #[test]
    fn test_unconnected_container_input_is_empty() {
        let mut root = boxed();
        let box_path = NodePath::parse("/box");
        root.find_mut(&box_path)
            .unwrap()
            .system_mut()
            .unwrap()
            .node_by_name_mut("in")
            .unwrap()
            .params_mut()
            .set(P_INDEX, 3);
        mark_dirty(&root, &NodePath::parse("/box/in"), DirtyReason::Params);

        let host = host();
        assert!(cook_at(&root, &host, "/box", 0.0).collection.unwrap().is_empty());
    }

    #[test]
    fn test_empty_subnet() {
        let mut root = Node::root();
        add(&mut root, Node::new("empty", Subnet::new()));
        let host = host();
        assert!(cook_at(&root, &host, "/empty", 0.0).collection.unwrap().is_empty());
        assert_eq!(Subnet::new().ports().input_count(), 4);
    }
}
