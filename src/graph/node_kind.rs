//! NodeKind - closed set of operators, dispatched through [`Cookable`].
//!
//! `enum_dispatch` generates the `Cookable for NodeKind` delegation and the
//! `From<Operator> for NodeKind` conversions.

use enum_dispatch::enum_dispatch;

use super::dependency::QueryMap;
use super::dirty::DirtyReason;
use super::params::Params;
use super::system::NodeSystem;
use crate::cook::CookContext;
use crate::error::CookResult;
use crate::geometry::ElementCollection;
use crate::nodes::{
    BeatPulse, Delete, Grid, Merge, Null, Offset, PreviousFrame, Script, SetAttribute,
    Simulation, Subnet, SubnetInput, Texture, TimeCull, TimeShift,
};

/// One input port of an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPort {
    pub name: &'static str,
    /// Accepts any number of connections (fetched with `fetch_inputs`)
    pub multiple: bool,
}

/// Input ports of an operator. Every operator has exactly one output (slot 0).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortLayout {
    pub inputs: Vec<InputPort>,
}

impl PortLayout {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn input(mut self, name: &'static str) -> Self {
        self.inputs.push(InputPort {
            name,
            multiple: false,
        });
        self
    }

    pub fn multiple(mut self, name: &'static str) -> Self {
        self.inputs.push(InputPort {
            name,
            multiple: true,
        });
        self
    }

    pub fn port(&self, slot: usize) -> Option<&InputPort> {
        self.inputs.get(slot)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub const OUTPUTS: usize = 1;
}

/// Base trait for all operators.
#[enum_dispatch]
pub trait Cookable {
    /// Type identifier used in saved graphs ("Grid", "Offset", ...)
    fn type_tag(&self) -> &'static str;

    /// Default: one single-connection input.
    fn ports(&self) -> PortLayout {
        PortLayout::none().input("input")
    }

    /// Parameters a fresh node of this kind starts with
    fn default_params(&self) -> Params {
        Params::new()
    }

    /// Fixed query overrides this operator always fetches input `slot` with.
    /// Cursor-relative overrides (such as a time shift) are not fixed.
    fn input_key(&self, _params: &Params, _slot: usize) -> Option<QueryMap> {
        None
    }

    /// Produce this node's output collection.
    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection>;

    /// Child graph of container operators
    fn system(&self) -> Option<&NodeSystem> {
        None
    }

    fn system_mut(&mut self) -> Option<&mut NodeSystem> {
        None
    }

    /// Drop operator-internal caches. Called on every dirty mark.
    fn invalidate(&self, _reason: DirtyReason) {}
}

#[enum_dispatch(Cookable)]
#[derive(Debug)]
pub enum NodeKind {
    Grid,
    Offset,
    TimeShift,
    Null,
    Merge,
    Delete,
    TimeCull,
    SetAttribute,
    Texture,
    BeatPulse,
    Script,
    Subnet,
    SubnetInput,
    PreviousFrame,
    Simulation,
}

impl NodeKind {
    pub fn is_container(&self) -> bool {
        self.system().is_some()
    }

    pub fn is_simulation(&self) -> bool {
        matches!(self, NodeKind::Simulation(_))
    }

    pub fn is_subnet_input(&self) -> bool {
        matches!(self, NodeKind::SubnetInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_and_ports() {
        let merge: NodeKind = Merge::new().into();
        assert_eq!(merge.type_tag(), "Merge");
        assert!(merge.ports().port(0).unwrap().multiple);
        assert!(!merge.is_container());

        let grid: NodeKind = Grid::new().into();
        assert_eq!(grid.ports().input_count(), 0);

        let sim: NodeKind = Simulation::new().into();
        assert!(sim.is_container());
        assert!(sim.is_simulation());
    }
}
