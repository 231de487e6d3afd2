//! Built-in operators.
//!
//! Each operator is a small struct implementing [`Cookable`]; the closed set
//! is collected in [`NodeKind`] and constructed by tag in
//! [`crate::graph::registry`].
//!
//! [`Cookable`]: crate::graph::Cookable
//! [`NodeKind`]: crate::graph::NodeKind

pub mod asset;
pub mod generators;
pub mod script;
pub mod simulation;
pub mod subnet;
pub mod transform;
pub mod utility;

pub use asset::{BeatPulse, Texture};
pub use generators::Grid;
pub use script::Script;
pub use simulation::{PreviousFrame, Simulation};
pub use subnet::{Subnet, SubnetInput};
pub use transform::{Offset, TimeShift};
pub use utility::{Delete, Merge, Null, SetAttribute, TimeCull};

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for operator tests.

    use crate::config::{EngineConfig, YieldMode};
    use crate::cook::{CookJob, CookReport};
    use crate::graph::{Node, NodeId, NodePath};
    use crate::host::HostServices;

    pub fn host() -> HostServices {
        HostServices::new(EngineConfig {
            yield_mode: YieldMode::None,
            ..EngineConfig::default()
        })
    }

    pub fn add(root: &mut Node, node: Node) -> NodeId {
        root.system_mut().unwrap().add_node(node).unwrap()
    }

    pub fn connect(root: &mut Node, from: NodeId, to: NodeId, slot: usize) {
        root.system_mut().unwrap().connect(from, 0, to, slot).unwrap();
    }

    /// Cook `target` at `time` and return the report.
    pub fn cook_at(root: &Node, host: &HostServices, target: &str, time: f64) -> CookReport {
        CookJob::new(root, NodePath::parse(target), host)
            .at_time(time, 0.0)
            .run()
    }
}
