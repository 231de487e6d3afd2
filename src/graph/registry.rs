//! Type tag → operator constructor.
//!
//! Graph files store operators by tag ("Grid", "Offset", ...); loading goes
//! through [`create`].

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::node_kind::NodeKind;
use crate::nodes::{
    BeatPulse, Delete, Grid, Merge, Null, Offset, PreviousFrame, Script, SetAttribute,
    Simulation, Subnet, SubnetInput, Texture, TimeCull, TimeShift,
};

type Constructor = fn() -> NodeKind;

static REGISTRY: Lazy<HashMap<&'static str, Constructor>> = Lazy::new(|| {
    let entries: [(&'static str, Constructor); 15] = [
        ("Grid", || Grid::new().into()),
        ("Offset", || Offset::new().into()),
        ("TimeShift", || TimeShift::new().into()),
        ("Null", || Null::new().into()),
        ("Merge", || Merge::new().into()),
        ("Delete", || Delete::new().into()),
        ("TimeCull", || TimeCull::new().into()),
        ("SetAttribute", || SetAttribute::new().into()),
        ("Texture", || Texture::new().into()),
        ("BeatPulse", || BeatPulse::new().into()),
        ("Script", || Script::new().into()),
        ("Subnet", || Subnet::new().into()),
        ("SubnetInput", || SubnetInput::new().into()),
        ("PreviousFrame", || PreviousFrame::new().into()),
        ("Simulation", || Simulation::new().into()),
    ];
    entries.into_iter().collect()
});

/// Fresh operator for `tag`, `None` for unknown tags.
pub fn create(tag: &str) -> Option<NodeKind> {
    REGISTRY.get(tag).map(|ctor| ctor())
}

/// Every registered tag, sorted.
pub fn type_tags() -> Vec<&'static str> {
    let mut tags: Vec<_> = REGISTRY.keys().copied().collect();
    tags.sort_unstable();
    tags
}
