//! Structural utilities: pass-through, merge, delete, culling, attributes.

use glam::Vec2;

use crate::cook::CookContext;
use crate::error::{CookError, CookResult};
use crate::geometry::{AttributeKind, ElementCollection};
use crate::graph::keys::{P_AFTER, P_ATTRIBUTE, P_BEFORE, P_COUNT, P_KIND, P_START, P_VALUE};
use crate::graph::{Cookable, Params, PortLayout};

/// Passes its input through unchanged.
#[derive(Debug, Default)]
pub struct Null;

impl Null {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for Null {
    fn type_tag(&self) -> &'static str {
        "Null"
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        ctx.fetch_input(0)
    }
}

/// Appends every collection connected to its input, in connection order.
#[derive(Debug, Default)]
pub struct Merge;

impl Merge {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for Merge {
    fn type_tag(&self) -> &'static str {
        "Merge"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::none().multiple("inputs")
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let mut out = ElementCollection::new();
        for input in ctx.fetch_inputs(0)? {
            out.append(&input)?;
        }
        Ok(out)
    }
}

/// Removes `count` elements starting at index `start`.
#[derive(Debug, Default)]
pub struct Delete;

impl Delete {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for Delete {
    fn type_tag(&self) -> &'static str {
        "Delete"
    }

    fn default_params(&self) -> Params {
        Params::new().with(P_START, 0).with(P_COUNT, 1)
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let mut out = ctx.fetch_input(0)?;
        let start = ctx.params().get_int_or(P_START, 0).max(0) as usize;
        let count = ctx.params().get_int_or(P_COUNT, 1).max(0) as usize;
        let end = start.saturating_add(count);
        out.retain(|i, _| i < start || i >= end);
        Ok(out)
    }
}

/// Keeps elements alive within `[start - before, end + after]` of the cursor.
/// Elements without commands are always kept.
#[derive(Debug, Default)]
pub struct TimeCull;

impl TimeCull {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for TimeCull {
    fn type_tag(&self) -> &'static str {
        "TimeCull"
    }

    fn default_params(&self) -> Params {
        Params::new().with(P_BEFORE, 0.0).with(P_AFTER, 0.0)
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let mut out = ctx.fetch_input(0)?;
        let before = ctx.params().get_float_or(P_BEFORE, 0.0);
        let after = ctx.params().get_float_or(P_AFTER, 0.0);
        let t = ctx.time();
        out.retain(|_, el| match (el.start_time(), el.end_time()) {
            (Some(start), Some(end)) => start - before <= t && t <= end + after,
            _ => true,
        });
        Ok(out)
    }
}

/// Writes a constant into an attribute column, creating it when missing.
#[derive(Debug, Default)]
pub struct SetAttribute;

impl SetAttribute {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for SetAttribute {
    fn type_tag(&self) -> &'static str {
        "SetAttribute"
    }

    fn default_params(&self) -> Params {
        Params::new()
            .with(P_ATTRIBUTE, "value")
            .with(P_KIND, "float")
            .with(P_VALUE, 0.0)
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let params = ctx.params();
        let name = params.get_str_or(P_ATTRIBUTE, "");
        if name.is_empty() {
            return Err(CookError::node("attribute name is empty"));
        }
        let tag = params.get_str_or(P_KIND, "float");
        let kind = AttributeKind::from_tag(tag)
            .ok_or_else(|| CookError::node(format!("unknown attribute kind '{}'", tag)))?;

        let mut out = ctx.fetch_input(0)?;
        let len = out.len();
        let column = out.add_attribute(name, kind)?;
        match kind {
            AttributeKind::Float => {
                let v = params.get_float_or(P_VALUE, 0.0) as f32;
                for i in 0..len {
                    column.set_float(i, v)?;
                }
            }
            AttributeKind::Int => {
                let v = params.get_int_or(P_VALUE, 0) as i32;
                for i in 0..len {
                    column.set_int(i, v)?;
                }
            }
            AttributeKind::Vec2 => {
                let v = Vec2::from(params.get_vec2(P_VALUE).unwrap_or([0.0, 0.0]));
                for i in 0..len {
                    column.set_vec2(i, v)?;
                }
            }
            AttributeKind::Presence => {
                let v = params.get_bool_or(P_VALUE, true);
                for i in 0..len {
                    column.set_present(i, v)?;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::AttributeError;
    use crate::graph::keys::{P_COLS, P_ROWS};
    use crate::graph::{CookStatus, Node, NodePath};
    use crate::nodes::generators::ATTR_ID;
    use crate::nodes::testing::{add, connect, cook_at, host};
    use crate::nodes::Grid;

    fn small_grid(root: &mut Node, name: &str, cols: i64) -> crate::graph::NodeId {
        add(
            root,
            Node::new(name, Grid::new()).with_params(Params::new().with(P_ROWS, 1).with(P_COLS, cols)),
        )
    }

    #[test]
    fn test_merge_keeps_connection_order() {
        let mut root = Node::root();
        let a = small_grid(&mut root, "a", 2);
        let b = small_grid(&mut root, "b", 3);
        let m = add(&mut root, Node::new("merge", Merge::new()));
        connect(&mut root, b, m, 0);
        connect(&mut root, a, m, 0);

        let host = host();
        let out = cook_at(&root, &host, "/merge", 0.0).collection.unwrap();
        assert_eq!(out.len(), 5);
        let ids = out.attribute(ATTR_ID).unwrap();
        let ids: Vec<i32> = (0..5).map(|i| ids.get_int(i).unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_delete_range() {
        let mut root = Node::root();
        let g = small_grid(&mut root, "grid", 5);
        let d = add(
            &mut root,
            Node::new("del", Delete::new()).with_params(Params::new().with(P_START, 1).with(P_COUNT, 2)),
        );
        connect(&mut root, g, d, 0);

        let host = host();
        let out = cook_at(&root, &host, "/del", 0.0).collection.unwrap();
        let ids = out.attribute(ATTR_ID).unwrap();
        let ids: Vec<i32> = (0..out.len()).map(|i| ids.get_int(i).unwrap()).collect();
        assert_eq!(ids, vec![0, 3, 4]);
    }

    #[test]
    fn test_time_cull_window() {
        let mut root = Node::root();
        let g = small_grid(&mut root, "grid", 2);
        let c = add(
            &mut root,
            Node::new("cull", TimeCull::new()).with_params(Params::new().with(P_AFTER, 100.0)),
        );
        connect(&mut root, g, c, 0);

        let host = host();
        assert_eq!(cook_at(&root, &host, "/cull", 550.0).collection.unwrap().len(), 2);
        crate::graph::mark_kinds_dirty(
            &root,
            crate::graph::DependencyKinds::TIME,
            crate::graph::DirtyReason::Time,
        );
        assert!(cook_at(&root, &host, "/cull", 700.0).collection.unwrap().is_empty());
    }

    #[test]
    fn test_set_attribute_kinds() {
        let mut root = Node::root();
        let g = small_grid(&mut root, "grid", 3);
        let s = add(
            &mut root,
            Node::new("set", SetAttribute::new()).with_params(
                Params::new()
                    .with(P_ATTRIBUTE, "offset")
                    .with(P_KIND, "vec2")
                    .with(P_VALUE, [1.0f32, -2.0]),
            ),
        );
        connect(&mut root, g, s, 0);

        let host = host();
        let out = cook_at(&root, &host, "/set", 0.0).collection.unwrap();
        assert_eq!(out.attribute("offset").unwrap().get_vec2(2).unwrap(), Vec2::new(1.0, -2.0));
    }

    #[test]
    fn test_set_attribute_conflicting_kind_fails() {
        let mut root = Node::root();
        let g = small_grid(&mut root, "grid", 3);
        let s = add(
            &mut root,
            Node::new("set", SetAttribute::new())
                .with_params(Params::new().with(P_ATTRIBUTE, ATTR_ID).with(P_KIND, "float")),
        );
        connect(&mut root, g, s, 0);

        let host = host();
        let report = cook_at(&root, &host, "/set", 0.0);
        assert_eq!(
            report.outcome,
            crate::cook::JobOutcome::Failed(CookError::Attribute(AttributeError::KindMismatch {
                expected: AttributeKind::Float,
                found: AttributeKind::Int,
            }))
        );
        let node = root.find(&NodePath::parse("/set")).unwrap();
        assert_eq!(node.status(), CookStatus::Error);
    }
}
