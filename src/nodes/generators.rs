//! Generators: operators that create elements from parameters alone.

use glam::Vec2;

use crate::animation::Easing;
use crate::cook::CookContext;
use crate::error::{CookError, CookResult};
use crate::geometry::{AttributeKind, Element, ElementCollection};
use crate::graph::keys::{P_COLS, P_DURATION, P_ROWS, P_SPACING, P_SPRITE, P_START};
use crate::graph::{Cookable, Params, PortLayout};

/// Element index column written by generators
pub const ATTR_ID: &str = "id";

/// Largest element count a generator will allocate
pub const MAX_ELEMENTS: usize = 1 << 20;

fn grid_size(rows: i64, cols: i64) -> CookResult<(usize, usize)> {
    let rows = usize::try_from(rows.max(0)).unwrap_or(usize::MAX);
    let cols = usize::try_from(cols.max(0)).unwrap_or(usize::MAX);
    match rows.checked_mul(cols) {
        Some(count) if count <= MAX_ELEMENTS => Ok((rows, cols)),
        _ => Err(CookError::node(format!(
            "grid of {} x {} exceeds {} elements",
            rows, cols, MAX_ELEMENTS
        ))),
    }
}

/// Rows x cols grid of sprites fading in over `[start, start + duration]`.
#[derive(Debug, Default)]
pub struct Grid;

impl Grid {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for Grid {
    fn type_tag(&self) -> &'static str {
        "Grid"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::none()
    }

    fn default_params(&self) -> Params {
        Params::new()
            .with(P_ROWS, 4)
            .with(P_COLS, 4)
            .with(P_SPACING, 32.0)
            .with(P_START, 0.0)
            .with(P_DURATION, 500.0)
            .with(P_SPRITE, -1)
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let params = ctx.params();
        let (rows, cols) = grid_size(params.get_int_or(P_ROWS, 4), params.get_int_or(P_COLS, 4))?;
        let spacing = params.get_float_or(P_SPACING, 32.0) as f32;
        let start = params.get_float_or(P_START, 0.0);
        let duration = params.get_float_or(P_DURATION, 500.0).max(0.0);
        let sprite = params.get_int_or(P_SPRITE, -1) as i32;

        let mut out = ElementCollection::new();
        for r in 0..rows {
            ctx.checkpoint()?;
            for c in 0..cols {
                let mut el = Element::new(Vec2::new(c as f32 * spacing, r as f32 * spacing), sprite);
                el.fade.tween(start, start + duration, 0.0, 1.0, Easing::Linear);
                out.push(el);
            }
        }

        let ids = out.add_attribute(ATTR_ID, AttributeKind::Int)?;
        for i in 0..rows * cols {
            ids.set_int(i, i as i32)?;
        }
        Ok(out)
    }
}
