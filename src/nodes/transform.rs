//! Time transforms.

use crate::cook::CookContext;
use crate::error::CookResult;
use crate::geometry::ElementCollection;
use crate::graph::keys::{P_AMOUNT, P_OFFSET, Q_TIME};
use crate::graph::{Cookable, Params, query};

/// Shifts every timeline of every element by `amount` ms.
#[derive(Debug, Default)]
pub struct Offset;

impl Offset {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for Offset {
    fn type_tag(&self) -> &'static str {
        "Offset"
    }

    fn default_params(&self) -> Params {
        Params::new().with(P_AMOUNT, 0.0)
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let mut out = ctx.fetch_input(0)?;
        let amount = ctx.params().get_float_or(P_AMOUNT, 0.0);
        if amount != 0.0 {
            out.shift_time(amount);
        }
        Ok(out)
    }
}

/// Evaluates its input at `time + offset`.
#[derive(Debug, Default)]
pub struct TimeShift;

impl TimeShift {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for TimeShift {
    fn type_tag(&self) -> &'static str {
        "TimeShift"
    }

    fn default_params(&self) -> Params {
        Params::new().with(P_OFFSET, 0.0)
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let offset = ctx.params().get_float_or(P_OFFSET, 0.0);
        let shifted = ctx.time() + offset;
        ctx.fetch_input_with(0, &query([(Q_TIME, shifted)]))
    }
}
