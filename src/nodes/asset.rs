//! Operators reading host assets.

use log::warn;

use crate::animation::Easing;
use crate::cook::CookContext;
use crate::error::CookResult;
use crate::geometry::ElementCollection;
use crate::graph::keys::{P_AMOUNT, P_DURATION, P_TEXTURE};
use crate::graph::{Cookable, Params};

/// Assigns a texture from the asset store to every element.
#[derive(Debug, Default)]
pub struct Texture;

impl Texture {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for Texture {
    fn type_tag(&self) -> &'static str {
        "Texture"
    }

    fn default_params(&self) -> Params {
        Params::new().with(P_TEXTURE, "")
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let mut out = ctx.fetch_input(0)?;
        let name = ctx.params().get_str_or(P_TEXTURE, "");
        let id = ctx.texture_id(name);
        if id < 0 {
            warn!("{}: texture '{}' not found", ctx.path(), name);
        }
        for el in out.elements_mut() {
            el.sprite = id;
        }
        Ok(out)
    }
}

/// Scale pulse on every beat of the beatmap within each element's lifetime.
#[derive(Debug, Default)]
pub struct BeatPulse;

impl BeatPulse {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for BeatPulse {
    fn type_tag(&self) -> &'static str {
        "BeatPulse"
    }

    fn default_params(&self) -> Params {
        Params::new().with(P_AMOUNT, 0.2).with(P_DURATION, 100.0)
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let mut out = ctx.fetch_input(0)?;
        let Some(beatmap) = ctx.beatmap() else {
            return Ok(out);
        };
        let amount = ctx.params().get_float_or(P_AMOUNT, 0.2) as f32;
        let duration = ctx.params().get_float_or(P_DURATION, 100.0).max(0.0);

        for el in out.elements_mut() {
            let (Some(start), Some(end)) = (el.start_time(), el.end_time()) else {
                continue;
            };
            for beat in beatmap.beats_between(start, end) {
                el.scale_uniform
                    .tween(beat, beat + duration, 1.0 + amount, 1.0, Easing::OutQuad);
            }
        }
        Ok(out)
    }
}
