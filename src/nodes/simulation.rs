//! Stepped simulation container.
//!
//! The child graph is evaluated at `start, start + step, start + 2*step, ...`
//! and every result is kept. Each step provides the previous frame under
//! `previous_frame`; a `PreviousFrame` node inside reads it.
//!
//! Frame 0 is the container's first input evaluated at `start`. Moving the
//! cursor forward only cooks the missing steps; moving it back is a lookup.
//! Any dirty reason other than a time change drops the frames.

use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;

use super::subnet::container_ports;
use crate::cook::{ContextValue, CookContext};
use crate::error::CookResult;
use crate::geometry::ElementCollection;
use crate::graph::keys::{K_PREVIOUS_FRAME, P_START, P_STEP, Q_DELTA, Q_TIME};
use crate::graph::{Cookable, DirtyReason, NodeSystem, Params, PortLayout, QueryMap, query};

/// Slack for float accumulation when comparing step times
const TIME_EPSILON: f64 = 1e-9;

type Frames = Vec<(f64, Arc<ElementCollection>)>;

#[derive(Debug, Default)]
pub struct Simulation {
    system: NodeSystem,
    frames: Mutex<Frames>,
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    fn frames(&self) -> MutexGuard<'_, Frames> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn frame_count(&self) -> usize {
        self.frames().len()
    }

    pub fn clear_frames(&self) {
        self.frames().clear();
    }

    fn step(ctx: &CookContext<'_>) -> f64 {
        match ctx.params().get_float(P_STEP) {
            Some(step) if step.is_finite() && step > 0.0 => step,
            _ => ctx.config().sim_step,
        }
    }
}

impl Cookable for Simulation {
    fn type_tag(&self) -> &'static str {
        "Simulation"
    }

    fn ports(&self) -> PortLayout {
        container_ports()
    }

    fn default_params(&self) -> Params {
        Params::new().with(P_START, 0.0)
    }

    /// The seed input is always read at `start`.
    fn input_key(&self, params: &Params, slot: usize) -> Option<QueryMap> {
        (slot == 0).then(|| seed_key(params))
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let t = ctx.time();
        let start = ctx.params().get_float_or(P_START, 0.0);
        let step = Self::step(ctx);

        if self.frames().is_empty() {
            let seed = ctx.fetch_input_with(0, &seed_key(ctx.params()))?;
            let mut frames = self.frames();
            if frames.is_empty() {
                frames.push((start, Arc::new(seed)));
            }
        }

        loop {
            let (len, last) = {
                let frames = self.frames();
                (frames.len(), frames.last().map(|(_, c)| Arc::clone(c)))
            };
            let next = start + len as f64 * step;
            let Some(previous) = last else {
                break;
            };
            if next > t + TIME_EPSILON {
                break;
            }
            ctx.checkpoint()?;
            trace!("{}: step {} @ {}", ctx.path(), len, next);
            ctx.provide(K_PREVIOUS_FRAME, ContextValue::Collection(previous));
            let frame = ctx.fetch_output_child(&query([(Q_TIME, next), (Q_DELTA, step)]))?;
            self.frames().push((next, Arc::new(frame)));
        }

        let frames = self.frames();
        let after = frames.partition_point(|(time, _)| *time <= t + TIME_EPSILON);
        let index = after.saturating_sub(1);
        Ok(frames
            .get(index)
            .map(|(_, c)| ElementCollection::clone(c))
            .unwrap_or_default())
    }

    fn system(&self) -> Option<&NodeSystem> {
        Some(&self.system)
    }

    fn system_mut(&mut self) -> Option<&mut NodeSystem> {
        Some(&mut self.system)
    }

    fn invalidate(&self, reason: DirtyReason) {
        if reason != DirtyReason::Time {
            self.clear_frames();
        }
    }
}

fn seed_key(params: &Params) -> QueryMap {
    query([(Q_TIME, params.get_float_or(P_START, 0.0)), (Q_DELTA, 0.0)])
}

/// The previous simulation frame, empty outside a simulation.
#[derive(Debug, Default)]
pub struct PreviousFrame;

impl PreviousFrame {
    pub fn new() -> Self {
        Self
    }
}

impl Cookable for PreviousFrame {
    fn type_tag(&self) -> &'static str {
        "PreviousFrame"
    }

    fn ports(&self) -> PortLayout {
        PortLayout::none()
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        match ctx.inject(K_PREVIOUS_FRAME) {
            Some(ContextValue::Collection(frame)) => Ok(ElementCollection::clone(&frame)),
            _ => Ok(ElementCollection::new()),
        }
    }
}
