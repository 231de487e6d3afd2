//! One visual sprite: base placement plus independent animation channels.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::animation::AnimatedValue;

/// Sprite anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Origin {
    TopLeft,
    TopCentre,
    TopRight,
    CentreLeft,
    #[default]
    Centre,
    CentreRight,
    BottomLeft,
    BottomCentre,
    BottomRight,
}

impl Origin {
    /// Anchor offset in unit sprite space (0..1 on each axis).
    pub fn anchor(self) -> Vec2 {
        match self {
            Origin::TopLeft => Vec2::new(0.0, 0.0),
            Origin::TopCentre => Vec2::new(0.5, 0.0),
            Origin::TopRight => Vec2::new(1.0, 0.0),
            Origin::CentreLeft => Vec2::new(0.0, 0.5),
            Origin::Centre => Vec2::new(0.5, 0.5),
            Origin::CentreRight => Vec2::new(1.0, 0.5),
            Origin::BottomLeft => Vec2::new(0.0, 1.0),
            Origin::BottomCentre => Vec2::new(0.5, 1.0),
            Origin::BottomRight => Vec2::new(1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub position: Vec2,
    pub origin: Origin,
    /// Texture id from the asset store, -1 = none
    pub sprite: i32,
    pub scale: Vec2,

    pub moves: AnimatedValue<Vec2>,
    pub scale_uniform: AnimatedValue<f32>,
    pub scale_vec: AnimatedValue<Vec2>,
    pub rotate: AnimatedValue<f32>,
    pub fade: AnimatedValue<f32>,
    pub color: AnimatedValue<Vec3>,
}

impl Element {
    pub fn new(position: Vec2, sprite: i32) -> Self {
        Self {
            position,
            origin: Origin::default(),
            sprite,
            scale: Vec2::ONE,
            moves: AnimatedValue::new(position),
            scale_uniform: AnimatedValue::new(1.0),
            scale_vec: AnimatedValue::new(Vec2::ONE),
            rotate: AnimatedValue::new(0.0),
            fade: AnimatedValue::new(1.0),
            color: AnimatedValue::new(Vec3::ONE),
        }
    }

    /// Shift every channel in time.
    pub fn shift_time(&mut self, offset: f64) {
        self.moves.shift(offset);
        self.scale_uniform.shift(offset);
        self.scale_vec.shift(offset);
        self.rotate.shift(offset);
        self.fade.shift(offset);
        self.color.shift(offset);
    }

    /// Earliest command start across all channels.
    pub fn start_time(&self) -> Option<f64> {
        [
            self.moves.start_time(),
            self.scale_uniform.start_time(),
            self.scale_vec.start_time(),
            self.rotate.start_time(),
            self.fade.start_time(),
            self.color.start_time(),
        ]
        .into_iter()
        .flatten()
        .reduce(f64::min)
    }

    /// Latest command end across all channels.
    pub fn end_time(&self) -> Option<f64> {
        [
            self.moves.end_time(),
            self.scale_uniform.end_time(),
            self.scale_vec.end_time(),
            self.rotate.end_time(),
            self.fade.end_time(),
            self.color.end_time(),
        ]
        .into_iter()
        .flatten()
        .reduce(f64::max)
    }

    /// Position at `time`: the move channel when animated, else the base position.
    pub fn position_at(&self, time: f64) -> Vec2 {
        if self.moves.is_empty() {
            self.position
        } else {
            self.moves.value_at(time)
        }
    }

    pub fn alpha_at(&self, time: f64) -> f32 {
        self.fade.value_at(time)
    }

    /// Combined scale at `time` (base * uniform * vector).
    pub fn scale_at(&self, time: f64) -> Vec2 {
        self.scale * self.scale_uniform.value_at(time) * self.scale_vec.value_at(time)
    }
}
