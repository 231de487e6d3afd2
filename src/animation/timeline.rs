//! Keyframe timelines for a single value channel.
//!
//! An `AnimatedValue<T>` is a list of time-bounded interpolation commands
//! kept sorted by start time. Sampling is a binary search on start time:
//!
//! - no commands: the channel default
//! - before the first command: the first command's start value
//! - inside a command: eased interpolation
//! - between commands or after the last: the preceding command's end value
//! - exactly on a boundary: the command starting there wins, so two adjacent
//!   commands are never averaged

use glam::{Vec2, Vec3};

use super::easing::Easing;

/// Linear interpolation between two values of a channel type.
pub trait Lerp: Copy {
    fn lerp(self, other: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Vec2 {
    fn lerp(self, other: Self, t: f32) -> Self {
        Vec2::lerp(self, other, t)
    }
}

impl Lerp for Vec3 {
    fn lerp(self, other: Self, t: f32) -> Self {
        Vec3::lerp(self, other, t)
    }
}

/// One interpolation segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command<T> {
    pub start_time: f64,
    pub end_time: f64,
    pub start_value: T,
    pub end_value: T,
    pub easing: Easing,
}

impl<T: Lerp> Command<T> {
    pub fn new(start_time: f64, end_time: f64, start_value: T, end_value: T) -> Self {
        Self {
            start_time,
            end_time,
            start_value,
            end_value,
            easing: Easing::Linear,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Sample inside this command. Times outside are clamped to the ends.
    pub fn value_at(&self, time: f64) -> T {
        let duration = self.duration();
        if duration <= 0.0 {
            return if time >= self.end_time {
                self.end_value
            } else {
                self.start_value
            };
        }
        let progress = ((time - self.start_time) / duration) as f32;
        self.start_value
            .lerp(self.end_value, self.easing.apply(progress))
    }
}

/// Sorted command list for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimatedValue<T> {
    commands: Vec<Command<T>>,
    default: T,
}

impl<T: Lerp> AnimatedValue<T> {
    pub fn new(default: T) -> Self {
        Self {
            commands: Vec::new(),
            default,
        }
    }

    /// Insert keeping start-time order; equal starts keep insertion order.
    pub fn add(&mut self, command: Command<T>) {
        let idx = self
            .commands
            .partition_point(|c| c.start_time <= command.start_time);
        self.commands.insert(idx, command);
    }

    /// Shorthand for `add(Command::new(..).with_easing(..))`.
    pub fn tween(&mut self, start_time: f64, end_time: f64, from: T, to: T, easing: Easing) {
        self.add(Command::new(start_time, end_time, from, to).with_easing(easing));
    }

    pub fn value_at(&self, time: f64) -> T {
        let Some(first) = self.commands.first() else {
            return self.default;
        };

        let idx = self.commands.partition_point(|c| c.start_time <= time);
        if idx == 0 {
            return first.start_value;
        }

        let command = &self.commands[idx - 1];
        if time >= command.end_time {
            command.end_value
        } else {
            command.value_at(time)
        }
    }

    pub fn default_value(&self) -> T {
        self.default
    }

    pub fn commands(&self) -> &[Command<T>] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Move every command by `offset` (order is unaffected).
    pub fn shift(&mut self, offset: f64) {
        for command in &mut self.commands {
            command.start_time += offset;
            command.end_time += offset;
        }
    }

    pub fn start_time(&self) -> Option<f64> {
        self.commands.first().map(|c| c.start_time)
    }

    /// Latest end time; commands may overlap so this is not always the last one's.
    pub fn end_time(&self) -> Option<f64> {
        self.commands
            .iter()
            .map(|c| c.end_time)
            .reduce(f64::max)
    }
}

impl<T: Lerp + Default> Default for AnimatedValue<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
