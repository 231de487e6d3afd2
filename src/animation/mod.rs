//! Keyframed value channels and easing curves.

pub mod easing;
pub mod timeline;

pub use easing::Easing;
pub use timeline::{AnimatedValue, Command, Lerp};
