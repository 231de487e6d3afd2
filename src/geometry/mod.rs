//! Sprite scene data: elements, per-element attribute columns and the
//! collection that flows along graph connections.

pub mod attribute;
pub mod collection;
pub mod element;

pub use attribute::{AttributeColumn, AttributeError, AttributeKind};
pub use collection::ElementCollection;
pub use element::{Element, Origin};
