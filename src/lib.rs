//! spritecook - incremental cook engine for procedural sprite node graphs
//!
//! A graph of operators produces an [`ElementCollection`] of animated
//! sprites. Edits and time changes mark the affected nodes dirty; a cook
//! job re-evaluates only what changed and reuses cached results otherwise.

pub mod animation;
pub mod cli;
pub mod config;
pub mod cook;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod host;
pub mod nodes;

pub use config::EngineConfig;
pub use cook::{CookJob, CookReport, Engine, JobOutcome, Published};
pub use error::{CookError, CookResult};
pub use geometry::{Element, ElementCollection};
pub use graph::{Node, NodePath};
pub use host::HostServices;
