//! Cooking: per-job sessions, the job runner, the single-flight scheduler
//! and the engine that ties them to a live graph.

pub mod context;
pub mod engine;
pub mod events;
pub mod job;
pub mod scheduler;

pub use context::{ContextValue, CookContext, CookSession, Resolved};
pub use engine::{Engine, Published};
pub use events::{CookEvent, CookEventBus};
pub use job::{CookJob, CookReport, JobOutcome};
pub use scheduler::{CancelToken, Scheduler, TaskHandle, TaskOutcome};
