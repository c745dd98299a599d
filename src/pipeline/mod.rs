//! The dispatch decision pipeline: routing, email resolution, templating,
//! and the orchestrator that sequences them per message.

pub mod email;
pub mod orchestrator;
pub mod router;
pub mod templates;
pub mod types;

pub use orchestrator::{DispatchOrchestrator, RecoveryReport};
pub use types::{EmailResolution, RoutingDecision, RunStats, SkipReason};
