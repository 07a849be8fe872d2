//! The live command surface and subscriber event stream (§4.10, §5).

pub mod commands;
pub mod events;

pub use commands::{
    push_logic, validate, CommandSink, IssueSeverity, PushOutcome, PushTarget, ValidationIssue,
    ValidationOutcome,
};
pub use events::{publish_deploy_step, publish_tick, Broadcaster, SyncEvent};
