//! Conversation engine: reply policy, background renames and the orchestrator.

pub mod orchestrator;
pub mod policy;
pub mod rename;

pub use orchestrator::{ChatOrchestrator, ChatSnapshot, TurnOutcome};
pub use policy::ReplyPolicy;
pub use rename::{RenameScheduler, RenameStep, RenameTarget};
