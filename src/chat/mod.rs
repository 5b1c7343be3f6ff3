//! Chat orchestration: capabilities, persistence and conversation flow.

pub mod capability;
pub mod core;
pub mod engine;
pub mod storage;

pub use capability::{Activity, CapabilityError, CapabilityGateways, CapabilityResult};
pub use self::core::{
    ChatConfig, ChatError, ChatResult, Message, MessageId, Role, Session, SessionId,
};
pub use engine::{ChatOrchestrator, ChatSnapshot, TurnOutcome};
pub use storage::{KeyValueStore, MemoryKvStore, SessionStore, SqliteKvStore};
