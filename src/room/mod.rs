//! The Room Engine, its state, and the registry that loads/unloads engines (§2, §4.2, §4.4)

pub mod commands;
pub mod engine;
pub mod registry;
pub mod state;
pub mod types;

pub use commands::{AttachParticipant, AttachSpectator, Chat, Detach, EventSender, Move, Ping, RoomCommand, RoomEvent};
pub use engine::{RoomEngineConfig, RoomHandle, RoomMeta};
pub use registry::{RoomRegistry, RoomSummary};
pub use state::RoomCounters;
pub use types::{Avatar, ChatMessage, Participant, RoomRecord};
