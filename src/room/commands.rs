//! Messages accepted and emitted by the Room Engine actor (§4.2)

use tokio::sync::mpsc;

use crate::grid::Pos;
use crate::ids::ParticipantId;
use crate::room::types::{Avatar, ChatMessage, Participant, RoomRecord};

/// Outbound event, framed by the connection handler into a wire message.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    RoomState {
        room: RoomRecord,
        participants: Vec<Participant>,
        messages: Vec<ChatMessage>,
    },
    AgentJoined {
        agent: Participant,
    },
    AgentLeft {
        agent_id: ParticipantId,
    },
    AgentPath {
        agent_id: ParticipantId,
        path: Vec<Pos>,
        speed: f64,
    },
    ChatMessage(ChatMessage),
    Error {
        code: &'static str,
        message: String,
    },
    Pong,
}

/// A channel a socket's writer task drains to push frames out. Each
/// attached socket registers one of these with the engine.
pub type EventSender = mpsc::Sender<RoomEvent>;

/// Join the room as a full participant. If `id` is already attached to
/// this engine, the prior socket is detached first (§3 ownership).
#[derive(Debug)]
pub struct AttachParticipant {
    pub id: ParticipantId,
    pub name: String,
    pub avatar: Avatar,
    pub sender: EventSender,
}

/// Join the room as a read-only spectator.
#[derive(Debug)]
pub struct AttachSpectator {
    pub sender: EventSender,
}

/// Leave the room; identified by the same sender handed to Attach*.
#[derive(Debug)]
pub struct Detach {
    pub sender: EventSender,
}

/// Move a participant toward `(x, y)` via pathfinding. Signed so an
/// out-of-range coordinate like `-1` reaches the engine as a validation
/// failure instead of failing to decode off the wire (§8 boundary behaviors).
#[derive(Debug)]
pub struct Move {
    pub id: ParticipantId,
    pub x: i64,
    pub y: i64,
}

/// Post a chat message on behalf of a participant.
#[derive(Debug)]
pub struct Chat {
    pub id: ParticipantId,
    pub content: String,
}

/// Liveness probe; answered with a targeted `Pong`.
#[derive(Debug)]
pub struct Ping {
    pub sender: EventSender,
}

/// The closed set of commands a Room Engine task consumes from its bounded
/// channel (§9 "Single-writer rooms"). One variant per row of the §4.2
/// command table.
#[derive(Debug)]
pub enum RoomCommand {
    AttachParticipant(AttachParticipant),
    AttachSpectator(AttachSpectator),
    Detach(Detach),
    Move(Move),
    Chat(Chat),
    Ping(Ping),
}

/// The engine's inbound side. Every external caller (connection handlers)
/// enqueues onto this; nothing reads `RoomState` without going through it.
pub type CommandSender = mpsc::Sender<RoomCommand>;
