//! JSON wire codec (§4.5, §6.1)
//!
//! A single JSON object per frame, tagged by a `type` field. Deserializing
//! a frame that lacks a string `type`, or carries an unrecognized one,
//! fails the same way — the caller turns that failure into a targeted
//! `error{code: INVALID_MESSAGE}` frame without closing the socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::Pos;
use crate::ids::{MessageId, ParticipantId, RoomId};
use crate::room::commands::RoomEvent;
use crate::room::types::{Avatar, ChatMessage, Participant, RoomRecord};

/// Client → server frames (§6.1).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    Join {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Leave,
    Move {
        x: i64,
        y: i64,
    },
    Chat {
        message: String,
    },
    Ping,
}

/// The visual identity shape carried on `auth_ok` and agent snapshots,
/// distinct from the smaller `avatarConfig` shape on chat messages.
#[derive(Debug, Clone, Serialize)]
pub struct AvatarWire {
    pub id: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "bodyColor")]
    pub body_color: String,
}

impl AvatarWire {
    fn for_participant(id: &ParticipantId, avatar: &Avatar) -> Self {
        Self {
            id: id.to_string(),
            agent_id: id.to_string(),
            body_color: avatar.body_color.clone(),
        }
    }
}

/// The smaller avatar shape snapshotted onto chat messages.
#[derive(Debug, Clone, Serialize)]
pub struct AvatarConfigWire {
    #[serde(rename = "bodyColor")]
    pub body_color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantWire {
    pub id: String,
    pub name: String,
    pub avatar: AvatarWire,
    pub x: u32,
    pub y: u32,
}

impl From<&Participant> for ParticipantWire {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.clone(),
            avatar: AvatarWire::for_participant(&p.id, &p.avatar),
            x: p.x,
            y: p.y,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomWire {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "ownerId", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(rename = "ownerUsername", skip_serializing_if = "Option::is_none")]
    pub owner_username: Option<String>,
    pub width: u32,
    pub height: u32,
    pub tiles: Vec<bool>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "isPublic")]
    pub is_public: bool,
}

impl RoomWire {
    fn from_record(record: &RoomRecord) -> Self {
        let mut tiles = Vec::with_capacity((record.grid.width * record.grid.height) as usize);
        for y in 0..record.grid.height {
            for x in 0..record.grid.width {
                tiles.push(record.grid.walkable(x, y));
            }
        }
        Self {
            id: record.id.to_string(),
            name: record.name.clone(),
            slug: record.slug.clone(),
            description: record.description.clone(),
            owner_id: record.owner_id.as_ref().map(ToString::to_string),
            owner_username: record.owner_username.clone(),
            width: record.grid.width,
            height: record.grid.height,
            tiles,
            created_at: record.created_at,
            is_public: record.is_public,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessageWire {
    pub id: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "agentId", skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(rename = "agentName")]
    pub agent_name: String,
    #[serde(rename = "avatarConfig")]
    pub avatar_config: AvatarConfigWire,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatMessage> for ChatMessageWire {
    fn from(m: &ChatMessage) -> Self {
        Self {
            id: m.id.to_string(),
            room_id: m.room_id.to_string(),
            agent_id: m.author_id.as_ref().map(ToString::to_string),
            agent_name: m.author_name.clone(),
            avatar_config: AvatarConfigWire {
                body_color: m.author_avatar.body_color.clone(),
            },
            content: m.content.clone(),
            timestamp: m.created_at,
        }
    }
}

/// Server → client frames (§6.1).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthOk {
        #[serde(rename = "agentId")]
        agent_id: String,
        name: String,
        avatar: AvatarWire,
    },
    AuthError {
        error: String,
    },
    RoomState {
        room: RoomWire,
        agents: Vec<ParticipantWire>,
        messages: Vec<ChatMessageWire>,
    },
    AgentJoined {
        agent: ParticipantWire,
    },
    AgentLeft {
        #[serde(rename = "agentId")]
        agent_id: String,
    },
    AgentMoved {
        #[serde(rename = "agentId")]
        agent_id: String,
        x: u32,
        y: u32,
    },
    AgentPath {
        #[serde(rename = "agentId")]
        agent_id: String,
        path: Vec<Pos>,
        speed: f64,
    },
    ChatMessage(ChatMessageWire),
    Error {
        code: String,
        message: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn auth_ok(id: &ParticipantId, name: &str, avatar: &Avatar) -> Self {
        Self::AuthOk {
            agent_id: id.to_string(),
            name: name.to_string(),
            avatar: AvatarWire::for_participant(id, avatar),
        }
    }

    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::AuthError { error: message.into() }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Translates a Room Engine event into the wire frame a socket sends out
/// (§4.2 emitted-events column, §4.5).
impl From<RoomEvent> for ServerMessage {
    fn from(event: RoomEvent) -> Self {
        match event {
            RoomEvent::RoomState { room, participants, messages } => ServerMessage::RoomState {
                room: RoomWire::from_record(&room),
                agents: participants.iter().map(ParticipantWire::from).collect(),
                messages: messages.iter().map(ChatMessageWire::from).collect(),
            },
            RoomEvent::AgentJoined { agent } => ServerMessage::AgentJoined {
                agent: ParticipantWire::from(&agent),
            },
            RoomEvent::AgentLeft { agent_id } => ServerMessage::AgentLeft {
                agent_id: agent_id.to_string(),
            },
            RoomEvent::AgentPath { agent_id, path, speed } => ServerMessage::AgentPath {
                agent_id: agent_id.to_string(),
                path,
                speed,
            },
            RoomEvent::ChatMessage(message) => ServerMessage::ChatMessage(ChatMessageWire::from(&message)),
            RoomEvent::Error { code, message } => ServerMessage::error(code, message),
            RoomEvent::Pong => ServerMessage::Pong,
        }
    }
}

pub fn encode(message: &ServerMessage) -> String {
    serde_json::to_string(message).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode outbound frame");
        r#"{"type":"error","code":"INTERNAL_ERROR","message":"encode failure"}"#.to_string()
    })
}

pub fn decode(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}
