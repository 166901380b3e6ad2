//! Data model shared by the Room Engine and its callers (§3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::{Grid, Pos};
use crate::ids::{MessageId, ParticipantId, RoomId};

/// Persisted room record, loaded once when the room is first attached to.
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub id: RoomId,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<ParticipantId>,
    pub owner_username: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub grid: Grid,
}

/// A participant attached to a room, with their live logical position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub avatar: Avatar,
    pub x: u32,
    pub y: u32,
}

/// Visual identity snapshot carried on every participant and chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Avatar {
    pub body_color: String,
}

/// A persisted chat message. `author_name`/`author_avatar` are snapshots
/// taken at insert time and never back-filled (§3, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub author_id: Option<ParticipantId>,
    pub author_name: String,
    pub author_avatar: Avatar,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    pub fn pos(&self) -> Pos {
        Pos::new(self.x, self.y)
    }
}

pub const HISTORY_LIMIT_DEFAULT: usize = 50;
pub const MESSAGE_MAX_LEN_DEFAULT: usize = 500;
pub const WALK_SPEED_DEFAULT: f64 = 4.0;
