//! The persistence capability the core consumes (§6.2, SPEC_FULL §10.2)
//!
//! `RoomStore` is the object-safe trait the Room Registry and Room Engine
//! are written against. `PostgresRoomStore` is the concrete adapter this
//! crate ships, built the way the teacher's `database.rs` builds its pool
//! (retry with exponential backoff). `MemoryRoomStore` backs unit and
//! integration tests so they don't need a live Postgres instance, the same
//! way the teacher isolates storage behind a trait object for testability.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::ids::{MessageId, ParticipantId, RoomId};
use crate::room::types::{Avatar, ChatMessage, RoomRecord};

/// The §6.2 persistence capability, as an object-safe trait so the engine
/// and registry can be built against either the Postgres adapter or the
/// in-memory test double without a generic parameter threaded everywhere.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn find_room_by_slug(&self, slug: &str) -> Result<Option<RoomRecord>>;
    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<RoomRecord>>;
    async fn list_public_rooms(&self) -> Result<Vec<RoomRecord>>;
    /// Newest first, as specified in §6.2.
    async fn recent_messages(&self, room_id: &RoomId, limit: usize) -> Result<Vec<ChatMessage>>;
    async fn insert_message(
        &self,
        room_id: &RoomId,
        author_id: Option<&ParticipantId>,
        name_snapshot: &str,
        color_snapshot: &str,
        content: &str,
    ) -> Result<ChatMessage>;
    async fn touch_last_seen(&self, participant_id: &ParticipantId) -> Result<()>;
    /// Resolves a display username for discovery's owner-name search (§4.4).
    async fn find_user_by_id(&self, id: &ParticipantId) -> Result<Option<String>>;
    /// Idempotently creates the canonical room (§6.2 "A slug `lobby` is
    /// reserved...") if it does not already exist, returning it either way.
    async fn ensure_canonical_room(&self, slug: &str, width: u32, height: u32) -> Result<RoomRecord>;
    /// Cheap liveness probe backing the `/ready` route (SPEC_FULL §10.6).
    async fn health_check(&self) -> Result<()>;
}

fn tiles_to_text(grid: &Grid) -> String {
    let mut out = String::with_capacity((grid.width * grid.height) as usize);
    for y in 0..grid.height {
        for x in 0..grid.width {
            out.push(if grid.walkable(x, y) { '0' } else { '1' });
        }
    }
    out
}

fn tiles_from_text(text: &str, width: u32, height: u32) -> Grid {
    let tiles: Vec<bool> = text.chars().map(|c| c != '1').collect();
    let mut grid = Grid::new(width, height, tiles);
    grid.normalize_borders();
    grid
}

// ---------------------------------------------------------------------
// Postgres adapter
// ---------------------------------------------------------------------

pub struct PostgresRoomStore {
    pool: PgPool,
}

impl PostgresRoomStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with retry/backoff, mirroring the teacher's
    /// `database::create_pool` shape.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut attempt = 0;
        let base_delay = Duration::from_secs(config.retry_delay_secs);

        loop {
            let attempted = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
                .connect(&config.url)
                .await;

            match attempted {
                Ok(pool) => return Ok(Self::new(pool)),
                Err(e) => {
                    attempt += 1;
                    if attempt > config.max_retries {
                        return Err(Error::Persistence(format!(
                            "failed to connect to database after {attempt} attempts: {e}"
                        )));
                    }
                    let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));
                    tracing::warn!(attempt, ?delay, error = %e, "database connection attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn row_to_room(
        &self,
        id: String,
        slug: String,
        name: String,
        description: Option<String>,
        owner_id: Option<String>,
        is_public: bool,
        width: i32,
        height: i32,
        tiles: String,
        created_at: chrono::DateTime<Utc>,
    ) -> Result<RoomRecord> {
        let grid = tiles_from_text(&tiles, width as u32, height as u32);
        Ok(RoomRecord {
            id: RoomId::from_str(&id).map_err(|e| Error::Internal(e.to_string()))?,
            slug,
            name,
            description,
            owner_id: owner_id
                .map(|o| ParticipantId::from_str(&o))
                .transpose()
                .map_err(|e| Error::Internal(e.to_string()))?,
            owner_username: None,
            is_public,
            created_at,
            grid,
        })
    }
}

#[async_trait]
impl RoomStore for PostgresRoomStore {
    async fn find_room_by_slug(&self, slug: &str) -> Result<Option<RoomRecord>> {
        let row = sqlx::query(
            "SELECT id, slug, name, description, owner_id, is_public, width, height, tiles, created_at \
             FROM rooms WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            self.row_to_room(
                r.get("id"),
                r.get("slug"),
                r.get("name"),
                r.get("description"),
                r.get("owner_id"),
                r.get("is_public"),
                r.get("width"),
                r.get("height"),
                r.get("tiles"),
                r.get("created_at"),
            )
        })
        .transpose()
    }

    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<RoomRecord>> {
        let row = sqlx::query(
            "SELECT id, slug, name, description, owner_id, is_public, width, height, tiles, created_at \
             FROM rooms WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            self.row_to_room(
                r.get("id"),
                r.get("slug"),
                r.get("name"),
                r.get("description"),
                r.get("owner_id"),
                r.get("is_public"),
                r.get("width"),
                r.get("height"),
                r.get("tiles"),
                r.get("created_at"),
            )
        })
        .transpose()
    }

    async fn list_public_rooms(&self) -> Result<Vec<RoomRecord>> {
        let rows = sqlx::query(
            "SELECT id, slug, name, description, owner_id, is_public, width, height, tiles, created_at \
             FROM rooms WHERE is_public = true",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                self.row_to_room(
                    r.get("id"),
                    r.get("slug"),
                    r.get("name"),
                    r.get("description"),
                    r.get("owner_id"),
                    r.get("is_public"),
                    r.get("width"),
                    r.get("height"),
                    r.get("tiles"),
                    r.get("created_at"),
                )
            })
            .collect()
    }

    async fn recent_messages(&self, room_id: &RoomId, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT id, room_id, author_id, author_name, author_color, content, created_at \
             FROM chat_messages WHERE room_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(room_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let id: String = r.get("id");
                let room_id: String = r.get("room_id");
                let author_id: Option<String> = r.get("author_id");
                Ok(ChatMessage {
                    id: MessageId::from_str(&id).map_err(|e| Error::Internal(e.to_string()))?,
                    room_id: RoomId::from_str(&room_id).map_err(|e| Error::Internal(e.to_string()))?,
                    author_id: author_id
                        .map(|a| ParticipantId::from_str(&a))
                        .transpose()
                        .map_err(|e| Error::Internal(e.to_string()))?,
                    author_name: r.get("author_name"),
                    author_avatar: Avatar {
                        body_color: r.get("author_color"),
                    },
                    content: r.get("content"),
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }

    async fn insert_message(
        &self,
        room_id: &RoomId,
        author_id: Option<&ParticipantId>,
        name_snapshot: &str,
        color_snapshot: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        let id = MessageId::new();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO chat_messages (id, room_id, author_id, author_name, author_color, content, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id.as_str())
        .bind(room_id.as_str())
        .bind(author_id.map(|a| a.as_str()))
        .bind(name_snapshot)
        .bind(color_snapshot)
        .bind(content)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ChatMessage {
            id,
            room_id: room_id.clone(),
            author_id: author_id.cloned(),
            author_name: name_snapshot.to_string(),
            author_avatar: Avatar {
                body_color: color_snapshot.to_string(),
            },
            content: content.to_string(),
            created_at: now,
        })
    }

    async fn touch_last_seen(&self, participant_id: &ParticipantId) -> Result<()> {
        sqlx::query("UPDATE users SET last_seen_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(participant_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: &ParticipantId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT username FROM users WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("username")))
    }

    async fn ensure_canonical_room(&self, slug: &str, width: u32, height: u32) -> Result<RoomRecord> {
        if let Some(room) = self.find_room_by_slug(slug).await? {
            return Ok(room);
        }

        let id = RoomId::new();
        let now = Utc::now();
        let grid = Grid::open(width, height);
        let tiles = tiles_to_text(&grid);

        sqlx::query(
            "INSERT INTO rooms (id, slug, name, description, owner_id, is_public, width, height, tiles, created_at) \
             VALUES ($1, $2, $3, NULL, NULL, true, $4, $5, $6, $7)",
        )
        .bind(id.as_str())
        .bind(slug)
        .bind("Lobby")
        .bind(width as i32)
        .bind(height as i32)
        .bind(&tiles)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(RoomRecord {
            id,
            slug: slug.to_string(),
            name: "Lobby".to_string(),
            description: None,
            owner_id: None,
            owner_username: None,
            is_public: true,
            created_at: now,
            grid,
        })
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// In-memory adapter (tests, SPEC_FULL §10.2 / §10.8)
// ---------------------------------------------------------------------

struct MemoryInner {
    rooms: HashMap<RoomId, RoomRecord>,
    slugs: HashMap<String, RoomId>,
    messages: HashMap<RoomId, Vec<ChatMessage>>,
    usernames: HashMap<ParticipantId, String>,
}

/// A plain `Mutex`-guarded double for the persistence capability, used by
/// unit and integration tests so they don't require a live Postgres
/// instance (SPEC_FULL §10.2).
pub struct MemoryRoomStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                rooms: HashMap::new(),
                slugs: HashMap::new(),
                messages: HashMap::new(),
                usernames: HashMap::new(),
            }),
        }
    }

    /// Test helper: seed a room record directly.
    pub fn seed_room(&self, room: RoomRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.slugs.insert(room.slug.clone(), room.id.clone());
        inner.rooms.insert(room.id.clone(), room);
    }

    pub fn seed_username(&self, id: ParticipantId, username: impl Into<String>) {
        self.inner.lock().unwrap().usernames.insert(id, username.into());
    }
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn find_room_by_slug(&self, slug: &str) -> Result<Option<RoomRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .slugs
            .get(slug)
            .and_then(|id| inner.rooms.get(id))
            .cloned())
    }

    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<RoomRecord>> {
        Ok(self.inner.lock().unwrap().rooms.get(id).cloned())
    }

    async fn list_public_rooms(&self) -> Result<Vec<RoomRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rooms
            .values()
            .filter(|r| r.is_public)
            .cloned()
            .collect())
    }

    async fn recent_messages(&self, room_id: &RoomId, limit: usize) -> Result<Vec<ChatMessage>> {
        let inner = self.inner.lock().unwrap();
        let mut messages = inner.messages.get(room_id).cloned().unwrap_or_default();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn insert_message(
        &self,
        room_id: &RoomId,
        author_id: Option<&ParticipantId>,
        name_snapshot: &str,
        color_snapshot: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = ChatMessage {
            id: MessageId::new(),
            room_id: room_id.clone(),
            author_id: author_id.cloned(),
            author_name: name_snapshot.to_string(),
            author_avatar: Avatar {
                body_color: color_snapshot.to_string(),
            },
            content: content.to_string(),
            created_at: Utc::now(),
        };

        self.inner
            .lock()
            .unwrap()
            .messages
            .entry(room_id.clone())
            .or_default()
            .push(message.clone());

        Ok(message)
    }

    async fn touch_last_seen(&self, _participant_id: &ParticipantId) -> Result<()> {
        Ok(())
    }

    async fn find_user_by_id(&self, id: &ParticipantId) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().usernames.get(id).cloned())
    }

    async fn ensure_canonical_room(&self, slug: &str, width: u32, height: u32) -> Result<RoomRecord> {
        if let Some(room) = self.find_room_by_slug(slug).await? {
            return Ok(room);
        }
        let room = RoomRecord {
            id: RoomId::new(),
            slug: slug.to_string(),
            name: "Lobby".to_string(),
            description: None,
            owner_id: None,
            owner_username: None,
            is_public: true,
            created_at: Utc::now(),
            grid: Grid::open(width, height),
        };
        self.seed_room(room.clone());
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_canonical_room_is_idempotent() {
        let store = MemoryRoomStore::new();
        let first = store.ensure_canonical_room("lobby", 20, 20).await.unwrap();
        let second = store.ensure_canonical_room("lobby", 20, 20).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn recent_messages_returns_newest_first_and_respects_limit() {
        let store = MemoryRoomStore::new();
        let room = store.ensure_canonical_room("lobby", 20, 20).await.unwrap();

        for i in 0..5 {
            store
                .insert_message(&room.id, None, "Alice", "#3B82F6", &format!("msg {i}"))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(&room.id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "msg 4");
    }

    #[test]
    fn tiles_round_trip_through_text() {
        let grid = Grid::new(3, 3, vec![true, false, true, true, true, true, false, true, true]);
        let text = tiles_to_text(&grid);
        let restored = tiles_from_text(&text, 3, 3);
        // interior tile (1,0) was blocked and stays blocked; borders get
        // normalized back to walkable regardless of stored value.
        assert!(!restored.walkable(1, 0));
        assert!(restored.walkable(0, 0));
    }
}
