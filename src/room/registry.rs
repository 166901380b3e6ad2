//! Lazily loads and unloads Room Engines, and answers discovery queries
//! (§4.4, §6.2 "reserved slug", §9 "Registry concurrency")

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::database::RoomStore;
use crate::error::{Error, Result};
use crate::ids::{ParticipantId, RoomId};
use crate::room::engine::{self, RoomEngineConfig, RoomHandle};
use crate::room::types::RoomRecord;

/// A discovery-surface projection of a room, used by both the thin HTTP
/// routes (§10.6) and the WebSocket room list, if ever added.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub slug: String,
    pub name: String,
    pub owner_username: Option<String>,
    pub is_public: bool,
    pub participant_count: usize,
    pub spectator_count: usize,
}

struct Inner {
    rooms: DashMap<RoomId, RoomHandle>,
    slugs: DashMap<String, RoomId>,
    /// Kill-switches for the cross-room participant displacement rule
    /// (§3 "ownership", §4.3): a fresh auth for an id already attached
    /// elsewhere signals the old connection handler to close before the
    /// new one attaches.
    displacements: DashMap<ParticipantId, mpsc::Sender<()>>,
    /// Serializes the load-or-spawn sequence so two concurrent loads of
    /// the same unloaded room can't race to spawn two engines (§9
    /// "coarse locking").
    load_lock: Mutex<()>,
    store: Arc<dyn RoomStore>,
    engine_config: RoomEngineConfig,
    canonical_slug: String,
}

/// Loads/unloads Room Engines on demand and answers discovery queries.
/// Cheap to clone; internally `Arc`-backed.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<Inner>,
}

impl RoomRegistry {
    /// Boots the registry and eagerly loads the canonical room so it's
    /// resident from the start (§6.2 "A slug `lobby` is reserved...").
    pub async fn bootstrap(
        store: Arc<dyn RoomStore>,
        engine_config: RoomEngineConfig,
        canonical_slug: impl Into<String>,
        canonical_width: u32,
        canonical_height: u32,
    ) -> Result<Self> {
        let registry = Self {
            inner: Arc::new(Inner {
                rooms: DashMap::new(),
                slugs: DashMap::new(),
                displacements: DashMap::new(),
                load_lock: Mutex::new(()),
                store,
                engine_config,
                canonical_slug: canonical_slug.into(),
            }),
        };

        let record = registry
            .inner
            .store
            .ensure_canonical_room(&registry.inner.canonical_slug, canonical_width, canonical_height)
            .await?;

        registry.spawn_and_register(record, true).await?;
        info!(slug = %registry.inner.canonical_slug, "canonical room loaded");
        Ok(registry)
    }

    pub fn canonical_slug(&self) -> &str {
        &self.inner.canonical_slug
    }

    async fn spawn_and_register(&self, mut record: RoomRecord, is_canonical: bool) -> Result<RoomHandle> {
        if record.owner_username.is_none() {
            if let Some(owner_id) = &record.owner_id {
                record.owner_username = self.inner.store.find_user_by_id(owner_id).await?;
            }
        }

        let id = record.id.clone();
        let slug = record.slug.clone();
        let history = self
            .inner
            .store
            .recent_messages(&id, self.inner.engine_config.history_limit)
            .await?;
        // Persisted newest-first; the engine's history wants chronological.
        let mut history = history;
        history.reverse();

        let inner = self.inner.clone();
        let callback_slug = slug.clone();
        let on_empty = move |room_id: RoomId| {
            inner.rooms.remove(&room_id);
            inner.slugs.remove(&callback_slug);
        };

        let handle = engine::spawn(
            record,
            history,
            is_canonical,
            self.inner.engine_config.clone(),
            self.inner.store.clone(),
            on_empty,
        );

        self.inner.rooms.insert(id.clone(), handle.clone());
        self.inner.slugs.insert(slug, id);
        Ok(handle)
    }

    pub async fn load_by_id(&self, id: &RoomId) -> Result<RoomHandle> {
        if let Some(handle) = self.inner.rooms.get(id) {
            return Ok(handle.clone());
        }

        let _guard = self.inner.load_lock.lock().await;
        if let Some(handle) = self.inner.rooms.get(id) {
            return Ok(handle.clone());
        }

        let record = self
            .inner
            .store
            .find_room_by_id(id)
            .await?
            .ok_or_else(|| Error::RoomNotFound(id.to_string()))?;
        let is_canonical = record.slug == self.inner.canonical_slug;
        self.spawn_and_register(record, is_canonical).await
    }

    pub async fn load_by_slug(&self, slug: &str) -> Result<RoomHandle> {
        if let Some(id) = self.inner.slugs.get(slug) {
            if let Some(handle) = self.inner.rooms.get(id.value()) {
                return Ok(handle.clone());
            }
        }

        let _guard = self.inner.load_lock.lock().await;
        if let Some(id) = self.inner.slugs.get(slug) {
            if let Some(handle) = self.inner.rooms.get(id.value()) {
                return Ok(handle.clone());
            }
        }

        let record = self
            .inner
            .store
            .find_room_by_slug(slug)
            .await?
            .ok_or_else(|| Error::RoomNotFound(slug.to_string()))?;
        let is_canonical = record.slug == self.inner.canonical_slug;
        self.spawn_and_register(record, is_canonical).await
    }

    /// Registers `kill` as the current socket for `id`, returning the
    /// previously-registered sender (if any) so the caller can signal it
    /// to close (§3 "ownership").
    pub fn displace(&self, id: ParticipantId, kill: mpsc::Sender<()>) -> Option<mpsc::Sender<()>> {
        self.inner.displacements.insert(id, kill)
    }

    /// Clears a displacement entry, but only if `kill` is still the
    /// currently-registered sender (a newer connection may have already
    /// replaced it).
    pub fn clear_displacement(&self, id: &ParticipantId, kill: &mpsc::Sender<()>) {
        if let Some(current) = self.inner.displacements.get(id) {
            if current.same_channel(kill) {
                drop(current);
                self.inner.displacements.remove(id);
            }
        }
    }

    /// Rooms with at least one attached socket, canonical-room-first when
    /// it would otherwise be omitted for having zero participants (§4.4).
    pub async fn active_rooms(&self) -> Result<Vec<RoomSummary>> {
        let mut summaries: Vec<RoomSummary> = self
            .inner
            .rooms
            .iter()
            .filter_map(|entry| {
                let handle = entry.value();
                let (participants, spectators) = handle.counters();
                if !handle.is_canonical() && participants == 0 {
                    return None;
                }
                Some(RoomSummary {
                    id: handle.id().clone(),
                    slug: handle.slug().to_string(),
                    name: handle.meta().name.clone(),
                    owner_username: handle.meta().owner_username.clone(),
                    is_public: handle.meta().is_public,
                    participant_count: participants,
                    spectator_count: spectators,
                })
            })
            .collect();

        if !summaries.iter().any(|s| s.slug == self.inner.canonical_slug) {
            if let Some(record) = self.inner.store.find_room_by_slug(&self.inner.canonical_slug).await? {
                summaries.push(RoomSummary {
                    id: record.id,
                    slug: record.slug,
                    name: record.name,
                    owner_username: record.owner_username,
                    is_public: record.is_public,
                    participant_count: 0,
                    spectator_count: 0,
                });
            }
        }

        summaries.sort_by(|a, b| {
            let a_canonical = a.slug == self.inner.canonical_slug;
            let b_canonical = b.slug == self.inner.canonical_slug;
            b_canonical
                .cmp(&a_canonical)
                .then_with(|| b.participant_count.cmp(&a.participant_count))
        });

        Ok(summaries)
    }

    /// Loaded rooms with at least one spectator, most-watched first (§4.4).
    pub fn most_watched_rooms(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> = self
            .inner
            .rooms
            .iter()
            .filter_map(|entry| {
                let handle = entry.value();
                let (participants, spectators) = handle.counters();
                if spectators == 0 {
                    return None;
                }
                Some(RoomSummary {
                    id: handle.id().clone(),
                    slug: handle.slug().to_string(),
                    name: handle.meta().name.clone(),
                    owner_username: handle.meta().owner_username.clone(),
                    is_public: handle.meta().is_public,
                    participant_count: participants,
                    spectator_count: spectators,
                })
            })
            .collect();

        summaries.sort_by(|a, b| b.spectator_count.cmp(&a.spectator_count));
        summaries
    }

    /// Case-insensitive substring match over room name and owner display
    /// name, across both loaded rooms and persisted public rooms not
    /// currently loaded, deduplicated by room id (§4.4).
    pub async fn search(&self, query: &str) -> Result<Vec<RoomSummary>> {
        let needle = query.to_lowercase();
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for entry in self.inner.rooms.iter() {
            let handle = entry.value();
            let meta = handle.meta();
            let name_matches = meta.name.to_lowercase().contains(&needle);
            let owner_matches = meta
                .owner_username
                .as_deref()
                .map(|o| o.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if name_matches || owner_matches {
                let (participants, spectators) = handle.counters();
                seen.insert(handle.id().clone());
                out.push(RoomSummary {
                    id: handle.id().clone(),
                    slug: handle.slug().to_string(),
                    name: meta.name.clone(),
                    owner_username: meta.owner_username.clone(),
                    is_public: meta.is_public,
                    participant_count: participants,
                    spectator_count: spectators,
                });
            }
        }

        for mut record in self.inner.store.list_public_rooms().await? {
            if seen.contains(&record.id) {
                continue;
            }
            if record.owner_username.is_none() {
                if let Some(owner_id) = &record.owner_id {
                    record.owner_username = self.inner.store.find_user_by_id(owner_id).await?;
                }
            }
            let name_matches = record.name.to_lowercase().contains(&needle);
            let owner_matches = record
                .owner_username
                .as_deref()
                .map(|o| o.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if name_matches || owner_matches {
                out.push(RoomSummary {
                    id: record.id,
                    slug: record.slug,
                    name: record.name,
                    owner_username: record.owner_username,
                    is_public: record.is_public,
                    participant_count: 0,
                    spectator_count: 0,
                });
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryRoomStore;
    use crate::grid::Grid;
    use crate::room::commands::AttachSpectator;

    async fn test_registry() -> RoomRegistry {
        let store = Arc::new(MemoryRoomStore::new());
        RoomRegistry::bootstrap(store, RoomEngineConfig::default(), "lobby", 20, 20)
            .await
            .unwrap()
    }

    async fn test_registry_with_store() -> (RoomRegistry, Arc<MemoryRoomStore>) {
        let store = Arc::new(MemoryRoomStore::new());
        let registry = RoomRegistry::bootstrap(store.clone(), RoomEngineConfig::default(), "lobby", 20, 20)
            .await
            .unwrap();
        (registry, store)
    }

    #[tokio::test]
    async fn bootstrap_loads_canonical_room_resident() {
        let registry = test_registry().await;
        let handle = registry.load_by_slug("lobby").await.unwrap();
        assert!(handle.is_canonical());
    }

    #[tokio::test]
    async fn load_by_slug_is_idempotent_for_the_same_room() {
        let registry = test_registry().await;
        let a = registry.load_by_slug("lobby").await.unwrap();
        let b = registry.load_by_slug("lobby").await.unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[tokio::test]
    async fn loading_an_unknown_room_fails() {
        let registry = test_registry().await;
        let err = registry.load_by_slug("does-not-exist").await.unwrap_err();
        assert!(matches!(err, Error::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn active_rooms_lists_canonical_room_even_when_empty() {
        let registry = test_registry().await;
        let rooms = registry.active_rooms().await.unwrap();
        assert!(rooms.iter().any(|r| r.slug == "lobby"));
    }

    #[tokio::test]
    async fn active_rooms_excludes_a_non_canonical_room_with_only_spectators() {
        let (registry, store) = test_registry_with_store().await;
        store.seed_room(RoomRecord {
            id: RoomId::new(),
            slug: "watched-only".to_string(),
            name: "Watched Only".to_string(),
            description: None,
            owner_id: None,
            owner_username: None,
            is_public: true,
            created_at: chrono::Utc::now(),
            grid: Grid::open(10, 10),
        });

        let handle = registry.load_by_slug("watched-only").await.unwrap();
        let (tx, _rx) = mpsc::channel(8);
        handle
            .send(crate::room::commands::RoomCommand::AttachSpectator(AttachSpectator { sender: tx }))
            .await
            .unwrap();

        // Give the engine a moment to apply the attach before querying.
        for _ in 0..20 {
            if handle.counters().1 > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(handle.counters(), (0, 1));

        let rooms = registry.active_rooms().await.unwrap();
        assert!(!rooms.iter().any(|r| r.slug == "watched-only"));
    }

    #[tokio::test]
    async fn displacement_returns_previous_sender() {
        let registry = test_registry().await;
        let id = ParticipantId::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        assert!(registry.displace(id.clone(), tx1.clone()).is_none());
        let previous = registry.displace(id, tx2).unwrap();
        assert!(previous.same_channel(&tx1));
    }
}
