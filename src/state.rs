//! Application state shared across HTTP and WebSocket handlers

use std::sync::Arc;

use crate::config::Config;
use crate::database::RoomStore;
use crate::room::RoomRegistry;

/// Everything an axum handler needs: the resolved configuration, the
/// persistence capability, and the Room Registry that owns every loaded
/// Room Engine (§2, §4.4, §10.6).
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn RoomStore>,
    registry: RoomRegistry,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn RoomStore>, registry: RoomRegistry) -> Self {
        Self { config, store, registry }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }
}

#[cfg(test)]
pub(crate) async fn test_state() -> AppState {
    use crate::database::MemoryRoomStore;
    use crate::room::RoomEngineConfig;

    let config = Arc::new(Config::default());
    let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
    let registry = RoomRegistry::bootstrap(
        store.clone(),
        RoomEngineConfig {
            history_limit: config.presence.history_limit,
            message_max_len: config.presence.message_max_len,
            walk_speed: config.presence.walk_speed,
            command_channel_capacity: config.presence.command_channel_capacity,
        },
        config.presence.canonical_slug.clone(),
        config.presence.canonical_width,
        config.presence.canonical_height,
    )
    .await
    .unwrap();

    AppState::new(config, store, registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_bootstraps_canonical_room() {
        let state = test_state().await;
        let handle = state.registry().load_by_slug("lobby").await.unwrap();
        assert!(handle.is_canonical());
    }
}
