//! # presence-rooms
//!
//! Realtime multi-room presence server: tile-grid pathfinding, a
//! single-writer Room Engine per loaded room, a WebSocket Connection
//! Handler with a token-based auth handshake, and a Room Registry that
//! lazily loads/unloads rooms and answers discovery queries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use presence_rooms::prelude::*;
//! use presence_rooms::database::{MemoryRoomStore, RoomStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Arc::new(Config::load()?);
//!     init_tracing(&config)?;
//!
//!     let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
//!     let registry = RoomRegistry::bootstrap(
//!         store.clone(),
//!         RoomEngineConfig {
//!             history_limit: config.presence.history_limit,
//!             message_max_len: config.presence.message_max_len,
//!             walk_speed: config.presence.walk_speed,
//!             command_channel_capacity: config.presence.command_channel_capacity,
//!         },
//!         config.presence.canonical_slug.clone(),
//!         config.presence.canonical_width,
//!         config.presence.canonical_height,
//!     )
//!     .await?;
//!
//!     let state = AppState::new(config.clone(), store, registry);
//!     let app = presence_rooms::routes::router(state);
//!
//!     Server::new((*config).clone()).serve(app).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod grid;
pub mod health;
pub mod ids;
pub mod middleware;
pub mod observability;
pub mod room;
pub mod routes;
pub mod server;
pub mod state;
pub mod websocket;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, PresenceConfig, RateLimitConfig};
    pub use crate::error::{Error, Result};
    pub use crate::health::{health, readiness};
    pub use crate::ids::{MakeTypedRequestId, MessageId, ParticipantId, RequestId, RoomId};
    pub use crate::middleware::{
        request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
        RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
    };
    pub use crate::observability::init_tracing;
    pub use crate::room::{RoomEngineConfig, RoomHandle, RoomRegistry};
    pub use crate::server::Server;
    pub use crate::state::AppState;

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::get,
        Router,
    };

    pub use serde::{Deserialize, Serialize};
    pub use tracing::{debug, error, info, instrument, trace, warn};
    pub use tokio;
}
