//! WebSocket transport: the Connection Handler (§4.3) and its supporting
//! auth, rate-limiting and wire-codec pieces.
//!
//! One connection handler task pair is spawned per accepted upgrade; it
//! talks to a room purely through [`crate::room::engine::RoomHandle`] and
//! never touches room state directly.
//!
//! ```rust,ignore
//! use presence_rooms::prelude::*;
//! use presence_rooms::websocket::handler::ws_handler;
//!
//! let app = Router::new().route("/ws", get(ws_handler)).with_state(state);
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod handler;
pub mod rate_limit;

pub use auth::{AuthClaims, AuthIdentity, TokenVerifier};
pub use codec::{decode, encode, ClientMessage, ServerMessage};
pub use config::WebSocketConfig;
pub use handler::ws_handler;
pub use rate_limit::ConnectionRateLimiter;

// Re-export axum WebSocket types for convenience, matching how callers
// reach them elsewhere in this crate.
pub use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
