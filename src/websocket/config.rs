//! WebSocket transport configuration (§10.7)
//!
//! Keepalive timing (`ping_interval_secs`, `pong_timeout_secs`) lives on
//! [`crate::config::PresenceConfig`] alongside the rest of the domain's
//! tunables; this is just the one knob that's purely a transport concern.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Maximum inbound message size in bytes (default: 64KB)
    #[serde(default = "default_max_message_size")]
    pub max_message_size_bytes: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size_bytes: default_max_message_size(),
        }
    }
}

const fn default_max_message_size() -> usize {
    65536
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_message_size_is_64kb() {
        assert_eq!(WebSocketConfig::default().max_message_size_bytes, 65536);
    }
}
