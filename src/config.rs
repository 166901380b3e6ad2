//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: PRESENCE_)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/presence-rooms/{service_name}/config.toml
//! 4. System directory: /etc/presence-rooms/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::websocket::config::WebSocketConfig;

/// Main configuration structure (§6.3, SPEC_FULL §10.1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service-level configuration
    pub service: ServiceConfig,

    /// Room and handshake settings specific to this domain
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Per-connection command rate ceiling (§5, §10.9)
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Middleware configuration
    #[serde(default)]
    pub middleware: MiddlewareConfig,

    /// WebSocket transport configuration (§10.7)
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Address to bind to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Room and handshake settings (§3, §4.2, §6.3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Shared secret the handshake token is signed with
    #[serde(default = "default_token_secret")]
    pub token_secret: String,

    /// Maximum age of a handshake token, in seconds (§3 "expiry <= 15 min")
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Chat history retained per room, newest-last
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Maximum characters kept from a chat message after trimming
    #[serde(default = "default_message_max_len")]
    pub message_max_len: usize,

    /// Tiles per second used to time the client-side path animation
    #[serde(default = "default_walk_speed")]
    pub walk_speed: f64,

    /// The reserved always-resident room slug (§6.2)
    #[serde(default = "default_canonical_slug")]
    pub canonical_slug: String,

    /// Width/height of the canonical room if it must be created
    #[serde(default = "default_canonical_dimension")]
    pub canonical_width: u32,
    #[serde(default = "default_canonical_dimension")]
    pub canonical_height: u32,

    /// Keepalive timing for the WebSocket transport (§10.7)
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    /// Bounded capacity of each room engine's command channel (§5, §9)
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
            token_ttl_secs: default_token_ttl_secs(),
            history_limit: default_history_limit(),
            message_max_len: default_message_max_len(),
            walk_speed: default_walk_speed(),
            canonical_slug: default_canonical_slug(),
            canonical_width: default_canonical_dimension(),
            canonical_height: default_canonical_dimension(),
            ping_interval_secs: default_ping_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            command_channel_capacity: default_command_channel_capacity(),
        }
    }
}

/// Per-connection command rate ceiling (§5, §10.9)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Chat messages accepted per second per socket
    #[serde(default = "default_chats_per_sec")]
    pub chats_per_sec: u32,

    /// Move commands accepted per second per socket
    #[serde(default = "default_moves_per_sec")]
    pub moves_per_sec: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            chats_per_sec: default_chats_per_sec(),
            moves_per_sec: default_moves_per_sec(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum idle connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum retry attempts for establishing database connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

/// Middleware configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Request tracking configuration (request IDs, header propagation)
    #[serde(default)]
    pub request_tracking: RequestTrackingConfig,

    /// Request body size limit in MB
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,

    /// Enable panic recovery middleware
    #[serde(default = "default_true")]
    pub catch_panic: bool,

    /// Enable compression
    #[serde(default = "default_true")]
    pub compression: bool,

    /// CORS configuration: "permissive", "restrictive", or "disabled"
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            request_tracking: RequestTrackingConfig::default(),
            body_limit_mb: default_body_limit_mb(),
            catch_panic: true,
            compression: true,
            cors_mode: default_cors_mode(),
        }
    }
}

/// Request tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrackingConfig {
    /// Enable request ID generation
    #[serde(default = "default_true")]
    pub request_id_enabled: bool,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,

    /// Enable header propagation
    #[serde(default = "default_true")]
    pub propagate_headers: bool,

    /// Enable sensitive header masking in logs
    #[serde(default = "default_true")]
    pub mask_sensitive_headers: bool,
}

impl Default for RequestTrackingConfig {
    fn default() -> Self {
        Self {
            request_id_enabled: true,
            request_id_header: default_request_id_header(),
            propagate_headers: true,
            mask_sensitive_headers: true,
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_token_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_token_ttl_secs() -> u64 {
    15 * 60
}

fn default_history_limit() -> usize {
    crate::room::types::HISTORY_LIMIT_DEFAULT
}

fn default_message_max_len() -> usize {
    crate::room::types::MESSAGE_MAX_LEN_DEFAULT
}

fn default_walk_speed() -> f64 {
    crate::room::types::WALK_SPEED_DEFAULT
}

fn default_canonical_slug() -> String {
    "lobby".to_string()
}

fn default_canonical_dimension() -> u32 {
    20
}

fn default_ping_interval_secs() -> u64 {
    20
}

fn default_pong_timeout_secs() -> u64 {
    10
}

fn default_command_channel_capacity() -> usize {
    256
}

fn default_chats_per_sec() -> u32 {
    10
}

fn default_moves_per_sec() -> u32 {
    20
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_body_limit_mb() -> usize {
    2
}

fn default_cors_mode() -> String {
    "permissive".to_string()
}

fn default_request_id_header() -> String {
    "x-request-id".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "presence-rooms".to_string(),
                listen_address: default_listen_address(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
            },
            presence: PresenceConfig::default(),
            rate_limit: RateLimitConfig::default(),
            middleware: MiddlewareConfig::default(),
            websocket: WebSocketConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/presence_rooms".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connection_timeout_secs: default_connection_timeout(),
                max_retries: default_max_retries(),
                retry_delay_secs: default_retry_delay(),
            },
        }
    }
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/presence-rooms/{service_name}/config.toml
    /// 3. System directory: /etc/presence-rooms/{service_name}/config.toml
    ///
    /// Environment variables (PRESENCE_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "presence-rooms".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("PRESENCE_").split("_"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file, bypassing XDG directories.
    /// Useful for testing or non-standard deployments.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PRESENCE_").split("_"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service, in priority order
    /// (highest first): cwd, XDG config dir, system directory.
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("config.toml"));

        let xdg_dirs = xdg::BaseDirectories::with_prefix("presence-rooms");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/presence-rooms").join(service_name).join("config.toml"));

        paths
    }

    /// The recommended config path for a service in production:
    /// ~/.config/presence-rooms/{service_name}/config.toml
    pub fn recommended_path(service_name: &str) -> PathBuf {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("presence-rooms");
        let config_file_path = Path::new(service_name).join("config.toml");

        xdg_dirs.place_config_file(&config_file_path).unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| String::from("~")))
                .join(".config/presence-rooms")
                .join(service_name)
                .join("config.toml")
        })
    }

    /// Creates ~/.config/presence-rooms/{service_name}/ if it doesn't exist.
    pub fn create_config_dir(service_name: &str) -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("presence-rooms");
        let config_file_path = Path::new(service_name).join("config.toml");

        let config_path = xdg_dirs
            .place_config_file(&config_file_path)
            .map_err(|e| crate::error::Error::Internal(format!("failed to create config directory: {e}")))?;

        Ok(config_path
            .parent()
            .ok_or_else(|| crate::error::Error::Internal("invalid config path".to_string()))?
            .to_path_buf())
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_room_settings() {
        let config = Config::default();
        assert_eq!(config.presence.canonical_slug, "lobby");
        assert_eq!(config.presence.history_limit, 50);
        assert_eq!(config.rate_limit.chats_per_sec, 10);
        assert_eq!(config.rate_limit.moves_per_sec, 20);
    }

    #[test]
    fn load_from_missing_file_falls_back_to_defaults_and_env() {
        std::env::set_var("PRESENCE_SERVICE_PORT", "9999");
        let config = Config::load_from("/nonexistent/config.toml").unwrap();
        assert_eq!(config.service.port, 9999);
        std::env::remove_var("PRESENCE_SERVICE_PORT");
    }
}
