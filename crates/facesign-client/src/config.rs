use std::time::Duration;

/// Client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the recognition server.
    pub base_url: String,
    /// Cadence of status pulls in polling mode.
    pub status_interval: Duration,
    /// Cadence of frame pushes in event-stream mode.
    pub frame_interval: Duration,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            status_interval: Duration::from_millis(1000),
            frame_interval: Duration::from_millis(200),
            http_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from `FACESIGN_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("FACESIGN_BASE_URL").unwrap_or(defaults.base_url),
            status_interval: Duration::from_millis(env_u64("FACESIGN_STATUS_INTERVAL_MS", 1000)),
            frame_interval: Duration::from_millis(env_u64("FACESIGN_FRAME_INTERVAL_MS", 200)),
            http_timeout: Duration::from_secs(env_u64("FACESIGN_HTTP_TIMEOUT_SECS", 5)),
        }
    }

    /// WebSocket endpoint for the event channel, derived from the base
    /// URL by scheme swap (`http` -> `ws`, `https` -> `wss`).
    pub fn event_channel_url(&self) -> String {
        let ws_base = self.base_url.replacen("http", "ws", 1);
        format!("{}/stream", ws_base.trim_end_matches('/'))
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
