//! Client settings from the environment.
//!
//! | Env | Default |
//! |-----|---------|
//! | WHISPER_SERVER_URL | http://127.0.0.1:8765 |
//! | WHISPER_REQUEST_TIMEOUT_SECS | 600 |
//! | WHISPER_IDLE_TIMEOUT_SECS | 120 |
//! | WHISPER_CANCEL_TIMEOUT_MS | 2000 |

use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8765";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway base URL, no trailing slash.
    pub server_url: String,
    /// Whole-request ceiling (connect + upload + stream).
    pub request_timeout: Duration,
    /// Longest silence tolerated between two reads of an open stream.
    pub idle_timeout: Duration,
    /// How long `finish` waits for a cancelled session to wind down before aborting it.
    pub cancel_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: Duration::from_secs(600),
            idle_timeout: Duration::from_secs(120),
            cancel_timeout: Duration::from_millis(2000),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_url: env_opt_string("WHISPER_SERVER_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_url),
            request_timeout: env_u64("WHISPER_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            idle_timeout: env_u64("WHISPER_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            cancel_timeout: env_u64("WHISPER_CANCEL_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cancel_timeout),
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.server_url, path.trim_start_matches('/'))
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(name: &str) -> Option<u64> {
    env_opt_string(name)?.parse().ok().filter(|v| *v > 0)
}
