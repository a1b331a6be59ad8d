//! Gateway configuration: defaults, then an optional TOML file, then `RELAY_*` environment.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | RELAY_CONFIG | config/gateway | Path of the TOML file (extension optional). |
//! | RELAY_HOST / RELAY_PORT | 0.0.0.0 / 8765 | Listen address. |
//! | RELAY_ENGINE | placeholder | `placeholder`, `whisper` or `openai`. |
//! | RELAY_DEFAULT_BEAM_SIZE | 5 | Beam size when the request omits it. |
//! | RELAY_DEFAULT_WORD_TIMESTAMPS | false | Batch word timings when the request omits it. |
//! | RELAY_VAD_FILTER | true | Ask the engine to skip non-speech. |
//! | RELAY_STREAM_BUFFER | 16 | Events buffered between engine worker and SSE writer. |
//! | RELAY_KEEP_ALIVE_SECS | 15 | SSE keep-alive comment interval. |
//! | RELAY_STREAM_TIMEOUT_SECS | 600 | Overall deadline for one segment stream. |
//! | RELAY_MAX_UPLOAD_MB | 512 | Request body limit for uploads. |
//! | RELAY_WHISPER_MODEL_PATH | - | ggml model for the `whisper` engine. |
//! | RELAY_OPENAI_BASE_URL / _API_KEY / _MODEL | api.openai.com / - / whisper-1 | `openai` engine. |

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use whisper_relay_core::{EngineKind, EngineSettings, DEFAULT_BEAM_SIZE, DEFAULT_STREAM_BUFFER};

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub engine: EngineKind,
    pub default_beam_size: u32,
    pub default_word_timestamps: bool,
    pub vad_filter: bool,
    pub stream_buffer: usize,
    pub keep_alive_secs: u64,
    pub stream_timeout_secs: u64,
    pub max_upload_mb: usize,
    #[serde(default)]
    pub whisper_model_path: Option<String>,
    pub openai_base_url: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            engine: EngineKind::Placeholder,
            default_beam_size: DEFAULT_BEAM_SIZE,
            default_word_timestamps: false,
            vad_filter: true,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            keep_alive_secs: 15,
            stream_timeout_secs: 600,
            max_upload_mb: 512,
            whisper_model_path: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_api_key: None,
            openai_model: "whisper-1".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load config. Precedence: `RELAY_*` env > TOML file (`RELAY_CONFIG` or `config/gateway`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config/gateway".to_string());
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", defaults.port as i64)?
            .set_default("engine", "placeholder")?
            .set_default("default_beam_size", defaults.default_beam_size as i64)?
            .set_default("default_word_timestamps", defaults.default_word_timestamps)?
            .set_default("vad_filter", defaults.vad_filter)?
            .set_default("stream_buffer", defaults.stream_buffer as i64)?
            .set_default("keep_alive_secs", defaults.keep_alive_secs as i64)?
            .set_default("stream_timeout_secs", defaults.stream_timeout_secs as i64)?
            .set_default("max_upload_mb", defaults.max_upload_mb as i64)?
            .set_default("openai_base_url", defaults.openai_base_url)?
            .set_default("openai_model", defaults.openai_model)?;

        let builder = if Path::new(&config_path).exists()
            || Path::new(&format!("{}.toml", config_path)).exists()
        {
            builder.add_source(config::File::with_name(&config_path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.default_beam_size == 0 {
            return Err(config::ConfigError::Message(
                "default_beam_size must be positive".to_string(),
            ));
        }
        if self.stream_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "stream_timeout_secs must be positive".to_string(),
            ));
        }
        if self.stream_buffer == 0 {
            return Err(config::ConfigError::Message(
                "stream_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            kind: self.engine,
            whisper_model_path: self.whisper_model_path.clone(),
            openai_base_url: self.openai_base_url.clone(),
            openai_api_key: self.openai_api_key.clone(),
            openai_model: self.openai_model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8765");
        assert_eq!(config.default_beam_size, 5);
        assert_eq!(config.engine, EngineKind::Placeholder);
        assert_eq!(config.max_upload_bytes(), 512 * 1024 * 1024);
        assert_eq!(config.stream_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn engine_settings_carry_openai_fields() {
        let config = GatewayConfig {
            engine: EngineKind::OpenAi,
            openai_api_key: Some("sk-test".to_string()),
            ..GatewayConfig::default()
        };
        let settings = config.engine_settings();
        assert_eq!(settings.kind, EngineKind::OpenAi);
        assert_eq!(settings.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.openai_model, "whisper-1");
    }
}
