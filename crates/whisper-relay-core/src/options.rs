//! Request options for streaming and batch runs, validated before any engine work.

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Beam size used when neither the request nor the server config supplies one.
pub const DEFAULT_BEAM_SIZE: u32 = 5;

/// What the engine does with the source audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Keep the source language.
    #[default]
    Transcribe,
    /// Translate to English.
    Translate,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Transcribe => "transcribe",
            Task::Translate => "translate",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transcribe" => Ok(Task::Transcribe),
            "translate" => Ok(Task::Translate),
            other => Err(RelayError::InvalidOptions(format!(
                "task must be 'transcribe' or 'translate', got '{}'",
                other
            ))),
        }
    }
}

/// Options for one streaming run. Construct with [`StreamOptions::new`] or [`StreamOptions::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Source language code of the audio (required, e.g. "en", "es").
    pub language: String,
    pub task: Task,
    pub beam_size: u32,
}

impl StreamOptions {
    pub fn new(language: impl Into<String>, task: Task) -> Self {
        Self {
            language: language.into(),
            task,
            beam_size: DEFAULT_BEAM_SIZE,
        }
    }

    pub fn with_beam_size(mut self, beam_size: u32) -> Self {
        self.beam_size = beam_size;
        self
    }

    /// Build from raw request parameters. Missing beam size falls back to `default_beam_size`.
    pub fn parse(
        language: Option<&str>,
        task: Option<&str>,
        beam_size: Option<u32>,
        default_beam_size: u32,
    ) -> RelayResult<Self> {
        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| RelayError::InvalidOptions("language parameter is required".to_string()))?;
        let task = match task {
            Some(t) => t.parse()?,
            None => Task::default(),
        };
        let options = Self {
            language: language.to_string(),
            task,
            beam_size: beam_size.unwrap_or(default_beam_size),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> RelayResult<()> {
        validate_language(&self.language)?;
        validate_beam_size(self.beam_size)
    }

    /// Engine-level request for this stream.
    pub fn engine_request(&self, vad_filter: bool) -> EngineRequest {
        EngineRequest {
            language: Some(self.language.trim().to_string()),
            task: self.task,
            beam_size: self.beam_size,
            word_timestamps: false,
            vad_filter,
        }
    }
}

/// Options for a batch (whole file, single JSON result) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Optional here: the engine detects the language when absent.
    pub language: Option<String>,
    pub task: Task,
    pub beam_size: u32,
    pub word_timestamps: bool,
    /// Render `timestamped_text` lines with a time range prefix.
    pub timestamps: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            language: None,
            task: Task::Transcribe,
            beam_size: DEFAULT_BEAM_SIZE,
            word_timestamps: false,
            timestamps: true,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> RelayResult<()> {
        if let Some(language) = &self.language {
            validate_language(language)?;
        }
        validate_beam_size(self.beam_size)
    }

    pub fn engine_request(&self, vad_filter: bool) -> EngineRequest {
        EngineRequest {
            language: self.language.as_ref().map(|l| l.trim().to_string()),
            task: self.task,
            beam_size: self.beam_size,
            word_timestamps: self.word_timestamps,
            vad_filter,
        }
    }
}

/// Everything an engine backend receives besides the audio path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    pub language: Option<String>,
    pub task: Task,
    pub beam_size: u32,
    pub word_timestamps: bool,
    pub vad_filter: bool,
}

fn validate_language(language: &str) -> RelayResult<()> {
    let code = language.trim();
    if code.is_empty() {
        return Err(RelayError::InvalidOptions(
            "language parameter is required".to_string(),
        ));
    }
    let well_formed = code.len() <= 16
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !well_formed {
        return Err(RelayError::InvalidOptions(format!(
            "'{}' is not a language code",
            code
        )));
    }
    Ok(())
}

fn validate_beam_size(beam_size: u32) -> RelayResult<()> {
    if beam_size == 0 {
        return Err(RelayError::InvalidOptions(
            "beam_size must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_language_is_rejected() {
        let opts = StreamOptions::new("", Task::Transcribe);
        assert!(matches!(opts.validate(), Err(RelayError::InvalidOptions(_))));

        let parsed = StreamOptions::parse(Some("   "), Some("transcribe"), None, 5);
        assert!(matches!(parsed, Err(RelayError::InvalidOptions(_))));
    }

    #[test]
    fn parse_applies_defaults() {
        let opts = StreamOptions::parse(Some(" es "), None, None, 3).unwrap();
        assert_eq!(opts.language, "es");
        assert_eq!(opts.task, Task::Transcribe);
        assert_eq!(opts.beam_size, 3);
    }

    #[test]
    fn unknown_task_is_rejected() {
        let parsed = StreamOptions::parse(Some("en"), Some("summarize"), None, 5);
        assert!(matches!(parsed, Err(RelayError::InvalidOptions(_))));
        assert_eq!("Translate".parse::<Task>().unwrap(), Task::Translate);
    }

    #[test]
    fn zero_beam_size_is_rejected() {
        let opts = StreamOptions::new("en", Task::Translate).with_beam_size(0);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn batch_language_is_optional() {
        let opts = BatchOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.engine_request(true).language, None);

        let bad = BatchOptions {
            language: Some("e n".to_string()),
            ..BatchOptions::default()
        };
        assert!(bad.validate().is_err());
    }
}
