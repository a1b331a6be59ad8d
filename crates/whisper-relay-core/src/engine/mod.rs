//! **Transcription engines**: turn an audio file into an ordered sequence of timed segments.
//!
//! Implement `TranscriptionEngine` for a local model (whisper.cpp via `whisper-rs`) or a remote
//! OpenAI-compatible API. Request handlers never call a backend directly: they go through
//! `EngineAdapter`, which validates options, reports readiness, numbers the segments and
//! normalises their text.

pub mod openai;
pub mod scripted;
#[cfg(feature = "whisper")]
pub mod whisper;

use crate::error::{RelayError, RelayResult};
use crate::options::{BatchOptions, EngineRequest, StreamOptions};
use crate::segment::{Segment, TranscriptionInfo, Word};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use openai::OpenAiEngine;
pub use scripted::{PlaceholderEngine, ScriptedEngine};
#[cfg(feature = "whisper")]
pub use whisper::WhisperEngine;

/// A segment as the backend produced it, before numbering and normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub words: Option<Vec<Word>>,
}

impl RawSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            words: None,
        }
    }
}

/// Lazy, finite, ordered segment sequence. Pulled one item at a time on a blocking worker.
pub type RawSegments = Box<dyn Iterator<Item = RelayResult<RawSegment>> + Send>;

/// Result of starting an engine run.
pub struct EngineRun {
    pub info: TranscriptionInfo,
    pub segments: RawSegments,
}

/// Backend for converting an audio file into segments. Calls are blocking.
pub trait TranscriptionEngine: Send + Sync {
    /// Short backend name for logs and `/health`.
    fn name(&self) -> &str;

    /// Start a run. Backends that decode incrementally must return before the first segment
    /// is decoded; others may decode eagerly and hand back a buffered iterator.
    fn transcribe(&self, audio: &Path, request: &EngineRequest) -> RelayResult<EngineRun>;
}

/// Shared, read-only engine handle. Initialised once at process start and cloned into
/// every request handler.
#[derive(Clone)]
pub struct EngineAdapter {
    engine: Option<Arc<dyn TranscriptionEngine>>,
    unavailable_reason: String,
    vad_filter: bool,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn TranscriptionEngine>) -> Self {
        Self {
            engine: Some(engine),
            unavailable_reason: String::new(),
            vad_filter: true,
        }
    }

    /// Adapter for an engine that failed to load. Every run fails with `EngineUnavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            engine: None,
            unavailable_reason: reason.into(),
            vad_filter: true,
        }
    }

    pub fn with_vad_filter(mut self, vad_filter: bool) -> Self {
        self.vad_filter = vad_filter;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    pub fn name(&self) -> &str {
        self.engine.as_ref().map(|e| e.name()).unwrap_or("none")
    }

    pub fn ensure_ready(&self) -> RelayResult<()> {
        if self.engine.is_some() {
            Ok(())
        } else {
            Err(RelayError::EngineUnavailable(self.unavailable_reason.clone()))
        }
    }

    /// Run a streaming transcription. Options are validated before the engine is touched.
    pub fn run(&self, audio: &Path, options: &StreamOptions) -> RelayResult<SegmentStream> {
        options.validate()?;
        self.start(audio, &options.engine_request(self.vad_filter))
    }

    /// Run a batch transcription with the same numbering and normalisation as streaming.
    pub fn run_batch(&self, audio: &Path, options: &BatchOptions) -> RelayResult<SegmentStream> {
        options.validate()?;
        self.start(audio, &options.engine_request(self.vad_filter))
    }

    fn start(&self, audio: &Path, request: &EngineRequest) -> RelayResult<SegmentStream> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| RelayError::EngineUnavailable(self.unavailable_reason.clone()))?;
        tracing::debug!(
            target: "relay::engine",
            engine = engine.name(),
            task = %request.task,
            beam_size = request.beam_size,
            "starting engine run"
        );
        let run = engine.transcribe(audio, request)?;
        Ok(SegmentStream::new(run))
    }
}

/// Numbered, normalised segments of one run. Ends after the first error.
pub struct SegmentStream {
    pub info: TranscriptionInfo,
    inner: RawSegments,
    next_id: u64,
    last_start: f64,
    finished: bool,
}

impl SegmentStream {
    pub fn new(run: EngineRun) -> Self {
        Self {
            info: run.info,
            inner: run.segments,
            next_id: 0,
            last_start: 0.0,
            finished: false,
        }
    }
}

impl Iterator for SegmentStream {
    type Item = RelayResult<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.inner.next() {
            None => {
                self.finished = true;
                None
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            Some(Ok(raw)) => {
                let start = raw.start.max(0.0);
                let end = raw.end.max(start);
                if start < self.last_start {
                    tracing::warn!(
                        target: "relay::engine",
                        start,
                        previous = self.last_start,
                        "engine produced a segment out of start-time order"
                    );
                }
                self.last_start = start;
                let segment = Segment {
                    id: self.next_id,
                    start,
                    end,
                    text: raw.text.trim().to_string(),
                    words: raw.words,
                };
                self.next_id += 1;
                Some(Ok(segment))
            }
        }
    }
}

/// Which backend the server loads at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Deterministic stand-in that describes the upload; always available.
    #[default]
    Placeholder,
    /// Local whisper.cpp model (requires the `whisper` feature).
    Whisper,
    /// OpenAI-compatible `/audio/transcriptions` API.
    OpenAi,
}

/// Settings needed to construct any of the backends.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub kind: EngineKind,
    pub whisper_model_path: Option<String>,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

/// Build the configured backend. Called once at process start.
pub fn create_engine(settings: &EngineSettings) -> RelayResult<Arc<dyn TranscriptionEngine>> {
    match settings.kind {
        EngineKind::Placeholder => Ok(Arc::new(PlaceholderEngine::new())),
        EngineKind::OpenAi => {
            let key = settings
                .openai_api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    RelayError::EngineUnavailable("openai engine requires an API key".to_string())
                })?;
            Ok(Arc::new(OpenAiEngine::new(
                settings.openai_base_url.clone(),
                key,
                settings.openai_model.clone(),
            )))
        }
        #[cfg(feature = "whisper")]
        EngineKind::Whisper => {
            let path = settings
                .whisper_model_path
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    RelayError::EngineUnavailable("whisper_model_path not set".to_string())
                })?;
            Ok(Arc::new(WhisperEngine::new(path)?))
        }
        #[cfg(not(feature = "whisper"))]
        EngineKind::Whisper => Err(RelayError::EngineUnavailable(
            "built without the `whisper` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Task;

    #[test]
    fn unavailable_adapter_rejects_runs() {
        let adapter = EngineAdapter::unavailable("Model not loaded");
        assert!(!adapter.is_ready());
        let err = adapter
            .run(Path::new("/nonexistent"), &StreamOptions::new("en", Task::Transcribe))
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::EngineUnavailable(ref m) if m == "Model not loaded"));
    }

    #[test]
    fn invalid_options_fail_before_engine_runs() {
        let engine = Arc::new(ScriptedEngine::new(vec![RawSegment::new(0.0, 1.0, "hi")]));
        let adapter = EngineAdapter::new(engine.clone());
        let err = adapter
            .run(Path::new("/nonexistent"), &StreamOptions::new("", Task::Transcribe))
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::InvalidOptions(_)));
        assert_eq!(engine.runs(), 0);
    }

    #[test]
    fn segments_are_numbered_and_trimmed() {
        let engine = ScriptedEngine::new(vec![
            RawSegment::new(0.0, 1.5, "  Hello "),
            RawSegment::new(1.5, 1.0, "world\n"),
        ]);
        let adapter = EngineAdapter::new(Arc::new(engine));
        let segments: Vec<Segment> = adapter
            .run(Path::new("clip.wav"), &StreamOptions::new("en", Task::Transcribe))
            .unwrap()
            .collect::<RelayResult<_>>()
            .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], Segment::new(0, 0.0, 1.5, "Hello"));
        assert_eq!(segments[1].id, 1);
        assert_eq!(segments[1].text, "world");
        // end is clamped to start
        assert_eq!(segments[1].end, 1.5);
    }

    #[test]
    fn stream_stops_after_first_error() {
        let engine = ScriptedEngine::new(vec![
            RawSegment::new(0.0, 1.0, "one"),
            RawSegment::new(1.0, 2.0, "two"),
        ])
        .fail_after(1, "decoder crashed");
        let adapter = EngineAdapter::new(Arc::new(engine));
        let items: Vec<_> = adapter
            .run(Path::new("clip.wav"), &StreamOptions::new("en", Task::Transcribe))
            .unwrap()
            .collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(RelayError::EngineFailure(_))));
    }

    #[test]
    fn placeholder_is_the_default_engine() {
        let engine = create_engine(&EngineSettings::default()).unwrap();
        assert_eq!(engine.name(), "placeholder");
    }

    #[test]
    fn openai_engine_requires_key() {
        let settings = EngineSettings {
            kind: EngineKind::OpenAi,
            ..EngineSettings::default()
        };
        assert!(matches!(
            create_engine(&settings),
            Err(RelayError::EngineUnavailable(_))
        ));
    }
}
