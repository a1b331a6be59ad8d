//! Deterministic engines: a scripted one for tests and demos, and the placeholder the
//! server falls back to when no model is configured.

use super::{EngineRun, RawSegment, TranscriptionEngine};
use crate::error::{RelayError, RelayResult};
use crate::options::EngineRequest;
use crate::segment::TranscriptionInfo;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Replays a fixed list of segments, optionally with pacing and a failure part-way through.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    segments: Vec<RawSegment>,
    delay: Duration,
    fail_after: Option<(usize, String)>,
    fail_on_open: Option<String>,
    info: TranscriptionInfo,
    runs: AtomicUsize,
    pulled: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(segments: Vec<RawSegment>) -> Self {
        let duration = segments.last().map(|s| s.end);
        Self {
            segments,
            info: TranscriptionInfo {
                language: None,
                language_probability: Some(1.0),
                duration,
            },
            ..Self::default()
        }
    }

    /// Sleep this long before yielding each segment (simulates decode time).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Yield `count` segments, then fail with `EngineFailure(message)`.
    pub fn fail_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((count, message.into()));
        self
    }

    /// Fail when the run is started, before any segment.
    pub fn fail_on_open(mut self, message: impl Into<String>) -> Self {
        self.fail_on_open = Some(message.into());
        self
    }

    pub fn with_info(mut self, info: TranscriptionInfo) -> Self {
        self.info = info;
        self
    }

    /// Number of runs started so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Number of segments (or failures) pulled from the engine across all runs.
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

impl TranscriptionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn transcribe(&self, _audio: &Path, request: &EngineRequest) -> RelayResult<EngineRun> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_on_open {
            return Err(RelayError::EngineFailure(message.clone()));
        }
        let mut info = self.info.clone();
        if info.language.is_none() {
            info.language = Some(request.language.clone().unwrap_or_else(|| "en".to_string()));
        }
        let run = ScriptedRun {
            segments: self.segments.clone().into_iter(),
            yielded: 0,
            delay: self.delay,
            fail_after: self.fail_after.clone(),
            pulled: Arc::clone(&self.pulled),
        };
        Ok(EngineRun {
            info,
            segments: Box::new(run),
        })
    }
}

struct ScriptedRun {
    segments: std::vec::IntoIter<RawSegment>,
    yielded: usize,
    delay: Duration,
    fail_after: Option<(usize, String)>,
    pulled: Arc<AtomicUsize>,
}

impl Iterator for ScriptedRun {
    type Item = RelayResult<RawSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((count, message)) = self.fail_after.take() {
            if self.yielded == count {
                self.yielded = usize::MAX;
                self.pulled.fetch_add(1, Ordering::SeqCst);
                return Some(Err(RelayError::EngineFailure(message)));
            }
            self.fail_after = Some((count, message));
        }
        if self.yielded == usize::MAX {
            return None;
        }
        let segment = self.segments.next()?;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.yielded += 1;
        self.pulled.fetch_add(1, Ordering::SeqCst);
        Some(Ok(segment))
    }
}

/// Stand-in engine: one segment describing the upload. Use to exercise the pipeline
/// without a model or API key.
#[derive(Debug, Default)]
pub struct PlaceholderEngine;

impl PlaceholderEngine {
    pub fn new() -> Self {
        Self
    }
}

impl TranscriptionEngine for PlaceholderEngine {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn transcribe(&self, audio: &Path, request: &EngineRequest) -> RelayResult<EngineRun> {
        let bytes = std::fs::metadata(audio)
            .map_err(|e| RelayError::EngineFailure(format!("cannot read audio: {}", e)))?
            .len();
        let text = format!(
            "[{} placeholder: {} bytes, beam {} (configure a whisper or openai engine)]",
            request.task, bytes, request.beam_size
        );
        let info = TranscriptionInfo {
            language: request.language.clone(),
            language_probability: None,
            duration: None,
        };
        Ok(EngineRun {
            info,
            segments: Box::new(std::iter::once(Ok(RawSegment::new(0.0, 0.0, text)))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Task;

    fn request() -> EngineRequest {
        EngineRequest {
            language: Some("en".to_string()),
            task: Task::Transcribe,
            beam_size: 5,
            word_timestamps: false,
            vad_filter: true,
        }
    }

    #[test]
    fn scripted_fails_after_count() {
        let engine = ScriptedEngine::new(vec![
            RawSegment::new(0.0, 1.0, "a"),
            RawSegment::new(1.0, 2.0, "b"),
            RawSegment::new(2.0, 3.0, "c"),
        ])
        .fail_after(2, "boom");
        let run = engine.transcribe(Path::new("x.wav"), &request()).unwrap();
        let items: Vec<_> = run.segments.collect();
        assert_eq!(items.len(), 3);
        assert!(items[..2].iter().all(|i| i.is_ok()));
        assert!(items[2].is_err());
        assert_eq!(engine.pulled(), 3);
        assert_eq!(engine.runs(), 1);
    }

    #[test]
    fn scripted_run_ends_after_failure() {
        let engine = ScriptedEngine::new(vec![
            RawSegment::new(0.0, 1.0, "a"),
            RawSegment::new(1.0, 2.0, "b"),
        ])
        .fail_after(1, "boom");
        let mut run = engine.transcribe(Path::new("x.wav"), &request()).unwrap().segments;
        assert_eq!(run.next().unwrap().unwrap().text, "a");
        assert!(matches!(run.next(), Some(Err(RelayError::EngineFailure(ref m))) if m == "boom"));
        assert!(run.next().is_none());
        assert!(run.next().is_none());
        assert_eq!(engine.pulled(), 2);
    }

    #[test]
    fn placeholder_describes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, vec![0u8; 480]).unwrap();
        let run = PlaceholderEngine::new().transcribe(&path, &request()).unwrap();
        let segments: Vec<_> = run.segments.collect::<RelayResult<_>>().unwrap();
        assert_eq!(segments.len(), 1);
        assert!(segments[0].text.contains("480 bytes"));
    }

    #[test]
    fn placeholder_reports_missing_file() {
        let res = PlaceholderEngine::new().transcribe(Path::new("/definitely/missing.wav"), &request());
        assert!(matches!(res, Err(RelayError::EngineFailure(_))));
    }
}
