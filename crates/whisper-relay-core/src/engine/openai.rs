//! Remote engine: OpenAI-compatible transcription API (OpenAI Whisper, self-hosted servers, etc.).
//!
//! Uses `response_format=verbose_json` to get segment timings. The API returns the whole
//! result at once, so segments are produced eagerly and then handed out one at a time.

use super::{EngineRun, RawSegment, TranscriptionEngine};
use crate::error::{RelayError, RelayResult};
use crate::options::{EngineRequest, Task};
use crate::segment::{TranscriptionInfo, Word};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    segments: Option<Vec<VerboseSegment>>,
    #[serde(default)]
    words: Option<Vec<VerboseWord>>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct VerboseWord {
    start: f64,
    end: f64,
    word: String,
}

/// Production remote backend. The blocking HTTP client is built per run so the engine can be
/// created inside the async runtime and only used from blocking workers.
#[derive(Debug, Clone)]
pub struct OpenAiEngine {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    pub api_key: String,
    /// Model: whisper-1, gpt-4o-transcribe, ...
    pub model: String,
}

impl OpenAiEngine {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self, task: Task) -> String {
        let path = match task {
            Task::Transcribe => "audio/transcriptions",
            Task::Translate => "audio/translations",
        };
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl TranscriptionEngine for OpenAiEngine {
    fn name(&self) -> &str {
        "openai"
    }

    fn transcribe(&self, audio: &Path, request: &EngineRequest) -> RelayResult<EngineRun> {
        let bytes = std::fs::read(audio)
            .map_err(|e| RelayError::EngineFailure(format!("cannot read audio: {}", e)))?;
        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();

        let part = reqwest::blocking::multipart::Part::bytes(bytes).file_name(file_name);
        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if request.task == Task::Transcribe {
            if let Some(language) = &request.language {
                form = form.text("language", language.clone());
            }
            form = form.text("timestamp_granularities[]", "segment");
            if request.word_timestamps {
                form = form.text("timestamp_granularities[]", "word");
            }
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::EngineFailure(e.to_string()))?;
        let res = client
            .post(self.endpoint(request.task))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| RelayError::EngineFailure(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(RelayError::EngineFailure(format!(
                "transcription API error {}: {}",
                status, body
            )));
        }
        let body: VerboseTranscription = res
            .json()
            .map_err(|e| RelayError::EngineFailure(format!("bad transcription response: {}", e)))?;

        let info = TranscriptionInfo {
            language: body.language.clone().or_else(|| request.language.clone()),
            language_probability: None,
            duration: body.duration,
        };
        let segments = into_raw_segments(body, request.word_timestamps);
        Ok(EngineRun {
            info,
            segments: Box::new(segments.into_iter().map(Ok)),
        })
    }
}

fn into_raw_segments(body: VerboseTranscription, word_timestamps: bool) -> Vec<RawSegment> {
    let mut segments: Vec<RawSegment> = match body.segments {
        Some(segments) => segments
            .into_iter()
            .map(|s| RawSegment::new(s.start, s.end, s.text))
            .collect(),
        // Servers without segment support: a single untimed segment.
        None => body
            .text
            .map(|t| vec![RawSegment::new(0.0, body.duration.unwrap_or(0.0), t)])
            .unwrap_or_default(),
    };

    if word_timestamps {
        let words = body.words.unwrap_or_default();
        let count = segments.len();
        for (i, segment) in segments.iter_mut().enumerate() {
            let last = i + 1 == count;
            let in_segment: Vec<Word> = words
                .iter()
                .filter(|w| w.start >= segment.start && (w.start < segment.end || last))
                .map(|w| Word {
                    start: w.start,
                    end: w.end,
                    word: w.word.clone(),
                    probability: None,
                })
                .collect();
            if !in_segment.is_empty() {
                segment.words = Some(in_segment);
            }
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_follows_task() {
        let engine = OpenAiEngine::new("https://api.example.com/v1/", "k", "whisper-1");
        assert_eq!(
            engine.endpoint(Task::Transcribe),
            "https://api.example.com/v1/audio/transcriptions"
        );
        assert_eq!(
            engine.endpoint(Task::Translate),
            "https://api.example.com/v1/audio/translations"
        );
    }

    #[test]
    fn verbose_json_maps_to_segments_with_words() {
        let body: VerboseTranscription = serde_json::from_str(
            r#"{
                "language": "english",
                "duration": 5.0,
                "text": "Hello world",
                "segments": [
                    {"id": 0, "start": 0.0, "end": 2.5, "text": " Hello"},
                    {"id": 1, "start": 2.5, "end": 5.0, "text": " world"}
                ],
                "words": [
                    {"word": "Hello", "start": 0.1, "end": 0.9},
                    {"word": "world", "start": 2.6, "end": 3.2}
                ]
            }"#,
        )
        .unwrap();
        let segments = into_raw_segments(body, true);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, " Hello");
        assert_eq!(segments[0].words.as_ref().unwrap()[0].word, "Hello");
        assert_eq!(segments[1].words.as_ref().unwrap()[0].word, "world");
    }

    #[test]
    fn text_only_response_becomes_one_segment() {
        let body: VerboseTranscription =
            serde_json::from_str(r#"{"text": "just text", "duration": 3.0}"#).unwrap();
        let segments = into_raw_segments(body, false);
        assert_eq!(segments, vec![RawSegment::new(0.0, 3.0, "just text")]);
    }
}
