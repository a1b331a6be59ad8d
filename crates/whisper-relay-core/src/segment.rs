//! Timed segments and the per-run summary reported by the engine.

use serde::{Deserialize, Serialize};

/// One timed span of engine output. Ids start at 0 and increase by one per stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u64,
    /// Seconds from the start of the audio.
    pub start: f64,
    /// Seconds from the start of the audio; never before `start`.
    pub end: f64,
    pub text: String,
    /// Word timings, only present when word timestamps were requested and produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

impl Segment {
    pub fn new(id: u64, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            id,
            start,
            end,
            text: text.into(),
            words: None,
        }
    }
}

/// Word-level timing inside a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub start: f64,
    pub end: f64,
    pub word: String,
    pub probability: Option<f32>,
}

/// Summary metadata for one engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionInfo {
    /// Detected (or requested) source language.
    pub language: Option<String>,
    pub language_probability: Option<f32>,
    /// Audio duration in seconds.
    pub duration: Option<f64>,
}
