//! Whole-file transcription result returned by the non-streaming endpoint.

use crate::engine::SegmentStream;
use crate::error::RelayResult;
use crate::options::BatchOptions;
use crate::segment::Segment;
use crate::transcript::render_line;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTranscript {
    pub filename: String,
    pub language: Option<String>,
    pub language_probability: Option<f32>,
    pub duration: Option<f64>,
    /// Segment texts joined by newline, in id order.
    pub text: String,
    /// Rendered lines (time range prefixed when requested) joined by newline.
    pub timestamped_text: String,
    pub segments: Vec<Segment>,
}

impl BatchTranscript {
    /// Drain a run into a batch result. The first engine error aborts the whole result.
    pub fn collect(
        filename: impl Into<String>,
        stream: SegmentStream,
        options: &BatchOptions,
    ) -> RelayResult<Self> {
        let info = stream.info.clone();
        let mut segments = Vec::new();
        for item in stream {
            let mut segment = item?;
            if !options.word_timestamps {
                segment.words = None;
            }
            segments.push(segment);
        }

        // Same joining as the streamed transcript, empty segments included.
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let timestamped_text = segments
            .iter()
            .map(|s| render_line(s, options.timestamps))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Self {
            filename: filename.into(),
            language: info.language,
            language_probability: info.language_probability,
            duration: info.duration,
            text,
            timestamped_text,
            segments,
        })
    }
}
