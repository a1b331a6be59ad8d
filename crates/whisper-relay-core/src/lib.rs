//! # Whisper Relay - core
//!
//! Incremental transcription pipeline shared by the gateway and the client.
//!
//! ```text
//! upload ─→ UploadedAudio ─→ EngineAdapter ─→ producer ─→ SSE wire ─→ client ─→ TranscriptState
//!          (temp file)      (numbering,      (blocking   (data: …,   (tolerant
//!                            validation)      worker,     [DONE])      parsing)
//!                                             bounded mpsc)
//! ```

pub mod batch;
pub mod engine;
pub mod error;
pub mod event;
pub mod options;
pub mod producer;
pub mod segment;
pub mod transcript;
pub mod upload;
pub mod wire;

pub use batch::BatchTranscript;
pub use engine::{
    create_engine, EngineAdapter, EngineKind, EngineRun, EngineSettings, OpenAiEngine,
    PlaceholderEngine, RawSegment, ScriptedEngine, SegmentStream, TranscriptionEngine,
};
#[cfg(feature = "whisper")]
pub use engine::WhisperEngine;
pub use error::{RelayError, RelayResult};
pub use event::StreamEvent;
pub use options::{BatchOptions, EngineRequest, StreamOptions, Task, DEFAULT_BEAM_SIZE};
pub use producer::{spawn_segment_stream, ProducerOutcome, DEFAULT_STREAM_BUFFER};
pub use segment::{Segment, TranscriptionInfo, Word};
pub use transcript::{format_timestamp, render_line, TranscriptState};
pub use upload::UploadedAudio;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
