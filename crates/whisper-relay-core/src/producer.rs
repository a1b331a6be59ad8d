//! Segment stream producer: drives one engine run on a blocking worker and feeds the
//! resulting events, in order, into a bounded channel read by the transport.
//!
//! The worker owns the uploaded audio and drops it when it exits, whatever the exit path.
//! A closed channel means the client disconnected: the worker stops pulling segments and
//! drops the run. Whether a decode already in progress stops is up to the backend.

use crate::engine::EngineAdapter;
use crate::event::StreamEvent;
use crate::options::StreamOptions;
use crate::upload::UploadedAudio;
use tokio::sync::mpsc;

/// Default number of events buffered between the engine worker and the transport writer.
pub const DEFAULT_STREAM_BUFFER: usize = 16;

/// How a producer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerOutcome {
    /// All segments sent, followed by `Done`.
    Completed { segments: u64 },
    /// `Error` sent after `segments` segments.
    Failed { segments: u64 },
    /// The receiver went away after `segments` segments were delivered.
    Abandoned { segments: u64 },
}

/// Running transcript echoed in every segment event.
#[derive(Debug, Default)]
struct FullText {
    joined: String,
    count: usize,
}

impl FullText {
    fn push(&mut self, text: &str) -> String {
        if self.count > 0 {
            self.joined.push('\n');
        }
        self.joined.push_str(text);
        self.count += 1;
        self.joined.trim().to_string()
    }
}

/// Spawn the producer for one request and return the event receiver.
///
/// Options must already have been validated and the adapter checked for readiness; any
/// failure from here on is reported in-stream as a terminal `Error` event.
pub fn spawn_segment_stream(
    adapter: EngineAdapter,
    audio: UploadedAudio,
    options: StreamOptions,
    buffer: usize,
    request_id: String,
) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::task::spawn_blocking(move || {
        let span = tracing::info_span!("segment_stream", request_id = %request_id);
        let _enter = span.enter();
        let outcome = produce(&adapter, &audio, &options, &tx);
        drop(audio);
        match outcome {
            ProducerOutcome::Completed { segments } => {
                tracing::info!(target: "relay::producer", segments, "stream completed")
            }
            ProducerOutcome::Failed { segments } => {
                tracing::warn!(target: "relay::producer", segments, "stream ended with engine error")
            }
            ProducerOutcome::Abandoned { segments } => tracing::info!(
                target: "relay::producer",
                segments,
                "client disconnected; abandoning engine run"
            ),
        }
    });
    rx
}

/// Drive the engine and send events. Blocking; runs on the producer worker.
pub fn produce(
    adapter: &EngineAdapter,
    audio: &UploadedAudio,
    options: &StreamOptions,
    tx: &mpsc::Sender<StreamEvent>,
) -> ProducerOutcome {
    let stream = match adapter.run(audio.path(), options) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(target: "relay::producer", error = %e, "engine run failed to start");
            return match tx.blocking_send(StreamEvent::Error {
                message: e.to_string(),
            }) {
                Ok(()) => ProducerOutcome::Failed { segments: 0 },
                Err(_) => ProducerOutcome::Abandoned { segments: 0 },
            };
        }
    };
    tracing::debug!(
        target: "relay::producer",
        filename = audio.filename(),
        language = ?stream.info.language,
        duration = ?stream.info.duration,
        "engine run started"
    );

    let mut full_text = FullText::default();
    let mut sent: u64 = 0;
    for item in stream {
        let event = match item {
            Ok(segment) => {
                tracing::debug!(
                    target: "relay::producer",
                    segment_id = segment.id,
                    start = segment.start,
                    end = segment.end,
                    "segment"
                );
                let full = full_text.push(&segment.text);
                StreamEvent::Segment {
                    segment,
                    full_text: full,
                }
            }
            Err(e) => {
                return match tx.blocking_send(StreamEvent::Error {
                    message: e.to_string(),
                }) {
                    Ok(()) => ProducerOutcome::Failed { segments: sent },
                    Err(_) => ProducerOutcome::Abandoned { segments: sent },
                };
            }
        };
        if tx.blocking_send(event).is_err() {
            return ProducerOutcome::Abandoned { segments: sent };
        }
        sent += 1;
    }

    match tx.blocking_send(StreamEvent::Done) {
        Ok(()) => ProducerOutcome::Completed { segments: sent },
        Err(_) => ProducerOutcome::Abandoned { segments: sent },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_text_joins_and_trims() {
        let mut full = FullText::default();
        assert_eq!(full.push(""), "");
        assert_eq!(full.push("Hello"), "Hello");
        assert_eq!(full.push("world"), "Hello\nworld");
    }
}
