//! One streaming session as seen by the caller: live updates, state, cancel, outcome.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use whisper_relay_core::{Segment, TranscriptState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Request sent, response headers not yet received.
    Connecting,
    /// Stream open, segments arriving.
    Streaming,
    /// `[DONE]` received.
    Completed,
    /// Error record, bad status, dropped connection or idle timeout.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Emitted once per accepted segment.
#[derive(Debug, Clone)]
pub struct TranscriptUpdate {
    pub segment: Segment,
    /// The rendered line just appended.
    pub line: String,
    /// Every line so far, newline-joined.
    pub full_text: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub state: SessionState,
    /// Everything received before the session ended. Kept on failure and cancel.
    pub transcript: TranscriptState,
    pub error: Option<String>,
}

/// Transcript shared between the session task and the handle.
pub(crate) type SharedTranscript = Arc<Mutex<TranscriptState>>;

pub(crate) fn lock(transcript: &SharedTranscript) -> MutexGuard<'_, TranscriptState> {
    transcript.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a running session. Dropping it cancels the session.
pub struct StreamHandle {
    updates: mpsc::UnboundedReceiver<TranscriptUpdate>,
    state: watch::Receiver<SessionState>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<SessionOutcome>,
    transcript: SharedTranscript,
    cancel_timeout: Duration,
}

impl StreamHandle {
    pub(crate) fn new(
        updates: mpsc::UnboundedReceiver<TranscriptUpdate>,
        state: watch::Receiver<SessionState>,
        cancel: oneshot::Sender<()>,
        task: JoinHandle<SessionOutcome>,
        transcript: SharedTranscript,
        cancel_timeout: Duration,
    ) -> Self {
        Self {
            updates,
            state,
            cancel: Some(cancel),
            task,
            transcript,
            cancel_timeout,
        }
    }

    /// Next update, or `None` once the session has ended and all updates were taken.
    pub async fn next_update(&mut self) -> Option<TranscriptUpdate> {
        self.updates.recv().await
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Snapshot of the transcript so far.
    pub fn transcript(&self) -> TranscriptState {
        lock(&self.transcript).clone()
    }

    /// Ask the session to stop. Idempotent; a no-op after the session ended.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }

    /// Wait for the session to end. After [`cancel`](Self::cancel) the wait is bounded by
    /// the cancel timeout; a session that overruns it is aborted and reported cancelled.
    pub async fn finish(mut self) -> SessionOutcome {
        if self.cancel.is_some() {
            return match (&mut self.task).await {
                Ok(outcome) => outcome,
                Err(e) => self.aborted(format!("session task failed: {}", e)),
            };
        }
        match tokio::time::timeout(self.cancel_timeout, &mut self.task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => self.aborted(format!("session task failed: {}", e)),
            Err(_) => {
                tracing::warn!(
                    target: "relay::client",
                    timeout_ms = self.cancel_timeout.as_millis() as u64,
                    "session did not stop in time; aborting"
                );
                self.task.abort();
                SessionOutcome {
                    state: SessionState::Cancelled,
                    transcript: lock(&self.transcript).clone(),
                    error: None,
                }
            }
        }
    }

    fn aborted(&self, message: String) -> SessionOutcome {
        SessionOutcome {
            state: SessionState::Failed,
            transcript: lock(&self.transcript).clone(),
            error: Some(message),
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        // `finish` consumes the task; only a handle dropped mid-stream gets here with work left.
        if !self.task.is_finished() {
            self.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!SessionState::Connecting.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert_eq!(SessionState::Cancelled.to_string(), "cancelled");
    }

    #[tokio::test]
    async fn finish_aborts_a_session_that_ignores_cancel() {
        let (_updates_tx, updates) = mpsc::unbounded_channel();
        let (_state_tx, state) = watch::channel(SessionState::Streaming);
        let (cancel, _cancel_rx) = oneshot::channel();
        let transcript: SharedTranscript = Arc::new(Mutex::new(TranscriptState::new(false)));
        lock(&transcript).append(Segment::new(0, 0.0, 1.0, "kept"));
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            SessionOutcome {
                state: SessionState::Completed,
                transcript: TranscriptState::new(false),
                error: None,
            }
        });

        let mut handle = StreamHandle::new(
            updates,
            state,
            cancel,
            task,
            transcript,
            Duration::from_millis(50),
        );
        handle.cancel();
        assert!(handle.is_cancelled());
        let outcome = handle.finish().await;
        assert_eq!(outcome.state, SessionState::Cancelled);
        assert_eq!(outcome.transcript.full_text(), "kept");
    }
}
