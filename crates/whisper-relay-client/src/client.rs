//! HTTP client for the gateway: streaming sessions and whole-file transcription.

use crate::config::ClientConfig;
use crate::session::{
    lock, SessionOutcome, SessionState, SharedTranscript, StreamHandle, TranscriptUpdate,
};
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use whisper_relay_core::{
    wire, BatchOptions, BatchTranscript, RelayError, RelayResult, StreamEvent, StreamOptions,
    TranscriptState,
};

#[derive(Clone)]
pub struct StreamingClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl StreamingClient {
    pub fn new(config: ClientConfig) -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// GET /health as raw JSON.
    pub async fn health(&self) -> RelayResult<serde_json::Value> {
        let response = self.http.get(self.config.endpoint("health")).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    /// Upload `bytes` and start consuming the segment stream in a background task.
    ///
    /// Options and filename are checked here, so a bad request fails with
    /// [`RelayError::InvalidOptions`] without touching the network. Must be called from
    /// within a tokio runtime.
    pub fn start_stream(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        options: StreamOptions,
        timestamps: bool,
    ) -> RelayResult<StreamHandle> {
        options.validate()?;
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(RelayError::InvalidOptions("Missing filename".to_string()));
        }

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let transcript: SharedTranscript = Arc::new(Mutex::new(TranscriptState::new(timestamps)));

        let session = Session {
            http: self.http.clone(),
            url: self.config.endpoint("stream"),
            idle_timeout: self.config.idle_timeout,
            transcript: Arc::clone(&transcript),
            updates: updates_tx,
            state: state_tx,
        };
        tracing::info!(
            target: "relay::client",
            filename,
            bytes = bytes.len(),
            language = %options.language,
            task = %options.task,
            "starting segment stream"
        );
        let task = tokio::spawn(session.run(filename.to_string(), bytes, options, cancel_rx));

        Ok(StreamHandle::new(
            updates_rx,
            state_rx,
            cancel_tx,
            task,
            transcript,
            self.config.cancel_timeout,
        ))
    }

    /// POST /transcribe: the whole file in one response.
    pub async fn transcribe(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        options: &BatchOptions,
    ) -> RelayResult<BatchTranscript> {
        options.validate()?;
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(RelayError::InvalidOptions("Missing filename".to_string()));
        }

        let mut query = vec![
            ("task", options.task.to_string()),
            ("beam_size", options.beam_size.to_string()),
            ("timestamps", options.timestamps.to_string()),
            ("word_timestamps", options.word_timestamps.to_string()),
        ];
        if let Some(language) = &options.language {
            query.push(("language", language.clone()));
        }

        let response = self
            .http
            .post(self.config.endpoint("transcribe"))
            .query(&query)
            .multipart(upload_form(filename, bytes))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, &body));
        }
        Ok(response.json().await?)
    }
}

fn upload_form(filename: &str, bytes: Vec<u8>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
    reqwest::multipart::Form::new().part("file", part)
}

/// Map a non-success response to the error the gateway meant.
fn rejection(status: reqwest::StatusCode, body: &str) -> RelayError {
    let detail = error_detail(body);
    match status.as_u16() {
        400 => RelayError::InvalidOptions(detail),
        503 => RelayError::EngineUnavailable(detail),
        _ => RelayError::TransportFailure(format!("HTTP {}: {}", status, detail)),
    }
}

/// `detail` from a `{"detail": ...}` body, else the body itself.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// What a parsed line did to the session.
enum Step {
    Continue,
    End(SessionState, Option<String>),
}

struct Session {
    http: reqwest::Client,
    url: String,
    idle_timeout: Duration,
    transcript: SharedTranscript,
    updates: mpsc::UnboundedSender<TranscriptUpdate>,
    state: watch::Sender<SessionState>,
}

impl Session {
    async fn run(
        self,
        filename: String,
        bytes: Vec<u8>,
        options: StreamOptions,
        mut cancel: oneshot::Receiver<()>,
    ) -> SessionOutcome {
        let query = [
            ("language", options.language.clone()),
            ("task", options.task.to_string()),
            ("beam_size", options.beam_size.to_string()),
        ];
        let request = self
            .http
            .post(&self.url)
            .query(&query)
            .header(reqwest::header::ACCEPT, wire::CONTENT_TYPE)
            .multipart(upload_form(&filename, bytes))
            .send();

        let response = tokio::select! {
            _ = &mut cancel => return self.end(SessionState::Cancelled, None),
            res = request => res,
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => return self.end(SessionState::Failed, Some(RelayError::from(e).to_string())),
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return self.end(SessionState::Failed, Some(rejection(status, &body).to_string()));
        }

        let _ = self.state.send(SessionState::Streaming);
        tracing::debug!(target: "relay::client", status = %status, "segment stream established");

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = wire::LineDecoder::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = &mut cancel => return self.end(SessionState::Cancelled, None),
                chunk = tokio::time::timeout(self.idle_timeout, body.next()) => chunk,
            };
            match chunk {
                Ok(Some(Ok(bytes))) => {
                    for line in decoder.push(&bytes) {
                        if let Step::End(state, error) = self.handle_line(&line) {
                            return self.end(state, error);
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    return self.end(
                        SessionState::Failed,
                        Some(format!("connection lost: {}", e)),
                    );
                }
                Ok(None) => {
                    if let Some(rest) = decoder.finish() {
                        if let Step::End(state, error) = self.handle_line(&rest) {
                            return self.end(state, error);
                        }
                    }
                    return self.end(
                        SessionState::Failed,
                        Some("stream closed before completion".to_string()),
                    );
                }
                Err(_) => {
                    return self.end(
                        SessionState::Failed,
                        Some(format!(
                            "no data received for {}s",
                            self.idle_timeout.as_secs_f32()
                        )),
                    );
                }
            }
        }
    }

    fn handle_line(&self, line: &str) -> Step {
        let event = match wire::parse_line(line) {
            None => return Step::Continue,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::debug!(target: "relay::client", error = %e, "skipping malformed record");
                return Step::Continue;
            }
        };
        match event {
            StreamEvent::Segment { segment, .. } => {
                let mut transcript = lock(&self.transcript);
                let id = segment.id;
                let expected = transcript.expected_id();
                if id > expected {
                    tracing::debug!(target: "relay::client", id, expected, "segment ids skipped");
                }
                if !transcript.append(segment.clone()) {
                    tracing::debug!(target: "relay::client", id, "skipping out-of-order segment");
                    return Step::Continue;
                }
                let update = TranscriptUpdate {
                    line: transcript.lines().last().cloned().unwrap_or_default(),
                    full_text: transcript.full_text(),
                    segment,
                    received_at: chrono::Utc::now(),
                };
                // The caller may have stopped reading updates; the transcript still grows.
                let _ = self.updates.send(update);
                Step::Continue
            }
            StreamEvent::Done => Step::End(SessionState::Completed, None),
            StreamEvent::Error { message } => Step::End(SessionState::Failed, Some(message)),
        }
    }

    fn end(&self, state: SessionState, error: Option<String>) -> SessionOutcome {
        let transcript = lock(&self.transcript).clone();
        match &error {
            Some(e) => tracing::warn!(
                target: "relay::client",
                state = %state,
                segments = transcript.len(),
                error = %e,
                "segment stream ended"
            ),
            None => tracing::info!(
                target: "relay::client",
                state = %state,
                segments = transcript.len(),
                "segment stream ended"
            ),
        }
        let _ = self.state.send(state);
        SessionOutcome {
            state,
            transcript,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_maps_status_and_detail() {
        let err = rejection(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"detail":"language parameter is required"}"#,
        );
        assert!(matches!(err, RelayError::InvalidOptions(ref d) if d == "language parameter is required"));
        let err = rejection(reqwest::StatusCode::SERVICE_UNAVAILABLE, "{\"detail\":\"no model\"}");
        assert!(matches!(err, RelayError::EngineUnavailable(_)));
        let err = rejection(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.to_string().contains("upstream down"));
    }
}
