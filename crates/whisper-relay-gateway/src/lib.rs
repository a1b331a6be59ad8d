//! Whisper Relay gateway: HTTP surface over the core pipeline.
//!
//! - `GET  /health`            engine readiness
//! - `POST /transcribe`        whole file, single JSON result
//! - `POST /stream`            SSE segment stream (`task` from the query, default transcribe)
//! - `POST /translate_stream`  SSE segment stream, task forced to translate
//!
//! Uploads are multipart with the audio in the `file` field. Options travel in the query string.

pub mod config;

use async_stream::stream;
use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection, rejection::QueryRejection, DefaultBodyLimit, Multipart,
        Query, State,
    },
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use whisper_relay_core::{
    spawn_segment_stream, wire, BatchOptions, BatchTranscript, EngineAdapter, RelayError,
    StreamEvent, StreamOptions, Task, UploadedAudio,
};

pub use crate::config::GatewayConfig;

/// Shared per-process state. The engine is loaded once and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineAdapter,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(engine: EngineAdapter, config: GatewayConfig) -> Self {
        Self {
            engine: engine.with_vad_filter(config.vad_filter),
            config: Arc::new(config),
        }
    }
}

/// Error body: `{"detail": "<message>"}`.
pub type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(err: RelayError) -> ApiError {
    let status = match err {
        RelayError::InvalidOptions(_) => StatusCode::BAD_REQUEST,
        RelayError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if err.is_rejection() {
        tracing::warn!(target: "relay::gateway", status = %status, error = %err, "request rejected");
    } else {
        tracing::error!(target: "relay::gateway", status = %status, error = %err, "request failed");
    }
    (status, Json(serde_json::json!({ "detail": err.to_string() })))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub beam_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    #[serde(default)]
    pub timestamps: Option<bool>,
    #[serde(default)]
    pub word_timestamps: Option<bool>,
    #[serde(default)]
    pub beam_size: Option<u32>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
}

/// Malformed query strings get the same `{"detail"}` body as every other rejection.
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(q)| q)
        .map_err(|e| api_error(RelayError::InvalidOptions(e.body_text())))
}

fn multipart_body(multipart: Result<Multipart, MultipartRejection>) -> Result<Multipart, ApiError> {
    multipart.map_err(|e| api_error(RelayError::InvalidOptions(e.body_text())))
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();
    Router::new()
        .route("/health", get(health))
        .route("/transcribe", post(transcribe_handler))
        .route("/stream", post(stream_handler))
        .route("/translate_stream", post(translate_stream_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(request: Request<Body>, next: Next) -> Response {
    tracing::info!(
        target: "relay::gateway",
        method = %request.method(),
        uri = %request.uri(),
        "request"
    );
    next.run(request).await
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": state.engine.is_ready(),
        "engine": state.engine.name(),
        "ready": state.engine.is_ready(),
        "default_beam_size": state.config.default_beam_size,
        "version": whisper_relay_core::version(),
    }))
}

/// Pull the `file` field out of the multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<UploadedAudio, RelayError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::InvalidOptions(format!("bad multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| RelayError::InvalidOptions(format!("upload interrupted: {}", e)))?;
        return UploadedAudio::materialize(&filename, &bytes);
    }
    Err(RelayError::InvalidOptions("file field is required".to_string()))
}

/// POST /transcribe: whole-file transcription returned as one JSON document.
async fn transcribe_handler(
    State(state): State<AppState>,
    query: Result<Query<BatchQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BatchTranscript>, ApiError> {
    let query = query_params(query)?;
    let task = match query.task.as_deref() {
        Some(t) => t.parse::<Task>().map_err(api_error)?,
        None => Task::Transcribe,
    };
    let options = BatchOptions {
        language: query
            .language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
        task,
        beam_size: query.beam_size.unwrap_or(state.config.default_beam_size),
        word_timestamps: query
            .word_timestamps
            .unwrap_or(state.config.default_word_timestamps),
        timestamps: query.timestamps.unwrap_or(true),
    };
    options.validate().map_err(api_error)?;
    state.engine.ensure_ready().map_err(api_error)?;

    let audio = read_upload(multipart_body(multipart)?)
        .await
        .map_err(api_error)?;
    let engine = state.engine.clone();
    let result = tokio::task::spawn_blocking(move || {
        let stream = engine.run_batch(audio.path(), &options)?;
        BatchTranscript::collect(audio.filename(), stream, &options)
    })
    .await
    .map_err(|e| api_error(RelayError::EngineFailure(format!("worker panicked: {}", e))))?
    .map_err(api_error)?;

    tracing::info!(
        target: "relay::gateway",
        filename = %result.filename,
        segments = result.segments.len(),
        "batch transcription done"
    );
    Ok(Json(result))
}

/// POST /stream: SSE segment stream.
async fn stream_handler(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let query = query_params(query)?;
    let options = StreamOptions::parse(
        query.language.as_deref(),
        query.task.as_deref(),
        query.beam_size,
        state.config.default_beam_size,
    )
    .map_err(api_error)?;
    open_stream(state, options, multipart_body(multipart)?).await
}

/// POST /translate_stream: SSE segment stream translated to English.
async fn translate_stream_handler(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let query = query_params(query)?;
    let options = StreamOptions::parse(
        query.language.as_deref(),
        Some(Task::Translate.as_str()),
        query.beam_size,
        state.config.default_beam_size,
    )
    .map_err(api_error)?;
    open_stream(state, options, multipart_body(multipart)?).await
}

async fn open_stream(
    state: AppState,
    options: StreamOptions,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    state.engine.ensure_ready().map_err(api_error)?;
    let audio = read_upload(multipart).await.map_err(api_error)?;

    let request_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        target: "relay::gateway",
        request_id = %request_id,
        filename = audio.filename(),
        bytes = audio.len(),
        language = %options.language,
        task = %options.task,
        beam_size = options.beam_size,
        "segment stream opened"
    );

    let mut rx = spawn_segment_stream(
        state.engine.clone(),
        audio,
        options,
        state.config.stream_buffer,
        request_id.clone(),
    );

    // Dropping this stream (client gone or deadline hit) drops the receiver, which stops
    // the producer.
    let deadline = tokio::time::Instant::now() + state.config.stream_timeout();
    let events = stream! {
        loop {
            let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        target: "relay::gateway",
                        request_id = %request_id,
                        "segment stream timed out"
                    );
                    StreamEvent::Error {
                        message: "stream timed out".to_string(),
                    }
                }
            };
            let terminal = event.is_terminal();
            yield Ok::<_, Infallible>(Event::default().data(wire::encode_event(&event)));
            if terminal {
                break;
            }
        }
    };

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.config.keep_alive_secs.max(1)))
        .text("keepalive");
    let headers = [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        (
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        ),
    ];
    Ok((headers, Sse::new(events).keep_alive(keep_alive)).into_response())
}
