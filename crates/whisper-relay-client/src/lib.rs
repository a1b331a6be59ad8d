//! Whisper Relay client: upload audio to the gateway and follow the segment stream.
//!
//! ```no_run
//! # async fn demo() -> whisper_relay_core::RelayResult<()> {
//! use whisper_relay_client::{ClientConfig, StreamingClient};
//! use whisper_relay_core::{StreamOptions, Task};
//!
//! let client = StreamingClient::new(ClientConfig::from_env())?;
//! let bytes = std::fs::read("talk.mp3")?;
//! let mut handle = client.start_stream("talk.mp3", bytes, StreamOptions::new("en", Task::Transcribe), true)?;
//! while let Some(update) = handle.next_update().await {
//!     println!("{}", update.line);
//! }
//! let outcome = handle.finish().await;
//! println!("{}: {} lines", outcome.state, outcome.transcript.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod session;

pub use client::StreamingClient;
pub use config::ClientConfig;
pub use session::{SessionOutcome, SessionState, StreamHandle, TranscriptUpdate};
