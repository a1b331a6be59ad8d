//! `whisper-relay-client` command line: stream or batch-transcribe a file through the gateway.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whisper_relay_client::{ClientConfig, SessionState, StreamingClient};
use whisper_relay_core::{BatchOptions, StreamOptions, Task, DEFAULT_BEAM_SIZE};

#[derive(Parser, Debug)]
#[command(name = "whisper-relay-client", version, about = "Incremental transcription client")]
struct Cli {
    /// Gateway URL (overrides WHISPER_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print segments as the gateway decodes them. Ctrl-C cancels.
    Stream {
        file: PathBuf,
        /// Source language code, e.g. "en"
        #[arg(short, long)]
        language: String,
        /// transcribe or translate
        #[arg(short, long, default_value = "transcribe")]
        task: Task,
        #[arg(long, default_value_t = DEFAULT_BEAM_SIZE)]
        beam_size: u32,
        /// Print plain text lines
        #[arg(long)]
        no_timestamps: bool,
    },
    /// Transcribe the whole file and print the result as JSON.
    Batch {
        file: PathBuf,
        #[arg(short, long)]
        language: Option<String>,
        #[arg(short, long, default_value = "transcribe")]
        task: Task,
        #[arg(long, default_value_t = DEFAULT_BEAM_SIZE)]
        beam_size: u32,
        #[arg(long)]
        no_timestamps: bool,
        /// Include per-word timings in each segment
        #[arg(long)]
        word_timestamps: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(server) = cli.server {
        config = config.with_server_url(server);
    }
    let client = StreamingClient::new(config)?;

    match cli.command {
        Command::Stream {
            file,
            language,
            task,
            beam_size,
            no_timestamps,
        } => {
            let options = StreamOptions::new(language, task).with_beam_size(beam_size);
            let state = stream(&client, &file, options, !no_timestamps).await?;
            if state != SessionState::Completed {
                std::process::exit(1);
            }
        }
        Command::Batch {
            file,
            language,
            task,
            beam_size,
            no_timestamps,
            word_timestamps,
        } => {
            let options = BatchOptions {
                language,
                task,
                beam_size,
                word_timestamps,
                timestamps: !no_timestamps,
            };
            let bytes = tokio::fs::read(&file).await?;
            let result = client.transcribe(&file_name(&file), bytes, &options).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

async fn stream(
    client: &StreamingClient,
    file: &Path,
    options: StreamOptions,
    timestamps: bool,
) -> Result<SessionState, Box<dyn std::error::Error + Send + Sync>> {
    let bytes = tokio::fs::read(file).await?;
    let mut handle = client.start_stream(&file_name(file), bytes, options, timestamps)?;

    loop {
        tokio::select! {
            update = handle.next_update() => match update {
                Some(update) => println!("{}", update.line),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !handle.is_cancelled() => {
                eprintln!("cancelling...");
                handle.cancel();
            }
        }
    }

    let outcome = handle.finish().await;
    match (&outcome.state, &outcome.error) {
        (SessionState::Completed, _) => {}
        (state, Some(error)) => eprintln!("{}: {}", state, error),
        (state, None) => {
            eprintln!("{} after {} segments; partial transcript:", state, outcome.transcript.len());
            eprintln!("{}", outcome.transcript.full_text());
        }
    }
    Ok(outcome.state)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
