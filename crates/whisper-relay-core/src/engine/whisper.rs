//! Local whisper.cpp engine (feature `whisper`).
//!
//! Loads a ggml model (e.g. ggml-large-v3.bin) once at startup. Audio must be a 16 kHz WAV;
//! multi-channel input is down-mixed to mono. Each run decodes on its own thread and hands
//! segments over through whisper.cpp's new-segment callback as soon as they are decoded.
//! Runs take turns on the decoder; a run whose consumer has gone away is aborted.

use super::{EngineRun, RawSegment, TranscriptionEngine};
use crate::error::{RelayError, RelayResult};
use crate::options::{EngineRequest, Task};
use crate::segment::TranscriptionInfo;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex};
use whisper_rs::{
    FullParams, SamplingStrategy, SegmentCallbackData, WhisperContext, WhisperContextParameters,
};

const SAMPLE_RATE: u32 = 16_000;

/// Decoded segments waiting for the consumer before the decoder blocks.
const SEGMENT_BUFFER: usize = 8;

pub struct WhisperEngine {
    context: Arc<WhisperContext>,
    decoder: Arc<Mutex<()>>,
}

impl WhisperEngine {
    /// Load the model from `model_path`.
    pub fn new(model_path: &str) -> RelayResult<Self> {
        let params = WhisperContextParameters::default();
        let context = WhisperContext::new_with_params(model_path, params)
            .map_err(|e| RelayError::EngineUnavailable(format!("whisper load failed: {}", e)))?;
        tracing::info!(target: "relay::engine", model = model_path, "whisper model loaded");
        Ok(Self {
            context: Arc::new(context),
            decoder: Arc::new(Mutex::new(())),
        })
    }
}

/// Everything a decode thread needs, owned.
struct DecodeJob {
    context: Arc<WhisperContext>,
    decoder: Arc<Mutex<()>>,
    samples: Vec<f32>,
    language: String,
    translate: bool,
    beam_size: i32,
}

impl DecodeJob {
    fn run(self, tx: SyncSender<RelayResult<RawSegment>>) {
        let abandoned = Arc::new(AtomicBool::new(false));
        let result = self.decode(tx.clone(), Arc::clone(&abandoned));
        if let Err(e) = result {
            if !abandoned.load(Ordering::SeqCst) {
                let _ = tx.send(Err(e));
            }
        }
        if abandoned.load(Ordering::SeqCst) {
            tracing::info!(target: "relay::engine", "whisper run aborted; consumer gone");
        }
    }

    fn decode(
        &self,
        tx: SyncSender<RelayResult<RawSegment>>,
        abandoned: Arc<AtomicBool>,
    ) -> RelayResult<()> {
        let _turn = self
            .decoder
            .lock()
            .map_err(|e| RelayError::EngineFailure(format!("whisper lock poisoned: {}", e)))?;
        let mut state = self
            .context
            .create_state()
            .map_err(|e| RelayError::EngineFailure(format!("whisper state init failed: {}", e)))?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: self.beam_size,
            patience: -1.0,
        });
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_language(Some(self.language.as_str()));
        params.set_translate(self.translate);

        // Timestamps are in centiseconds.
        let gone = Arc::clone(&abandoned);
        params.set_segment_callback_safe(move |data: SegmentCallbackData| {
            let segment = RawSegment::new(
                data.start_timestamp as f64 / 100.0,
                data.end_timestamp as f64 / 100.0,
                data.text,
            );
            if tx.send(Ok(segment)).is_err() {
                gone.store(true, Ordering::SeqCst);
            }
        });
        params.set_abort_callback_safe(move || abandoned.load(Ordering::SeqCst));

        state
            .full(params, &self.samples)
            .map_err(|e| RelayError::EngineFailure(format!("whisper inference failed: {}", e)))?;
        Ok(())
    }
}

/// Read a WAV file into 16 kHz mono f32 samples.
fn read_wav_mono(path: &Path) -> RelayResult<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| RelayError::EngineFailure(format!("unsupported audio (WAV required): {}", e)))?;
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE {
        return Err(RelayError::EngineFailure(format!(
            "whisper expects {} Hz audio; got {} Hz",
            SAMPLE_RATE, spec.sample_rate
        )));
    }
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| RelayError::EngineFailure(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| RelayError::EngineFailure(e.to_string()))?
        }
    };
    let channels = spec.channels.max(1) as usize;
    if channels == 1 {
        return Ok(interleaved);
    }
    Ok(interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect())
}

impl TranscriptionEngine for WhisperEngine {
    fn name(&self) -> &str {
        "whisper"
    }

    fn transcribe(&self, audio: &Path, request: &EngineRequest) -> RelayResult<EngineRun> {
        let samples = read_wav_mono(audio)?;
        let duration = samples.len() as f64 / SAMPLE_RATE as f64;
        if request.vad_filter {
            tracing::debug!(target: "relay::engine", "vad_filter is not applied by the whisper backend");
        }

        let job = DecodeJob {
            context: Arc::clone(&self.context),
            decoder: Arc::clone(&self.decoder),
            samples,
            language: request.language.clone().unwrap_or_else(|| "auto".to_string()),
            translate: request.task == Task::Translate,
            beam_size: i32::try_from(request.beam_size).unwrap_or(i32::MAX),
        };
        let (tx, rx) = sync_channel(SEGMENT_BUFFER);
        std::thread::Builder::new()
            .name("whisper-decode".to_string())
            .spawn(move || job.run(tx))
            .map_err(|e| RelayError::EngineFailure(format!("cannot start decoder: {}", e)))?;

        let info = TranscriptionInfo {
            language: request.language.clone(),
            language_probability: None,
            duration: Some(duration),
        };
        // Ends when the decode thread drops its senders.
        Ok(EngineRun {
            info,
            segments: Box::new(rx.into_iter()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, channels: u16, frames: &[[i16; 2]]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for sample in frame.iter().take(channels as usize) {
                writer.write_sample(*sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn stereo_is_downmixed() {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        write_wav(file.path(), SAMPLE_RATE, 2, &[[16384, 0], [-16384, -16384]]);
        let samples = read_wav_mono(file.path()).unwrap();
        assert_eq!(samples, vec![0.25, -0.5]);
    }

    #[test]
    fn wrong_sample_rate_is_an_engine_failure() {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        write_wav(file.path(), 44_100, 1, &[[0, 0]]);
        let err = read_wav_mono(file.path()).unwrap_err();
        assert!(matches!(err, RelayError::EngineFailure(_)));
    }
}
