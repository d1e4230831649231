//! Speech-to-text with `whisper-rs` / whisper.cpp.

use std::path::Path;
use std::time::Instant;

use tracing::info;
use whisper_rs::WhisperContext;

use crate::decoder::decode_file_to_mono_16k;
use crate::transcriber::Transcriber;
use crate::words::TranscriptSegment;
use crate::{Error, Result};

mod ctx;
mod logging;
mod segments;
mod token;

/// A loaded whisper model. Load it once and reuse it for every clip of a run.
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Load the ggml model at `model_path`. `language` is a hint such as `"en"`; `None`
    /// auto-detects.
    pub fn new(model_path: impl AsRef<Path>, language: Option<String>) -> Result<Self> {
        let ctx = ctx::load_context(model_path.as_ref())?;
        Ok(Self { ctx, language })
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&mut self, audio: &Path) -> Result<Vec<TranscriptSegment>> {
        let started = Instant::now();
        let samples = decode_file_to_mono_16k(audio)?;
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let segments = segments::transcribe_samples(&self.ctx, self.language.as_deref(), &samples)
            .map_err(|err| Error::transcription(audio, format!("{err:#}")))?;

        info!(
            path = %audio.display(),
            segments = segments.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transcribed clip"
        );
        Ok(segments)
    }
}
