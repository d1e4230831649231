//! Normalize decoded PCM into the mono 16 kHz `f32` samples whisper expects.
//!
//! Each decoded buffer is interleaved into `f32`, downmixed by averaging channels and, when the
//! source rate differs, resampled with rubato in fixed-size blocks. Call
//! [`AudioPipeline::finish`] at end of stream to flush the resampler's partial block.

use anyhow::{Context, Result, anyhow, bail};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};

/// Sample rate whisper models are trained on (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Source frames fed to the resampler per `process()` call.
const RESAMPLE_BLOCK_FRAMES: usize = 2048;

#[derive(Default)]
pub struct AudioPipeline {
    scratch: Option<SampleBuffer<f32>>,
    resampler: Option<SincFixedIn<f32>>,
    source_rate: Option<u32>,
    pending: Vec<f32>,
    output: Vec<f32>,
}

impl AudioPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one decoded buffer to the output.
    pub fn push(&mut self, decoded: &AudioBufferRef<'_>) -> Result<()> {
        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            bail!("decoded audio had zero channels");
        }

        match self.source_rate {
            None => self.source_rate = Some(spec.rate),
            Some(rate) if rate != spec.rate => {
                bail!("sample rate changed mid-stream from {rate} Hz to {} Hz", spec.rate)
            }
            Some(_) => {}
        }

        let interleaved = self.interleave(decoded);
        let mono = downmix_to_mono(&interleaved, channels);

        if spec.rate == TARGET_SAMPLE_RATE {
            self.output.extend_from_slice(&mono);
            return Ok(());
        }

        self.ensure_resampler(spec.rate)?;
        self.pending.extend_from_slice(&mono);
        while self.pending.len() >= RESAMPLE_BLOCK_FRAMES {
            let block: Vec<f32> = self.pending.drain(..RESAMPLE_BLOCK_FRAMES).collect();
            self.resample_block(block)?;
        }
        Ok(())
    }

    /// Flush the resampler and return every normalized sample.
    pub fn finish(mut self) -> Result<Vec<f32>> {
        if self.resampler.is_none() || self.pending.is_empty() {
            return Ok(self.output);
        }

        // Zero-pad the last block, then drop the padding's share of the output.
        let tail_frames = self.pending.len();
        let expected_tail = self.expected_output_frames(tail_frames);
        let before = self.output.len();

        let mut block = std::mem::take(&mut self.pending);
        block.resize(RESAMPLE_BLOCK_FRAMES, 0.0);
        self.resample_block(block)?;

        self.output.truncate((before + expected_tail).min(self.output.len()));
        Ok(self.output)
    }

    fn interleave(&mut self, decoded: &AudioBufferRef<'_>) -> Vec<f32> {
        let capacity = decoded.capacity() as u64;
        let needed = decoded.capacity() * decoded.spec().channels.count();
        let too_small = self
            .scratch
            .as_ref()
            .is_none_or(|buf| buf.capacity() < needed);
        if too_small {
            self.scratch = Some(SampleBuffer::<f32>::new(capacity, *decoded.spec()));
        }

        match self.scratch.as_mut() {
            Some(buf) => {
                buf.copy_interleaved_ref(decoded.clone());
                buf.samples().to_vec()
            }
            None => Vec::new(),
        }
    }

    fn ensure_resampler(&mut self, source_rate: u32) -> Result<()> {
        if self.resampler.is_some() {
            return Ok(());
        }

        let resampler = SincFixedIn::<f32>::new(
            TARGET_SAMPLE_RATE as f64 / source_rate as f64,
            2.0,
            SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
            RESAMPLE_BLOCK_FRAMES,
            1,
        )
        .map_err(|e| anyhow!(e))
        .context("failed to init resampler")?;

        self.resampler = Some(resampler);
        Ok(())
    }

    fn resample_block(&mut self, block: Vec<f32>) -> Result<()> {
        let resampler = self
            .resampler
            .as_mut()
            .ok_or_else(|| anyhow!("resampler not initialized"))?;

        let out = resampler
            .process(&[block], None)
            .map_err(|e| anyhow!(e))
            .context("resampler process failed")?;

        let [mono] = out.as_slice() else {
            bail!("expected mono output from resampler");
        };
        self.output.extend_from_slice(mono);
        Ok(())
    }

    fn expected_output_frames(&self, source_frames: usize) -> usize {
        let rate = self.source_rate.unwrap_or(TARGET_SAMPLE_RATE);
        (source_frames as u64 * TARGET_SAMPLE_RATE as u64).div_ceil(rate as u64) as usize
    }
}

/// Equal-weight average across channels.
fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_without_input_is_empty() -> anyhow::Result<()> {
        assert!(AudioPipeline::new().finish()?.is_empty());
        Ok(())
    }

    #[test]
    fn mono_passes_through() {
        let input = vec![0.0, 1.0, -1.0];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn stereo_is_averaged() {
        // (L=1, R=3), (L=-1, R=1)
        assert_eq!(downmix_to_mono(&[1.0, 3.0, -1.0, 1.0], 2), vec![2.0, 0.0]);
    }

    #[test]
    fn resampled_tail_is_trimmed_to_source_length() -> anyhow::Result<()> {
        let mut pipeline = AudioPipeline::new();
        pipeline.source_rate = Some(8_000);
        pipeline.ensure_resampler(8_000)?;
        pipeline.ensure_resampler(8_000)?;

        pipeline.pending = vec![0.0; 100];
        let out = pipeline.finish()?;
        assert_eq!(out.len(), 200);
        Ok(())
    }

    #[test]
    fn resample_without_resampler_fails() {
        let mut pipeline = AudioPipeline::new();
        let err = pipeline.resample_block(vec![0.0; 16]).unwrap_err();
        assert!(err.to_string().contains("resampler not initialized"));
    }
}
