//! Decode a voiceover file into mono `f32` samples at [`TARGET_SAMPLE_RATE`].
//!
//! `demux` probes the container and iterates packets, `decode` turns packets into PCM and
//! `audio_pipeline` downmixes and resamples. Files are opened seekable, so containers with
//! trailing metadata decode too.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::audio_pipeline::{AudioPipeline, TARGET_SAMPLE_RATE};
use crate::decode::{decode_packet_and_then, make_decoder_for_track};
use crate::demux::{next_packet, open_audio_track};
use crate::{Error, Result};

/// Read and normalize the whole file at `path`.
pub fn decode_file_to_mono_16k(path: &Path) -> Result<Vec<f32>> {
    decode_file(path).map_err(|err| Error::transcription(path, format!("{err:#}")))
}

fn decode_file(path: &Path) -> anyhow::Result<Vec<f32>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let hint = path.extension().and_then(|ext| ext.to_str());

    let (mut format, track) = open_audio_track(Box::new(file), hint)?;
    let mut decoder = make_decoder_for_track(&track)?;
    let mut pipeline = AudioPipeline::new();

    while let Some(packet) = next_packet(&mut format)? {
        if packet.track_id() != track.id {
            continue;
        }
        decode_packet_and_then(&mut decoder, &packet, |decoded| pipeline.push(&decoded))?;
    }

    let samples = pipeline.finish()?;
    debug!(
        path = %path.display(),
        seconds = samples.len() as f64 / TARGET_SAMPLE_RATE as f64,
        "decoded audio"
    );
    Ok(samples)
}
