//! Codec-level decoding on top of symphonia.

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{Packet, Track};

/// A decoder for `track` from symphonia's default codec registry.
pub fn make_decoder_for_track(track: &Track) -> Result<Box<dyn Decoder>> {
    symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!(e))
        .context("failed to create decoder for audio track")
}

/// Decode one packet and pass the PCM buffer to `on_decoded`.
///
/// Returns `Ok(false)` when the packet was skipped: a corrupt frame, or an IO error which is
/// treated as end of stream. Other decoder errors are fatal.
pub fn decode_packet_and_then(
    decoder: &mut Box<dyn Decoder>,
    packet: &Packet,
    mut on_decoded: impl FnMut(AudioBufferRef<'_>) -> Result<()>,
) -> Result<bool> {
    match decoder.decode(packet) {
        Ok(buf) => {
            on_decoded(buf)?;
            Ok(true)
        }
        Err(SymphoniaError::DecodeError(_)) => Ok(false),
        Err(SymphoniaError::IoError(_)) => Ok(false),
        Err(e) => Err(anyhow!(e)).context("decoder failure"),
    }
}
