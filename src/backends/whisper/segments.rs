use anyhow::{Context, Result};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperSegment};

use crate::words::{TranscriptSegment, WordSpan};

use super::token::{centiseconds_to_seconds, merge_tokens_into_words, tokens_from_segment};

/// Run one whisper pass over `samples` and collect word-timed segments.
pub(super) fn transcribe_samples(
    ctx: &WhisperContext,
    language: Option<&str>,
    samples: &[f32],
) -> Result<Vec<TranscriptSegment>> {
    let params = build_full_params(language);

    let mut state = ctx
        .create_state()
        .context("failed to create whisper state")?;
    state
        .full(params, samples)
        .context("failed to run whisper full()")?;

    let mut segments = Vec::new();
    for segment in state.as_iter() {
        let words = words_from_segment(&segment)?;
        if !words.is_empty() {
            segments.push(TranscriptSegment::new(words));
        }
    }
    Ok(segments)
}

/// Token-level words, or the whole segment as one span when whisper produced no usable tokens.
fn words_from_segment(segment: &WhisperSegment) -> Result<Vec<WordSpan>> {
    let tokens = tokens_from_segment(segment)?;
    let words = merge_tokens_into_words(&tokens);
    if !words.is_empty() {
        return Ok(words);
    }

    let text = segment
        .to_str()
        .context("failed to get segment text")?
        .trim()
        .to_owned();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let start = centiseconds_to_seconds(segment.start_timestamp());
    let end = centiseconds_to_seconds(segment.end_timestamp()).max(start);
    Ok(vec![WordSpan::new(text, start, end)])
}

fn build_full_params(language: Option<&str>) -> FullParams<'_, '_> {
    let mut params = FullParams::new(SamplingStrategy::BeamSearch {
        beam_size: 5,
        patience: 1.0,
    });

    params.set_n_threads(num_cpus::get() as i32);
    params.set_language(language);
    params.set_no_context(true);
    params.set_single_segment(false);

    params.set_print_progress(false);
    params.set_print_special(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    // Per-token timing is what makes word-level captions possible.
    params.set_token_timestamps(true);

    params
}
