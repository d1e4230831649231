use anyhow::{Context, Result};
use whisper_rs::WhisperSegment;

use crate::words::WordSpan;

/// A whisper token with its raw centisecond timestamps.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct RawToken {
    pub text: String,
    pub t0: i64,
    pub t1: i64,
}

impl RawToken {
    #[cfg(test)]
    pub fn new(text: &str, t0: i64, t1: i64) -> Self {
        Self {
            text: text.to_owned(),
            t0,
            t1,
        }
    }

    /// Control tokens such as `[_BEG_]`, `[_TT_50]` or `<|endoftext|>`.
    fn is_special(&self) -> bool {
        let t = self.text.trim();
        (t.starts_with("[_") && t.ends_with(']')) || (t.starts_with("<|") && t.ends_with("|>"))
    }
}

pub(super) fn tokens_from_segment(segment: &WhisperSegment) -> Result<Vec<RawToken>> {
    let token_count = segment.n_tokens();
    let token_count = usize::try_from(token_count)
        .with_context(|| format!("segment reported negative token count: {token_count}"))?;

    let mut tokens = Vec::with_capacity(token_count);
    for idx in 0..token_count {
        let token = segment
            .get_token(idx as i32)
            .with_context(|| format!("failed to get token {idx} from segment"))?;
        let data = token.token_data();
        let text = token
            .to_str()
            .with_context(|| format!("failed to get token text at index {idx}"))?
            .to_owned();

        tokens.push(RawToken {
            text,
            t0: data.t0,
            t1: data.t1,
        });
    }

    Ok(tokens)
}

/// Whisper reports centiseconds and uses `-1` for unknown; clamp to zero.
pub(super) fn centiseconds_to_seconds(value: i64) -> f64 {
    if value < 0 { 0.0 } else { value as f64 / 100.0 }
}

/// Join sub-word tokens into words.
///
/// A token that begins with whitespace starts a new word; any other token (including trailing
/// punctuation) extends the current one. A word spans from its first token's start to its last
/// token's end.
pub(super) fn merge_tokens_into_words(tokens: &[RawToken]) -> Vec<WordSpan> {
    let mut words = Vec::new();
    let mut current: Option<WordSpan> = None;

    for token in tokens.iter().filter(|t| !t.is_special()) {
        let start = centiseconds_to_seconds(token.t0);
        let end = centiseconds_to_seconds(token.t1).max(start);
        let starts_word = token.text.starts_with(char::is_whitespace);

        match current.as_mut() {
            Some(word) if !starts_word => {
                word.text.push_str(&token.text);
                word.end = word.end.max(end);
            }
            _ => {
                if let Some(done) = current.take() {
                    push_word(&mut words, done);
                }
                current = Some(WordSpan::new(token.text.clone(), start, end));
            }
        }
    }

    if let Some(done) = current {
        push_word(&mut words, done);
    }
    words
}

fn push_word(words: &mut Vec<WordSpan>, mut word: WordSpan) {
    word.text = word.text.trim().to_owned();
    if !word.text.is_empty() {
        words.push(word);
    }
}
