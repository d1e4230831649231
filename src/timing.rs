//! Reflow word-level transcription timing into short caption cues.
//!
//! Vertical video leaves little room for text, so cues are kept to a handful of words and
//! broken early at punctuation. Cue times are shifted by the clip's offset on the master
//! timeline so cues from several clips can be concatenated directly.

use crate::captions::CaptionCue;
use crate::words::TranscriptSegment;

/// Maximum number of words shown in a single cue.
pub const MAX_WORDS_PER_CUE: usize = 4;

/// Punctuation that closes the current cue when it appears anywhere in a word.
const CUE_BREAK_PUNCTUATION: [char; 4] = ['.', ',', '!', '?'];

/// Build caption cues from transcription segments, shifting every timestamp by `offset`.
///
/// A cue is closed when it holds [`MAX_WORDS_PER_CUE`] words, when a word carries
/// terminal punctuation, or at the end of a segment. Indices are assigned 1..N in order.
pub fn cues_from_transcript(segments: &[TranscriptSegment], offset: f64) -> Vec<CaptionCue> {
    let mut cues = Vec::new();
    let mut pending = PendingCue::default();

    for segment in segments {
        for word in &segment.words {
            let text = word.text.trim();
            if text.is_empty() {
                continue;
            }

            pending.push(text, word.start, word.end);

            let breaks = text.contains(CUE_BREAK_PUNCTUATION);
            if pending.words.len() >= MAX_WORDS_PER_CUE || breaks {
                pending.flush_into(&mut cues, offset);
            }
        }

        // Segment boundaries always close the cue, however short.
        pending.flush_into(&mut cues, offset);
    }

    cues
}

#[derive(Default)]
struct PendingCue {
    words: Vec<String>,
    start: f64,
    end: f64,
}

impl PendingCue {
    fn push(&mut self, word: &str, start: f64, end: f64) {
        if self.words.is_empty() {
            self.start = start;
        }
        self.words.push(word.to_owned());
        self.end = end;
    }

    fn flush_into(&mut self, cues: &mut Vec<CaptionCue>, offset: f64) {
        if self.words.is_empty() {
            return;
        }

        cues.push(CaptionCue {
            index: cues.len() + 1,
            start: self.start + offset,
            end: self.end + offset,
            text: self.words.join(" "),
        });
        self.words.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::words::WordSpan;

    fn segment(words: &[(&str, f64, f64)]) -> TranscriptSegment {
        TranscriptSegment::new(
            words
                .iter()
                .map(|(t, s, e)| WordSpan::new(*t, *s, *e))
                .collect(),
        )
    }

    #[test]
    fn empty_transcript_yields_no_cues() {
        assert!(cues_from_transcript(&[], 3.0).is_empty());
        assert!(cues_from_transcript(&[TranscriptSegment::default()], 3.0).is_empty());
    }

    #[test]
    fn groups_of_four_words_are_emitted() {
        let seg = segment(&[
            ("one", 0.0, 0.2),
            ("two", 0.2, 0.4),
            ("three", 0.4, 0.6),
            ("four", 0.6, 0.8),
            ("five", 0.8, 1.0),
            ("six", 1.0, 1.2),
        ]);

        let cues = cues_from_transcript(&[seg], 0.0);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "one two three four");
        assert_eq!(cues[0].start, 0.0);
        assert_eq!(cues[0].end, 0.8);
        assert_eq!(cues[1].text, "five six");
        assert_eq!(cues[1].index, 2);
    }

    #[test]
    fn punctuation_closes_a_cue_early() {
        let seg = segment(&[
            ("Hello,", 0.0, 0.3),
            ("world", 0.3, 0.6),
            ("today!", 0.6, 0.9),
            ("Next", 1.0, 1.2),
        ]);

        let texts: Vec<String> = cues_from_transcript(&[seg], 0.0)
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["Hello,", "world today!", "Next"]);
    }

    #[test]
    fn segment_boundary_flushes_partial_group() {
        let a = segment(&[("short", 0.0, 0.5), ("one", 0.5, 0.9)]);
        let b = segment(&[("another", 1.0, 1.4)]);

        let cues = cues_from_transcript(&[a, b], 0.0);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "short one");
        assert_eq!(cues[1].text, "another");
    }

    #[test]
    fn offset_shifts_every_timestamp() {
        let seg = segment(&[(" Apple", 0.1, 0.4), (" ships.", 0.4, 0.9)]);

        let cues = cues_from_transcript(&[seg], 10.0);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Apple ships.");
        assert!((cues[0].start - 10.1).abs() < 1e-9);
        assert!((cues[0].end - 10.9).abs() < 1e-9);
    }

    #[test]
    fn blank_words_are_ignored() {
        let seg = segment(&[("  ", 0.0, 0.1), ("word", 0.1, 0.3), ("", 0.3, 0.4)]);

        let cues = cues_from_transcript(&[seg], 0.0);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "word");
        assert_eq!(cues[0].start, 0.1);
        assert_eq!(cues[0].end, 0.3);
    }

    #[test]
    fn every_cue_holds_between_one_and_four_words() {
        let words: Vec<(String, f64, f64)> = (0..23)
            .map(|i| {
                let text = if i % 7 == 6 {
                    format!("w{i}.")
                } else {
                    format!("w{i}")
                };
                (text, i as f64 * 0.3, i as f64 * 0.3 + 0.25)
            })
            .collect();
        let seg = TranscriptSegment::new(
            words
                .iter()
                .map(|(t, s, e)| WordSpan::new(t.clone(), *s, *e))
                .collect(),
        );

        let cues = cues_from_transcript(&[seg], 0.0);
        let mut seen = Vec::new();
        for cue in &cues {
            let count = cue.text.split(' ').count();
            assert!((1..=MAX_WORDS_PER_CUE).contains(&count));
            seen.extend(cue.text.split(' ').map(str::to_owned));
        }
        let expected: Vec<String> = words.into_iter().map(|(t, _, _)| t).collect();
        assert_eq!(seen, expected);
    }
}
