use serde::{Deserialize, Serialize};

/// A single spoken word with clip-local timing in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSpan {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl WordSpan {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// One speech-to-text segment: the words recognized in a contiguous stretch of speech.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub words: Vec<WordSpan>,
}

impl TranscriptSegment {
    pub fn new(words: Vec<WordSpan>) -> Self {
        Self { words }
    }

    /// The segment text as the recognizer produced it, words joined by single spaces.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.trim())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
