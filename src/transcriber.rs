use std::path::Path;

use crate::Result;
use crate::words::TranscriptSegment;

/// Speech-to-text over an audio file.
///
/// Implementations return segments of word spans in clip-local time (seconds from the start of
/// the file). The pipeline turns them into caption cues.
pub trait Transcriber {
    fn transcribe(&mut self, audio: &Path) -> Result<Vec<TranscriptSegment>>;
}
