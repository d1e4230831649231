use crate::Result;
use crate::captions::CaptionCue;

/// Streaming sink for caption cues (e.g. a SubRip file being written).
pub trait CueEncoder {
    fn write_cue(&mut self, cue: &CaptionCue) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}
