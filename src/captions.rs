//! Caption cues and the master caption track.
//!
//! Per-clip cue lists arrive already shifted onto the master timeline; the track only
//! concatenates them in arrival order and renumbers. Tracks are persisted as SubRip.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cue_encoder::CueEncoder;
use crate::srt::{SrtEncoder, parse_srt};
use crate::{Error, Result};

/// A single timed caption on the master timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCue {
    /// 1-based position within its track.
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// An ordered, sequentially numbered list of cues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionTrack {
    cues: Vec<CaptionCue>,
}

impl CaptionTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a track from per-clip cue lists, preserving clip order.
    pub fn from_clips<I>(clips: I) -> Self
    where
        I: IntoIterator<Item = Vec<CaptionCue>>,
    {
        let mut track = Self::new();
        for cues in clips {
            track.append_clip(cues);
        }
        track
    }

    /// Append one clip's cues after the existing ones, renumbering them to follow on.
    pub fn append_clip(&mut self, cues: impl IntoIterator<Item = CaptionCue>) {
        for mut cue in cues {
            cue.index = self.cues.len() + 1;
            self.cues.push(cue);
        }
    }

    pub fn cues(&self) -> &[CaptionCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Stream every cue into `encoder`. The caller owns the encoder lifecycle.
    pub fn write_to(&self, encoder: &mut dyn CueEncoder) -> Result<()> {
        for cue in &self.cues {
            encoder.write_cue(cue)?;
        }
        Ok(())
    }

    /// Serialize the track as SubRip text.
    pub fn to_srt(&self) -> Result<String> {
        let mut out = Vec::new();
        let mut encoder = SrtEncoder::new(&mut out);
        self.write_to(&mut encoder)?;
        encoder.close()?;
        Ok(String::from_utf8(out).map_err(|e| e.utf8_error())?)
    }

    /// Parse a SubRip document into a track.
    pub fn from_srt(input: &str) -> Result<Self> {
        Ok(Self {
            cues: parse_srt(input)?,
        })
    }

    /// Write the track to `path` as SubRip, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        {
            let mut encoder = SrtEncoder::new(&mut writer);
            self.write_to(&mut encoder)?;
            encoder.close()?;
        }
        writer.flush()?;

        debug!(path = %path.display(), cues = self.cues.len(), "caption track written");
        Ok(())
    }

    /// Load a SubRip file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
        Self::from_srt(&text)
    }

    /// Load finalized per-clip caption files and concatenate them in the given order.
    pub fn concat_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut track = Self::new();
        for path in paths {
            let clip = Self::load(path.as_ref())?;
            track.append_clip(clip.cues);
        }
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(index: usize, start: f64, end: f64, text: &str) -> CaptionCue {
        CaptionCue {
            index,
            start,
            end,
            text: text.to_owned(),
        }
    }

    #[test]
    fn from_clips_preserves_order_and_renumbers() {
        let first = vec![cue(1, 0.0, 1.0, "a"), cue(2, 1.0, 2.0, "b")];
        let second = vec![cue(1, 3.0, 4.0, "c")];

        let track = CaptionTrack::from_clips([first, Vec::new(), second]);

        let got: Vec<(usize, &str)> = track
            .cues()
            .iter()
            .map(|c| (c.index, c.text.as_str()))
            .collect();
        assert_eq!(got, vec![(1, "a"), (2, "b"), (3, "c")]);
    }

    #[test]
    fn to_srt_and_back_keeps_cues() -> anyhow::Result<()> {
        let track = CaptionTrack::from_clips([vec![
            cue(1, 0.0, 0.75, "Apple ships new"),
            cue(2, 0.75, 1.5, "chips today."),
        ]]);

        let text = track.to_srt()?;
        let parsed = CaptionTrack::from_srt(&text)?;
        assert_eq!(parsed, track);
        Ok(())
    }

    #[test]
    fn concat_files_renumbers_across_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("captions_0.srt");
        let b = dir.path().join("nested").join("captions_1.srt");

        CaptionTrack::from_clips([vec![cue(1, 0.0, 1.0, "first"), cue(2, 1.0, 2.0, "second")]])
            .save(&a)?;
        CaptionTrack::from_clips([vec![cue(1, 2.0, 3.5, "third")]]).save(&b)?;

        let track = CaptionTrack::concat_files(&[&a, &b])?;
        assert_eq!(track.len(), 3);
        assert_eq!(track.cues()[2].index, 3);
        assert_eq!(track.cues()[2].text, "third");
        assert_eq!(track.cues()[2].start, 2.0);
        assert_eq!(track.cues()[2].end, 3.5);
        Ok(())
    }

    #[test]
    fn load_missing_file_names_the_path() {
        let err = CaptionTrack::load(Path::new("/definitely/not/here.srt")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.srt"));
    }
}
