//! The master timeline: where each voiceover clip sits once all clips are concatenated.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Serialize;

use crate::probe::{MediaProbe, duration_or_zero};

/// A voiceover clip on disk. Its duration is probed on first use and cached.
#[derive(Debug, Clone)]
pub struct AudioClip {
    path: PathBuf,
    duration: OnceCell<f64>,
}

impl AudioClip {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            duration: OnceCell::new(),
        }
    }

    /// A clip whose duration is already known, so it is never probed.
    pub fn with_duration(path: impl Into<PathBuf>, duration: f64) -> Self {
        let clip = Self::new(path);
        let _ = clip.duration.set(duration.max(0.0));
        clip
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The clip duration in seconds, probing at most once. Probe failures yield `0.0`.
    pub fn duration(&self, probe: &dyn MediaProbe) -> f64 {
        *self
            .duration
            .get_or_init(|| duration_or_zero(probe, &self.path).max(0.0))
    }

    /// The cached duration, if it has been computed.
    pub fn known_duration(&self) -> Option<f64> {
        self.duration.get().copied()
    }
}

/// The `[start, end]` interval (seconds) a clip occupies on the master timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimelineWindow {
    pub start: f64,
    pub end: f64,
}

impl TimelineWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `t` falls inside the window (inclusive on both ends).
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Contiguous, non-overlapping windows, one per clip, starting at zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    windows: Vec<TimelineWindow>,
}

impl Timeline {
    /// Probe each clip (cached per clip) and lay the clips end to end.
    pub fn plan(clips: &[AudioClip], probe: &dyn MediaProbe) -> Self {
        Self::from_durations(clips.iter().map(|clip| clip.duration(probe)))
    }

    /// Lay out windows for clips with the given durations, in order.
    pub fn from_durations(durations: impl IntoIterator<Item = f64>) -> Self {
        let mut windows = Vec::new();
        let mut cursor = 0.0;
        for duration in durations {
            let start = cursor;
            cursor += duration.max(0.0);
            windows.push(TimelineWindow::new(start, cursor));
        }
        Self { windows }
    }

    pub fn windows(&self) -> &[TimelineWindow] {
        &self.windows
    }

    pub fn window(&self, idx: usize) -> Option<TimelineWindow> {
        self.windows.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// End of the last window, or `0.0` for an empty timeline.
    pub fn total_voice_length(&self) -> f64 {
        self.windows.last().map_or(0.0, |w| w.end)
    }
}

/// Choose where to start reading the background footage.
///
/// When the background outlasts the voice track, a whole-second offset is drawn uniformly from
/// `[0, floor(background - voice)]` so repeated renders show different footage. Otherwise the
/// background starts at zero; it is never looped.
pub fn pick_background_start<R>(background_duration: f64, voice_length: f64, rng: &mut R) -> u64
where
    R: Rng + ?Sized,
{
    let slack = background_duration - voice_length;
    if !slack.is_finite() || slack <= 0.0 {
        return 0;
    }

    let max_start = slack.floor() as u64;
    rng.gen_range(0..=max_start)
}
