//! SubRip (`.srt`) encoding and parsing.
//!
//! Each cue is written as:
//!
//! ```text
//! 1
//! 00:00:01,250 --> 00:00:02,100
//! Apple ships new chips
//!
//! ```

use std::io::Write;

use crate::captions::CaptionCue;
use crate::cue_encoder::CueEncoder;
use crate::{Error, Result};

/// A `CueEncoder` that writes cues in SubRip format.
///
/// Cues are numbered by the encoder in write order, so a track written through it is always
/// numbered 1..N regardless of the indices carried by the cues themselves.
pub struct SrtEncoder<W: Write> {
    /// The underlying writer we stream SubRip into.
    w: W,

    /// Number of cues written so far.
    written: usize,

    /// Whether the encoder has been closed.
    closed: bool,
}

impl<W: Write> SrtEncoder<W> {
    /// Create a new SubRip encoder that writes to the provided writer.
    pub fn new(w: W) -> Self {
        Self {
            w,
            written: 0,
            closed: false,
        }
    }

    /// Number of cues written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl<W: Write> CueEncoder for SrtEncoder<W> {
    fn write_cue(&mut self, cue: &CaptionCue) -> Result<()> {
        if self.closed {
            return Err(Error::msg("cannot write cue: encoder is already closed"));
        }

        self.written += 1;

        let start = format_timestamp_srt(cue.start);
        let end = format_timestamp_srt(cue.end);

        // A blank line ends a SubRip block, so cue text must stay on one line.
        let text = cue
            .text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        writeln!(&mut self.w, "{}", self.written)?;
        writeln!(&mut self.w, "{start} --> {end}")?;
        writeln!(&mut self.w, "{text}")?;
        writeln!(&mut self.w)?;

        Ok(())
    }

    /// Flush the underlying writer. This is idempotent.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.w.flush()?;
        self.closed = true;

        Ok(())
    }
}

/// Format seconds into a SubRip timestamp (`HH:MM:SS,mmm`).
///
/// Rounds to the nearest millisecond; negative input clamps to zero.
pub fn format_timestamp_srt(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;

    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;

    let s = total_s % 60;
    let total_m = total_s / 60;

    let m = total_m % 60;
    let h = total_m / 60;

    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// Parse SubRip text into cues numbered 1..N in file order.
///
/// Index lines are optional and their values are not trusted. Multi-line cue text is joined
/// with single spaces.
pub fn parse_srt(input: &str) -> Result<Vec<CaptionCue>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut cues = Vec::new();
    let mut lines = input.lines().enumerate().peekable();

    while let Some((idx, line)) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // The index line may be missing, in which case this already is the timing line.
        let (timing_no, timing) = if line.contains("-->") {
            (idx + 1, line)
        } else {
            match lines.next() {
                Some((next_idx, next)) => (next_idx + 1, next.trim()),
                None => return Err(Error::subtitle(idx + 1, "cue is missing a timestamp line")),
            }
        };

        let (start_raw, end_raw) = timing
            .split_once("-->")
            .map(|(a, b)| (a.trim(), b.trim()))
            .ok_or_else(|| Error::subtitle(timing_no, "timestamp line must contain '-->'"))?;

        let start = parse_timestamp(start_raw).ok_or_else(|| {
            Error::subtitle(timing_no, format!("invalid start timestamp '{start_raw}'"))
        })?;
        let end = parse_timestamp(end_raw).ok_or_else(|| {
            Error::subtitle(timing_no, format!("invalid end timestamp '{end_raw}'"))
        })?;

        if end < start {
            return Err(Error::subtitle(
                timing_no,
                format!("cue ends before it starts: {start_raw} --> {end_raw}"),
            ));
        }

        let mut text_lines = Vec::new();
        while let Some((_, next)) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            text_lines.push(next.trim().to_owned());
            lines.next();
        }

        cues.push(CaptionCue {
            index: cues.len() + 1,
            start,
            end,
            text: text_lines.join(" "),
        });
    }

    Ok(cues)
}

/// Parse `HH:MM:SS,mmm` (a `.` separator is accepted too) into seconds.
fn parse_timestamp(value: &str) -> Option<f64> {
    let cleaned = value.trim().replace(',', ".");
    let (hms, fraction) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), "0"));

    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }

    if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut millis = fraction.chars().take(3).collect::<String>();
    while millis.len() < 3 {
        millis.push('0');
    }
    let millis: u64 = millis.parse().ok()?;

    let total_ms = (hours * 3600 + minutes * 60 + seconds) * 1000 + millis;
    Some(total_ms as f64 / 1000.0)
}
