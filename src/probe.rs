//! Media duration probing via `ffprobe`.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::warn;

use crate::{Error, Result};

/// Anything that can report the playback duration of a media file.
pub trait MediaProbe {
    /// Duration of the media at `path`, in seconds.
    fn duration_seconds(&self, path: &Path) -> Result<f64>;
}

/// Probe `path`, falling back to `0.0` when probing fails.
///
/// A clip that cannot be probed still occupies a (zero-length) slot on the timeline instead of
/// aborting the run.
pub fn duration_or_zero(probe: &dyn MediaProbe, path: &Path) -> f64 {
    match probe.duration_seconds(path) {
        Ok(duration) => duration,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "duration probe failed; using 0.0");
            0.0
        }
    }
}

/// Runs the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl MediaProbe for FfprobeProbe {
    fn duration_seconds(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| Error::probe(path, format!("failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(Error::probe(
                path,
                format!(
                    "ffprobe exited with status {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ffprobe_duration(&stdout).map_err(|reason| Error::probe(path, reason))
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Extract `format.duration` from `ffprobe -of json` output.
fn parse_ffprobe_duration(stdout: &str) -> std::result::Result<f64, String> {
    let parsed: FfprobeOutput =
        serde_json::from_str(stdout).map_err(|e| format!("malformed ffprobe output: {e}"))?;

    let raw = parsed
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| "ffprobe reported no duration".to_owned())?;

    let duration: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("ffprobe duration is not a number: '{raw}'"))?;

    if !duration.is_finite() || duration < 0.0 {
        return Err(format!("ffprobe duration out of range: {duration}"));
    }

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProbe;

    impl MediaProbe for FailingProbe {
        fn duration_seconds(&self, path: &Path) -> Result<f64> {
            Err(Error::probe(path, "boom"))
        }
    }

    #[test]
    fn parses_duration_from_json() {
        let out = r#"{ "format": { "duration": "12.345000" } }"#;
        assert_eq!(parse_ffprobe_duration(out), Ok(12.345));
    }

    #[test]
    fn missing_duration_is_an_error() {
        let err = parse_ffprobe_duration(r#"{ "format": {} }"#).unwrap_err();
        assert!(err.contains("no duration"));

        let err = parse_ffprobe_duration("{}").unwrap_err();
        assert!(err.contains("no duration"));
    }

    #[test]
    fn malformed_output_is_an_error() {
        assert!(parse_ffprobe_duration("not json").is_err());
        assert!(parse_ffprobe_duration(r#"{ "format": { "duration": "N/A" } }"#).is_err());
        assert!(parse_ffprobe_duration(r#"{ "format": { "duration": "-1.0" } }"#).is_err());
    }

    #[test]
    fn failed_probe_defaults_to_zero() {
        assert_eq!(duration_or_zero(&FailingProbe, Path::new("missing.mp3")), 0.0);
    }

    #[test]
    fn missing_binary_is_a_probe_error() {
        let probe = FfprobeProbe::new("/nonexistent/ffprobe-binary");
        let err = probe.duration_seconds(Path::new("clip.mp3")).unwrap_err();
        assert!(matches!(err, Error::ProbeFailed { .. }));
    }
}
