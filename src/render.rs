//! Running the external renderer (`ffmpeg`) on a compiled plan.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::compiler::RenderPlan;
use crate::{Error, Result};

/// Anything that can turn a [`RenderPlan`] into an output file.
pub trait Renderer {
    fn render(&self, plan: &RenderPlan) -> Result<()>;
}

/// Runs the `ffmpeg` binary and follows its progress on stderr.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    binary: PathBuf,
    verbose: bool,
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            verbose: false,
        }
    }

    /// Echo every ffmpeg stderr line.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Renderer for FfmpegRenderer {
    fn render(&self, plan: &RenderPlan) -> Result<()> {
        info!(
            output = %plan.output.display(),
            inputs = plan.inputs.len(),
            duration = plan.duration,
            "rendering reel"
        );
        debug!(args = ?plan.args, "ffmpeg arguments");

        let mut child = Command::new(&self.binary)
            .args(&plan.args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::RenderFailed {
                status: None,
                message: format!("failed to spawn {}: {e}", self.binary.display()),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::msg("ffmpeg stderr was not captured"))?;

        let mut progress = RenderProgress::new(plan.duration);
        let result = read_ffmpeg_stderr(stderr, self.verbose, &mut |position, speed| {
            progress.update(position, speed);
        });

        let status = child.wait()?;
        let summary = result?;

        if !status.success() {
            progress.abandon();
            let message = if summary.error_lines.is_empty() {
                summary.last_line
            } else {
                summary.error_lines.join("\n")
            };
            return Err(Error::RenderFailed {
                status: status.code(),
                message: message.trim().to_owned(),
            });
        }

        progress.finish();
        info!(output = %plan.output.display(), "render finished");
        Ok(())
    }
}

#[cfg(feature = "progress")]
struct RenderProgress {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "progress")]
impl RenderProgress {
    fn new(duration: f64) -> Self {
        use indicatif::{ProgressBar, ProgressStyle};

        let bar = ProgressBar::new((duration.max(0.0) * 1000.0) as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% ({eta}) {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        bar.set_message("rendering");
        Self { bar }
    }

    fn update(&mut self, position: f64, speed: Option<&str>) {
        self.bar.set_position((position * 1000.0) as u64);
        if let Some(speed) = speed {
            self.bar.set_message(speed.to_owned());
        }
    }

    fn finish(self) {
        self.bar.finish_with_message("done");
    }

    fn abandon(&self) {
        self.bar.abandon_with_message("failed");
    }
}

#[cfg(not(feature = "progress"))]
struct RenderProgress {
    duration: f64,
    last_logged: f64,
}

#[cfg(not(feature = "progress"))]
impl RenderProgress {
    fn new(duration: f64) -> Self {
        Self {
            duration,
            last_logged: 0.0,
        }
    }

    fn update(&mut self, position: f64, speed: Option<&str>) {
        // Roughly every ten seconds of output.
        if position - self.last_logged >= 10.0 {
            self.last_logged = position;
            debug!(position, duration = self.duration, speed, "render progress");
        }
    }

    fn finish(self) {}

    fn abandon(&self) {}
}

/// What is left of ffmpeg's stderr once the process exits.
#[derive(Debug, Default)]
struct StderrSummary {
    last_line: String,
    error_lines: Vec<String>,
}

/// Split stderr into lines (ffmpeg rewrites its status line with `\r`) and report progress.
fn read_ffmpeg_stderr<R: Read>(
    mut stderr: R,
    verbose: bool,
    on_progress: &mut dyn FnMut(f64, Option<&str>),
) -> Result<StderrSummary> {
    let mut summary = StderrSummary::default();
    let mut buffer = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = stderr.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buffer[..n]);

        while let Some(pos) = pending.iter().position(|b| *b == b'\r' || *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            handle_line(&line[..pos], verbose, &mut summary, on_progress);
        }
    }

    if !pending.is_empty() {
        handle_line(&pending, verbose, &mut summary, on_progress);
    }

    Ok(summary)
}

fn handle_line(
    raw: &[u8],
    verbose: bool,
    summary: &mut StderrSummary,
    on_progress: &mut dyn FnMut(f64, Option<&str>),
) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end();
    if line.is_empty() {
        return;
    }

    if verbose {
        eprintln!("{line}");
    }

    if line.to_ascii_lowercase().contains("error") {
        summary.error_lines.push(line.to_owned());
    }

    if let Some(position) = parse_ffmpeg_progress(line) {
        on_progress(position, parse_ffmpeg_speed(line));
    }

    summary.last_line = line.to_owned();
}

/// The `time=HH:MM:SS.ss` position of an ffmpeg status line, in seconds.
pub fn parse_ffmpeg_progress(line: &str) -> Option<f64> {
    let start = line.find("time=")? + "time=".len();
    let rest = &line[start..];
    let value = rest.split_whitespace().next()?;
    parse_time_to_seconds(value)
}

pub fn parse_time_to_seconds(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// The `speed=1.5x` field of an ffmpeg status line, including the trailing `x`.
pub fn parse_ffmpeg_speed(line: &str) -> Option<&str> {
    let start = line.find("speed=")? + "speed=".len();
    let rest = line[start..].trim_start();
    let end = rest.find('x')?;
    Some(&rest[..=end])
}
