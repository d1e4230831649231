use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use newsreel::backends::whisper::WhisperTranscriber;
use newsreel::opts::DEFAULT_OUTRO_TEXT;
use newsreel::probe::{FfprobeProbe, duration_or_zero};
use newsreel::publish::{TikTokConfig, TikTokPublisher};
use newsreel::render::{FfmpegRenderer, Renderer};
use newsreel::sources::download::HttpImageFetcher;
use newsreel::sources::elevenlabs::{ElevenLabsConfig, ElevenLabsSynthesizer};
use newsreel::sources::newsapi::{NewsApiConfig, NewsApiSource};
use newsreel::sources::summarize::{HfSummarizer, SummarizerConfig};
use newsreel::timeline::pick_background_start;
use newsreel::timing::cues_from_transcript;
use newsreel::transcriber::Transcriber;
use newsreel::{
    AudioClip, CaptionTrack, Collaborators, FilterGraphCompiler, Opts, OverlayAsset, Pipeline,
    RenderOpts, RenderRequest, Timeline,
};

#[derive(Parser, Debug)]
#[command(name = "newsreel")]
#[command(about = "Build vertical tech-news reels with word-timed captions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the news, narrate it and render a reel.
    Run(RunArgs),
    /// Transcribe voiceover clips into one caption track.
    Captions(CaptionsArgs),
    /// Render a reel from existing clips, images and captions.
    Render(RenderArgs),
    /// Upload a finished reel to TikTok.
    Publish(PublishArgs),
}

#[derive(Args, Debug)]
struct RenderFlags {
    /// Stock footage used as the background.
    #[arg(short = 'b', long = "background")]
    background: PathBuf,

    /// Output video path.
    #[arg(short = 'o', long = "output", default_value = "output.mp4")]
    output: PathBuf,

    /// Seed for the background start offset (random when omitted).
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Draw each article's headline under its image.
    #[arg(long = "headlines", default_value_t = false)]
    headlines: bool,

    #[arg(long = "ffmpeg", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    #[arg(long = "ffprobe", default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Echo ffmpeg's stderr.
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    render: RenderFlags,

    /// Path to a whisper.cpp model file (e.g. `ggml-base.en.bin`).
    #[arg(short = 'm', long = "model")]
    model: PathBuf,

    /// Directory for voiceovers, images and caption files.
    #[arg(short = 'w', long = "work-dir", default_value = "work")]
    work_dir: PathBuf,

    #[arg(long = "max-items", default_value_t = 3)]
    max_items: usize,

    #[arg(long = "outro-text", default_value = DEFAULT_OUTRO_TEXT)]
    outro_text: String,

    #[arg(long = "no-outro", default_value_t = false)]
    no_outro: bool,

    /// Language hint for transcription (e.g. `en`).
    #[arg(short = 'l', long = "language")]
    language: Option<String>,

    /// Timeout for each HTTP request, in seconds.
    #[arg(long = "http-timeout", default_value_t = 60)]
    http_timeout: u64,

    /// Also write the run report as JSON to this file.
    #[arg(long = "report")]
    report: Option<PathBuf>,

    #[arg(long = "newsapi-key", env = "NEWSAPI_KEY", hide_env_values = true)]
    newsapi_key: String,

    #[arg(long = "elevenlabs-key", env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    elevenlabs_key: String,

    #[arg(long = "hf-token", env = "HF_TOKEN", hide_env_values = true)]
    hf_token: String,
}

#[derive(Args, Debug)]
struct CaptionsArgs {
    #[arg(short = 'm', long = "model")]
    model: PathBuf,

    /// Voiceover clips in playback order.
    #[arg(short = 'a', long = "audio", required = true, num_args = 1..)]
    audio: Vec<PathBuf>,

    /// Where to write the SubRip track; stdout when omitted.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    #[arg(short = 'l', long = "language")]
    language: Option<String>,

    #[arg(long = "ffprobe", default_value = "ffprobe")]
    ffprobe: PathBuf,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    render: RenderFlags,

    /// Voiceover clips in playback order.
    #[arg(short = 'c', long = "clip", required = true, num_args = 1..)]
    clips: Vec<PathBuf>,

    /// Images shown during the clip with the same position.
    #[arg(short = 'i', long = "image", num_args = 1..)]
    images: Vec<PathBuf>,

    /// Master caption track (SubRip).
    #[arg(short = 's', long = "subtitles")]
    subtitles: PathBuf,

    /// Print the ffmpeg arguments instead of running ffmpeg.
    #[arg(long = "dry-run", default_value_t = false)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct PublishArgs {
    #[arg(long = "video")]
    video: PathBuf,

    #[arg(long = "title", default_value = "Today's tech news #tech #news")]
    title: String,

    #[arg(long = "privacy", default_value = "SELF_ONLY")]
    privacy: String,

    #[arg(long = "access-token", env = "TIKTOK_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,
}

fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    newsreel::logging::init();

    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Captions(args) => captions(args),
        Command::Render(args) => render(args),
        Command::Publish(args) => publish(args),
    }
}

fn render_opts(flags: &RenderFlags) -> RenderOpts {
    RenderOpts {
        show_headlines: flags.headlines,
        ..RenderOpts::default()
    }
}

fn run(args: RunArgs) -> Result<()> {
    let timeout = Duration::from_secs(args.http_timeout);

    let mut news_config = NewsApiConfig::new(args.newsapi_key);
    news_config.timeout = timeout;
    let mut summarizer_config = SummarizerConfig::new(args.hf_token);
    summarizer_config.timeout = timeout;
    let mut speech_config = ElevenLabsConfig::new(args.elevenlabs_key);
    speech_config.timeout = timeout;

    let news = NewsApiSource::new(news_config)?;
    let summarizer = HfSummarizer::new(summarizer_config)?;
    let synthesizer = ElevenLabsSynthesizer::new(speech_config)?;
    let images = HttpImageFetcher::new(timeout)?;
    let mut transcriber = WhisperTranscriber::new(&args.model, args.language)
        .context("failed to load whisper model")?;
    let probe = FfprobeProbe::new(&args.render.ffprobe);
    let renderer = FfmpegRenderer::new(&args.render.ffmpeg).verbose(args.render.verbose);

    let mut opts = Opts::new(&args.work_dir, &args.render.background, &args.render.output);
    opts.max_items = args.max_items;
    opts.outro_text = (!args.no_outro).then_some(args.outro_text);
    opts.background_seed = args.render.seed;
    opts.render = render_opts(&args.render);

    let mut pipeline = Pipeline::new(
        opts,
        Collaborators {
            news: &news,
            summarizer: &summarizer,
            synthesizer: &synthesizer,
            images: &images,
            transcriber: &mut transcriber,
            probe: &probe,
            renderer: &renderer,
        },
    );

    let report = pipeline.run()?;
    let json = serde_json::to_string_pretty(&report)?;
    if let Some(path) = &args.report {
        std::fs::write(path, &json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}

fn captions(args: CaptionsArgs) -> Result<()> {
    let mut transcriber = WhisperTranscriber::new(&args.model, args.language)
        .context("failed to load whisper model")?;
    let probe = FfprobeProbe::new(&args.ffprobe);

    let mut track = CaptionTrack::new();
    let mut offset = 0.0;
    for path in &args.audio {
        let clip = AudioClip::new(path);
        let segments = transcriber.transcribe(clip.path())?;
        track.append_clip(cues_from_transcript(&segments, offset));
        offset += clip.duration(&probe);
        info!(path = %path.display(), offset, "captioned clip");
    }

    match &args.output {
        Some(path) => track.save(path)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(track.to_srt()?.as_bytes())?;
        }
    }
    Ok(())
}

fn render(args: RenderArgs) -> Result<()> {
    let probe = FfprobeProbe::new(&args.render.ffprobe);

    let clips: Vec<AudioClip> = args.clips.iter().map(AudioClip::new).collect();
    let timeline = Timeline::plan(&clips, &probe);
    let total = timeline.total_voice_length();
    if total <= 0.0 {
        bail!("voiceover clips have no measurable duration");
    }

    let background_duration = duration_or_zero(&probe, &args.render.background);
    let background_start = match args.render.seed {
        Some(seed) => {
            pick_background_start(background_duration, total, &mut StdRng::seed_from_u64(seed))
        }
        None => pick_background_start(background_duration, total, &mut rand::thread_rng()),
    };

    let overlays = OverlayAsset::bind_by_index(&args.images, &timeline);
    let plan = FilterGraphCompiler::new(render_opts(&args.render)).compile(&RenderRequest {
        clips: &clips,
        timeline: &timeline,
        overlays: &overlays,
        background: &args.render.background,
        background_start,
        captions: &args.subtitles,
        output: &args.render.output,
    })?;

    if args.dry_run {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", shell_words(&args.render.ffmpeg, &plan.args))?;
        return Ok(());
    }

    FfmpegRenderer::new(&args.render.ffmpeg)
        .verbose(args.render.verbose)
        .render(&plan)?;
    Ok(())
}

fn publish(args: PublishArgs) -> Result<()> {
    let mut config = TikTokConfig::new(args.access_token);
    config.privacy_level = args.privacy;

    let receipt = TikTokPublisher::new(config)?.publish(&args.video, &args.title)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", serde_json::to_string_pretty(&receipt)?)?;
    Ok(())
}

/// Render a command line with single-quoted arguments where needed.
fn shell_words(program: &Path, args: &[String]) -> String {
    std::iter::once(program.to_string_lossy().into_owned())
        .chain(args.iter().cloned())
        .map(|arg| {
            if !arg.is_empty()
                && arg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+".contains(c))
            {
                arg
            } else {
                format!("'{}'", arg.replace('\'', r"'\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_requires_clips_and_subtitles() {
        let err = Cli::try_parse_from(["newsreel", "render", "-b", "bg.mp4"]).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("--clip") || text.contains("--subtitles"));
    }

    #[test]
    fn render_args_parse() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "newsreel", "render", "-b", "bg.mp4", "-c", "a.mp3", "b.mp3", "-i", "a.jpg", "-s",
            "subs.srt", "--seed", "7", "--dry-run",
        ])?;
        let Command::Render(args) = cli.command else {
            panic!("expected render command");
        };
        assert_eq!(args.clips, vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")]);
        assert_eq!(args.images, vec![PathBuf::from("a.jpg")]);
        assert_eq!(args.render.seed, Some(7));
        assert_eq!(args.render.output, PathBuf::from("output.mp4"));
        assert!(args.dry_run);
        Ok(())
    }

    #[test]
    fn shell_words_quotes_filter_graphs() {
        let line = shell_words(
            Path::new("ffmpeg"),
            &["-i".to_owned(), "a b.mp4".to_owned(), "[0:v]null[v]".to_owned()],
        );
        assert_eq!(line, "ffmpeg -i 'a b.mp4' '[0:v]null[v]'");
    }
}
