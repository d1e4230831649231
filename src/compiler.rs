//! Compile a reel's timed assets into an ffmpeg invocation.
//!
//! Renderer inputs are opened in a fixed order (background, every voiceover clip, every
//! overlay image) so input indices are known while the graph is built:
//! the background is input 0, clip `i` is input `1 + i`, and overlay image `j` is input
//! `1 + clip_count + j`.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::escape::{escape_filter_path, escape_filter_text, quote_filter_arg};
use crate::filter_graph::{FilterGraphSpec, FilterNode, NodeKind, Pad};
use crate::opts::RenderOpts;
use crate::timeline::{AudioClip, Timeline, TimelineWindow};
use crate::{Error, Result};

const BACKGROUND_LABEL: &str = "bg";
const AUDIO_OUT_LABEL: &str = "audio_out";
const VIDEO_OUT_LABEL: &str = "v";

const HEADLINE_FONT_SIZE: u32 = 56;

/// An article image shown while its clip is narrated.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayAsset {
    pub image: PathBuf,
    pub window: TimelineWindow,
    pub headline: Option<String>,
}

impl OverlayAsset {
    pub fn new(image: impl Into<PathBuf>, window: TimelineWindow) -> Self {
        Self {
            image: image.into(),
            window,
            headline: None,
        }
    }

    pub fn with_headline(mut self, headline: impl Into<String>) -> Self {
        self.headline = Some(headline.into());
        self
    }

    /// Pair image `i` with timeline window `i`; images without a window get an empty `(0, 0)`.
    pub fn bind_by_index(images: &[PathBuf], timeline: &Timeline) -> Vec<Self> {
        images
            .iter()
            .enumerate()
            .map(|(i, image)| Self::new(image, timeline.window(i).unwrap_or_default()))
            .collect()
    }
}

/// Everything needed to compose one reel.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub clips: &'a [AudioClip],
    pub timeline: &'a Timeline,
    pub overlays: &'a [OverlayAsset],
    pub background: &'a Path,
    /// Whole seconds skipped at the start of the background footage.
    pub background_start: u64,
    pub captions: &'a Path,
    pub output: &'a Path,
}

/// A renderer input, in `-i` order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInput {
    pub path: PathBuf,
    /// Input-side seek (`-ss`) in whole seconds.
    pub seek: Option<u64>,
}

/// A compiled reel, ready to hand to a renderer.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub inputs: Vec<RenderInput>,
    pub graph: FilterGraphSpec,
    pub directive: String,
    /// Output duration; always the voice track length.
    pub duration: f64,
    pub output: PathBuf,
    /// Full ffmpeg argument list (without the program name).
    pub args: Vec<String>,
}

pub struct FilterGraphCompiler {
    opts: RenderOpts,
}

impl FilterGraphCompiler {
    pub fn new(opts: RenderOpts) -> Self {
        Self { opts }
    }

    pub fn compile(&self, req: &RenderRequest<'_>) -> Result<RenderPlan> {
        if req.clips.is_empty() {
            return Err(Error::msg("cannot compile a reel without voiceover clips"));
        }
        if req.clips.len() != req.timeline.len() {
            return Err(Error::msg(format!(
                "timeline has {} windows for {} clips",
                req.timeline.len(),
                req.clips.len()
            )));
        }

        let duration = req.timeline.total_voice_length();
        let inputs = self.collect_inputs(req);

        let mut graph = FilterGraphSpec::new();
        self.push_background(&mut graph)?;
        self.push_audio_concat(&mut graph, req.clips.len())?;

        let mut video_label = BACKGROUND_LABEL.to_owned();
        for (idx, overlay) in req.overlays.iter().enumerate() {
            let input_index = 1 + req.clips.len() + idx;
            video_label =
                self.push_overlay(&mut graph, &video_label, input_index, idx, overlay, duration)?;
        }

        self.push_subtitles(&mut graph, &video_label, req.captions)?;

        let mut dangling = graph.dangling_labels();
        dangling.sort_unstable();
        if dangling != [AUDIO_OUT_LABEL, VIDEO_OUT_LABEL] {
            return Err(Error::msg(format!(
                "filter graph has unexpected outputs: {dangling:?}"
            )));
        }

        let directive = graph.to_directive();
        debug!(directive = %directive, "compiled filter graph");

        let args = self.build_args(&inputs, &directive, duration, req.output);

        Ok(RenderPlan {
            inputs,
            graph,
            directive,
            duration,
            output: req.output.to_path_buf(),
            args,
        })
    }

    fn collect_inputs(&self, req: &RenderRequest<'_>) -> Vec<RenderInput> {
        let mut inputs = Vec::with_capacity(1 + req.clips.len() + req.overlays.len());
        inputs.push(RenderInput {
            path: req.background.to_path_buf(),
            seek: Some(req.background_start),
        });
        inputs.extend(req.clips.iter().map(|clip| RenderInput {
            path: clip.path().to_path_buf(),
            seek: None,
        }));
        inputs.extend(req.overlays.iter().map(|overlay| RenderInput {
            path: overlay.image.clone(),
            seek: None,
        }));
        inputs
    }

    fn push_audio_concat(&self, graph: &mut FilterGraphSpec, clip_count: usize) -> Result<()> {
        let inputs = (0..clip_count).map(|i| Pad::audio(1 + i)).collect();
        graph.push(FilterNode::new(
            NodeKind::AudioConcat,
            inputs,
            format!("concat=n={clip_count}:v=0:a=1"),
            AUDIO_OUT_LABEL,
        ))
    }

    /// Fill the frame (crop-to-fill), then center-crop to the exact frame size.
    fn push_background(&self, graph: &mut FilterGraphSpec) -> Result<()> {
        let w = self.opts.frame.width;
        let h = self.opts.frame.height;
        graph.push(FilterNode::new(
            NodeKind::Background,
            vec![Pad::video(0)],
            format!(
                "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}:(in_w-{w})/2:(in_h-{h})/2"
            ),
            BACKGROUND_LABEL,
        ))
    }

    fn push_overlay(
        &self,
        graph: &mut FilterGraphSpec,
        base_label: &str,
        input_index: usize,
        idx: usize,
        overlay: &OverlayAsset,
        duration: f64,
    ) -> Result<String> {
        let scaled_label = format!("img{idx}");
        let overlay_label = format!("ov{idx}");
        let enable = enable_between(clamp_window(overlay.window, duration));

        graph.push(FilterNode::new(
            NodeKind::ImageScale,
            vec![Pad::video(input_index)],
            format!("scale={}:-1", self.opts.overlay_width),
            scaled_label.clone(),
        ))?;

        // Centered horizontally, a quarter of the way down.
        graph.push(FilterNode::new(
            NodeKind::Overlay,
            vec![Pad::label(base_label), Pad::label(scaled_label)],
            format!("overlay=(W-w)/2:(H-h)/4:enable='{enable}'"),
            overlay_label.clone(),
        ))?;

        let Some(headline) = overlay
            .headline
            .as_deref()
            .filter(|h| self.opts.show_headlines && !h.trim().is_empty())
        else {
            return Ok(overlay_label);
        };

        let headline_label = format!("hl{idx}");
        graph.push(FilterNode::new(
            NodeKind::Headline,
            vec![Pad::label(overlay_label)],
            format!(
                "drawtext=expansion=none:text={text}:fontcolor=white:fontsize={HEADLINE_FONT_SIZE}:\
                 box=1:boxcolor=black@0.6:boxborderw=16:x=(w-text_w)/2:y=h*0.62:enable='{enable}'",
                text = quote_filter_arg(&escape_filter_text(headline.trim())),
            ),
            headline_label.clone(),
        ))?;

        Ok(headline_label)
    }

    fn push_subtitles(
        &self,
        graph: &mut FilterGraphSpec,
        base_label: &str,
        captions: &Path,
    ) -> Result<()> {
        let path = quote_filter_arg(&escape_filter_path(captions)?);
        let style = quote_filter_arg(&self.opts.caption_style.force_style());
        graph.push(FilterNode::new(
            NodeKind::Subtitles,
            vec![Pad::label(base_label)],
            format!("subtitles={path}:force_style={style}"),
            VIDEO_OUT_LABEL,
        ))
    }

    fn build_args(
        &self,
        inputs: &[RenderInput],
        directive: &str,
        duration: f64,
        output: &Path,
    ) -> Vec<String> {
        let mut args = vec!["-y".to_owned()];

        for input in inputs {
            if let Some(seek) = input.seek {
                args.push("-ss".to_owned());
                args.push(seek.to_string());
            }
            args.push("-i".to_owned());
            args.push(input.path.to_string_lossy().into_owned());
        }

        args.push("-filter_complex".to_owned());
        args.push(directive.to_owned());

        args.push("-map".to_owned());
        args.push(format!("[{VIDEO_OUT_LABEL}]"));
        args.push("-map".to_owned());
        args.push(format!("[{AUDIO_OUT_LABEL}]"));

        // Output length follows the narration, never the footage.
        args.push("-t".to_owned());
        args.push(format_time(duration));

        args.push("-c:v".to_owned());
        args.push(self.opts.video_codec.clone());
        args.push("-c:a".to_owned());
        args.push(self.opts.audio_codec.clone());
        args.push("-b:a".to_owned());
        args.push(self.opts.audio_bitrate.clone());

        args.push(output.to_string_lossy().into_owned());
        args
    }
}

/// Seconds with millisecond precision, as used in `-t` and `between()`.
pub fn format_time(seconds: f64) -> String {
    format!("{seconds:.3}")
}

fn clamp_window(window: TimelineWindow, duration: f64) -> TimelineWindow {
    let start = window.start.clamp(0.0, duration);
    let end = window.end.clamp(start, duration);
    TimelineWindow::new(start, end)
}

fn enable_between(window: TimelineWindow) -> String {
    format!(
        "between(t,{},{})",
        format_time(window.start),
        format_time(window.end)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::split_filter_token;

    fn clips(durations: &[f64]) -> (Vec<AudioClip>, Timeline) {
        let clips = durations
            .iter()
            .enumerate()
            .map(|(i, d)| AudioClip::with_duration(format!("/work/voiceover_{i}.mp3"), *d))
            .collect();
        (clips, Timeline::from_durations(durations.iter().copied()))
    }

    fn compile(
        opts: RenderOpts,
        clips: &[AudioClip],
        timeline: &Timeline,
        overlays: &[OverlayAsset],
    ) -> Result<RenderPlan> {
        compile_with_captions(opts, clips, timeline, overlays, Path::new("/work/subtitles.srt"))
    }

    fn compile_with_captions(
        opts: RenderOpts,
        clips: &[AudioClip],
        timeline: &Timeline,
        overlays: &[OverlayAsset],
        captions: &Path,
    ) -> Result<RenderPlan> {
        FilterGraphCompiler::new(opts).compile(&RenderRequest {
            clips,
            timeline,
            overlays,
            background: Path::new("/stock/bg.mp4"),
            background_start: 12,
            captions,
            output: Path::new("/out/reel.mp4"),
        })
    }

    /// Option values of one filter as ffmpeg sees them after both unescaping passes.
    fn option_values(filter: &str) -> Vec<String> {
        let (_, args) = filter.split_once('=').unwrap_or((filter, ""));
        let (graph_level, rest) = split_filter_token(args, "[],;");
        assert!(rest.is_empty(), "filter split early at {rest}");

        let mut values = Vec::new();
        let mut remaining = graph_level;
        loop {
            let (value, rest) = split_filter_token(&remaining, ":");
            values.push(value);
            match rest.strip_prefix(':') {
                Some(next) => remaining = next.to_owned(),
                None => return values,
            }
        }
    }

    #[test]
    fn inputs_are_ordered_background_clips_images() -> anyhow::Result<()> {
        let (clips, timeline) = clips(&[3.0, 2.5]);
        let overlays = OverlayAsset::bind_by_index(
            &[PathBuf::from("/work/a.jpg"), PathBuf::from("/work/b.jpg")],
            &timeline,
        );

        let plan = compile(RenderOpts::default(), &clips, &timeline, &overlays)?;

        let paths: Vec<&str> = plan
            .inputs
            .iter()
            .map(|i| i.path.to_str().unwrap_or_default())
            .collect();
        assert_eq!(
            paths,
            vec![
                "/stock/bg.mp4",
                "/work/voiceover_0.mp3",
                "/work/voiceover_1.mp3",
                "/work/a.jpg",
                "/work/b.jpg"
            ]
        );
        assert_eq!(plan.inputs[0].seek, Some(12));
        assert!(plan.directive.contains("[3:v]scale=1000:-1[img0]"));
        assert!(plan.directive.contains("[4:v]scale=1000:-1[img1]"));

        let windows: Vec<(f64, f64)> =
            overlays.iter().map(|o| (o.window.start, o.window.end)).collect();
        assert_eq!(windows, vec![(0.0, 3.0), (3.0, 5.5)]);
        assert!(plan.directive.contains("enable='between(t,0.000,3.000)'[ov0]"));
        assert!(plan.directive.contains("enable='between(t,3.000,5.500)'[ov1]"));
        assert!(plan.args.windows(2).any(|w| w[0] == "-t" && w[1] == "5.500"));
        Ok(())
    }

    #[test]
    fn directive_matches_expected_layout() -> anyhow::Result<()> {
        let (clips, timeline) = clips(&[3.0, 2.5]);
        let overlays = vec![OverlayAsset::new("/work/a.jpg", timeline.windows()[0])];

        let plan = compile(RenderOpts::default(), &clips, &timeline, &overlays)?;
        assert_eq!(
            plan.directive,
            "[0:v]scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920:(in_w-1080)/2:(in_h-1920)/2[bg];\
             [1:a][2:a]concat=n=2:v=0:a=1[audio_out];\
             [3:v]scale=1000:-1[img0];\
             [bg][img0]overlay=(W-w)/2:(H-h)/4:enable='between(t,0.000,3.000)'[ov0];\
             [ov0]subtitles='/work/subtitles.srt':force_style='FontName=Arial,FontSize=16,PrimaryColour=&HFFFFFF&,OutlineColour=&H000000&,Outline=2,Shadow=2,MarginV=40'[v]"
        );
        Ok(())
    }

    #[test]
    fn args_map_outputs_and_clamp_duration() -> anyhow::Result<()> {
        let (clips, timeline) = clips(&[3.0, 2.5]);
        let plan = compile(RenderOpts::default(), &clips, &timeline, &[])?;

        let args = plan.args.join(" ");
        assert!(args.starts_with("-y -ss 12 -i /stock/bg.mp4 -i /work/voiceover_0.mp3"));
        assert!(args.contains("-map [v] -map [audio_out] -t 5.500"));
        assert!(args.ends_with("-c:v libx264 -c:a aac -b:a 192k /out/reel.mp4"));
        assert_eq!(plan.duration, 5.5);
        Ok(())
    }

    #[test]
    fn overlay_windows_are_clamped_to_voice_length() -> anyhow::Result<()> {
        let (clips, timeline) = clips(&[2.0]);
        let overlays = vec![OverlayAsset::new("/work/a.jpg", TimelineWindow::new(1.0, 9.0))];

        let plan = compile(RenderOpts::default(), &clips, &timeline, &overlays)?;
        assert!(plan.directive.contains("enable='between(t,1.000,2.000)'"));
        Ok(())
    }

    #[test]
    fn extra_images_get_an_empty_window() {
        let timeline = Timeline::from_durations([4.0]);
        let overlays = OverlayAsset::bind_by_index(
            &[PathBuf::from("a.jpg"), PathBuf::from("b.jpg")],
            &timeline,
        );
        assert_eq!(overlays[0].window, TimelineWindow::new(0.0, 4.0));
        assert_eq!(overlays[1].window, TimelineWindow::new(0.0, 0.0));
    }

    #[test]
    fn headlines_are_escaped_and_gated() -> anyhow::Result<()> {
        let (clips, timeline) = clips(&[3.0]);
        let overlays = vec![
            OverlayAsset::new("/work/a.jpg", timeline.windows()[0]).with_headline("It's here: M5"),
        ];
        let opts = RenderOpts {
            show_headlines: true,
            ..RenderOpts::default()
        };

        let plan = compile(opts, &clips, &timeline, &overlays)?;
        assert_eq!(plan.graph.nodes_of(NodeKind::Headline).count(), 1);
        assert!(
            plan.directive
                .contains(r"[ov0]drawtext=expansion=none:text='It\'\''s here - M5'")
        );
        assert!(plan.directive.contains("[hl0]subtitles="));
        Ok(())
    }

    #[test]
    fn apostrophes_reach_ffmpeg_intact() -> anyhow::Result<()> {
        let (clips, timeline) = clips(&[3.0]);
        let overlays = vec![
            OverlayAsset::new("/work/a.jpg", timeline.windows()[0])
                .with_headline("Apple's new chip, at last"),
        ];
        let opts = RenderOpts {
            show_headlines: true,
            ..RenderOpts::default()
        };

        let plan = compile_with_captions(
            opts,
            &clips,
            &timeline,
            &overlays,
            Path::new("/work/O'Brien/subtitles.srt"),
        )?;

        let headline = plan
            .graph
            .nodes_of(NodeKind::Headline)
            .next()
            .map(|n| n.filter.clone())
            .unwrap_or_default();
        let values = option_values(&headline);
        assert!(values.contains(&"text=Apple's new chip, at last".to_owned()));
        assert!(values.contains(&"enable=between(t,0.000,3.000)".to_owned()));

        let subtitles = plan
            .graph
            .nodes_of(NodeKind::Subtitles)
            .next()
            .map(|n| n.filter.clone())
            .unwrap_or_default();
        let values = option_values(&subtitles);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], "/work/O'Brien/subtitles.srt");
        assert!(values[1].starts_with("force_style=FontName=Arial,"));
        Ok(())
    }

    #[test]
    fn headlines_are_skipped_when_disabled() -> anyhow::Result<()> {
        let (clips, timeline) = clips(&[3.0]);
        let overlays =
            vec![OverlayAsset::new("/work/a.jpg", timeline.windows()[0]).with_headline("Title")];

        let plan = compile(RenderOpts::default(), &clips, &timeline, &overlays)?;
        assert_eq!(plan.graph.nodes_of(NodeKind::Headline).count(), 0);
        assert!(plan.directive.contains("[ov0]subtitles="));
        Ok(())
    }

    #[test]
    fn zero_clips_is_rejected() {
        let timeline = Timeline::default();
        let err = compile(RenderOpts::default(), &[], &timeline, &[]).unwrap_err();
        assert!(err.to_string().contains("without voiceover clips"));
    }

    #[test]
    fn mismatched_timeline_is_rejected() {
        let (clips, _) = clips(&[1.0, 2.0]);
        let timeline = Timeline::from_durations([1.0]);
        let err = compile(RenderOpts::default(), &clips, &timeline, &[]).unwrap_err();
        assert!(err.to_string().contains("1 windows for 2 clips"));
    }

    #[test]
    fn custom_frame_size_flows_into_background() -> anyhow::Result<()> {
        let (clips, timeline) = clips(&[1.0]);
        let opts = RenderOpts {
            frame: crate::opts::FrameSize::new(720, 1280),
            ..RenderOpts::default()
        };
        let plan = compile(opts, &clips, &timeline, &[])?;
        assert!(plan.directive.contains(
            "scale=720:1280:force_original_aspect_ratio=increase,crop=720:1280:(in_w-720)/2:(in_h-1280)/2[bg]"
        ));
        Ok(())
    }
}
