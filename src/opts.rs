use std::path::PathBuf;

/// Options that control a reel run.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI maps user input and environment into this type so other frontends (tests, batch
/// jobs) can construct a run programmatically.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Directory for intermediate files (voiceovers, images, per-clip captions).
    pub work_dir: PathBuf,

    /// Stock footage cropped into the background.
    pub background_video: PathBuf,

    /// Where the finished reel is written.
    pub output_path: PathBuf,

    /// Maximum number of news items narrated in one reel.
    pub max_items: usize,

    /// Text spoken after the last item. `None` disables the outro clip.
    pub outro_text: Option<String>,

    /// Seed for the background start offset. `None` draws from the thread RNG.
    pub background_seed: Option<u64>,

    pub render: RenderOpts,
}

impl Opts {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        background_video: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            background_video: background_video.into(),
            output_path: output_path.into(),
            max_items: 3,
            outro_text: Some(DEFAULT_OUTRO_TEXT.to_owned()),
            background_seed: None,
            render: RenderOpts::default(),
        }
    }
}

/// Spoken after the news items unless overridden.
pub const DEFAULT_OUTRO_TEXT: &str = "Follow for more tech news!";

/// Output frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    /// Portrait 1080x1920.
    fn default() -> Self {
        Self::new(1080, 1920)
    }
}

/// Styling applied to burned-in captions (an ASS `force_style` override).
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub font_name: String,
    pub font_size: u32,
    pub primary_colour: String,
    pub outline_colour: String,
    pub outline: u32,
    pub shadow: u32,
    pub margin_v: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_owned(),
            font_size: 16,
            primary_colour: "&HFFFFFF&".to_owned(),
            outline_colour: "&H000000&".to_owned(),
            outline: 2,
            shadow: 2,
            margin_v: 40,
        }
    }
}

impl CaptionStyle {
    /// The comma-separated `force_style` value.
    pub fn force_style(&self) -> String {
        format!(
            "FontName={},FontSize={},PrimaryColour={},OutlineColour={},Outline={},Shadow={},MarginV={}",
            self.font_name,
            self.font_size,
            self.primary_colour,
            self.outline_colour,
            self.outline,
            self.shadow,
            self.margin_v,
        )
    }
}

/// How the final reel is composed and encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOpts {
    pub frame: FrameSize,

    /// Width article images are scaled to; height follows the aspect ratio.
    pub overlay_width: u32,

    /// Draw each article's headline under its image.
    pub show_headlines: bool,

    pub caption_style: CaptionStyle,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for RenderOpts {
    fn default() -> Self {
        Self {
            frame: FrameSize::default(),
            overlay_width: 1000,
            show_headlines: false,
            caption_style: CaptionStyle::default(),
            video_codec: "libx264".to_owned(),
            audio_codec: "aac".to_owned(),
            audio_bitrate: "192k".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_caption_style_matches_reel_look() {
        assert_eq!(
            CaptionStyle::default().force_style(),
            "FontName=Arial,FontSize=16,PrimaryColour=&HFFFFFF&,OutlineColour=&H000000&,Outline=2,Shadow=2,MarginV=40"
        );
    }

    #[test]
    fn opts_default_to_three_items_and_outro() {
        let opts = Opts::new("work", "stock.mp4", "reel.mp4");
        assert_eq!(opts.max_items, 3);
        assert_eq!(opts.outro_text.as_deref(), Some(DEFAULT_OUTRO_TEXT));
        assert_eq!(opts.render.frame, FrameSize::new(1080, 1920));
    }
}
