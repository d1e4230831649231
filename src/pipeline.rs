//! The end-to-end reel run: news items in, one rendered video out.
//!
//! Items are processed strictly one after another. Each item is summarized, voiced,
//! transcribed against the running voice length and captioned; a failure in any of those steps
//! skips the item. Once every item has been handled the outro is appended, the per-clip
//! captions are merged, the timeline is planned and the reel is compiled and rendered once.

use std::fs;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::captions::{CaptionCue, CaptionTrack};
use crate::compiler::{FilterGraphCompiler, OverlayAsset, RenderRequest};
use crate::opts::Opts;
use crate::probe::{MediaProbe, duration_or_zero};
use crate::render::Renderer;
use crate::sources::{
    Article, ImageFetcher, NewsSource, SpeechSynthesizer, Summarizer, image_extension,
};
use crate::timeline::{AudioClip, Timeline, TimelineWindow, pick_background_start};
use crate::timing::cues_from_transcript;
use crate::transcriber::Transcriber;
use crate::{Error, Result};

const SUBTITLES_FILE: &str = "subtitles.srt";
const OUTRO_VOICE_FILE: &str = "outro.mp3";
const OUTRO_CAPTIONS_FILE: &str = "captions_outro.srt";

/// Everything the pipeline talks to. Borrowed for the duration of a run.
pub struct Collaborators<'a> {
    pub news: &'a dyn NewsSource,
    pub summarizer: &'a dyn Summarizer,
    pub synthesizer: &'a dyn SpeechSynthesizer,
    pub images: &'a dyn ImageFetcher,
    pub transcriber: &'a mut dyn Transcriber,
    pub probe: &'a dyn MediaProbe,
    pub renderer: &'a dyn Renderer,
}

/// What happened to one news item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Produced {
        index: usize,
        title: String,
        voiceover: PathBuf,
        captions: PathBuf,
        image: Option<PathBuf>,
        cues: usize,
        window: TimelineWindow,
    },
    Skipped {
        index: usize,
        title: String,
        reason: String,
    },
}

impl ItemOutcome {
    pub fn is_produced(&self) -> bool {
        matches!(self, ItemOutcome::Produced { .. })
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub items: Vec<ItemOutcome>,
    pub outro: Option<PathBuf>,
    pub subtitles: PathBuf,
    pub windows: Vec<TimelineWindow>,
    pub total_duration: f64,
    pub background_start: u64,
    pub output: PathBuf,
    pub directive: String,
}

impl RunReport {
    pub fn produced(&self) -> usize {
        self.items.iter().filter(|i| i.is_produced()).count()
    }
}

/// A clip that made it onto the timeline, in timeline order.
struct ProducedClip {
    item: Option<usize>,
    clip: AudioClip,
    captions: PathBuf,
    image: Option<PathBuf>,
    headline: Option<String>,
    cues: usize,
}

pub struct Pipeline<'a> {
    opts: Opts,
    with: Collaborators<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(opts: Opts, with: Collaborators<'a>) -> Self {
        Self { opts, with }
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Fetch up to `max_items` articles and produce the reel.
    pub fn run(&mut self) -> Result<RunReport> {
        let articles = self.with.news.fetch(self.opts.max_items)?;
        info!(articles = articles.len(), "fetched news items");
        self.run_articles(articles)
    }

    /// Produce the reel from already fetched articles.
    pub fn run_articles(&mut self, articles: Vec<Article>) -> Result<RunReport> {
        fs::create_dir_all(&self.opts.work_dir)?;

        let mut produced: Vec<ProducedClip> = Vec::new();
        let mut outcomes: Vec<Option<ItemOutcome>> = Vec::new();
        let mut voice_length = 0.0;

        for (idx, article) in articles.iter().take(self.opts.max_items).enumerate() {
            let _span = info_span!("item", idx).entered();

            match self.produce_item(idx, article, voice_length) {
                Ok(clip) => {
                    voice_length += clip.clip.duration(self.with.probe);
                    produced.push(clip);
                    outcomes.push(None);
                }
                Err(err) => {
                    warn!(title = %article.title, error = %err, "skipping news item");
                    outcomes.push(Some(ItemOutcome::Skipped {
                        index: idx,
                        title: article.title.clone(),
                        reason: err.to_string(),
                    }));
                }
            }
        }

        if produced.is_empty() {
            return Err(Error::msg(
                "no news item could be narrated; nothing to render",
            ));
        }

        let outro = match self.produce_outro(voice_length) {
            Ok(outro) => outro,
            Err(err) => {
                warn!(error = %err, "outro unavailable; rendering without it");
                None
            }
        };
        let outro_path = outro.as_ref().map(|o| o.clip.path().to_path_buf());
        produced.extend(outro);

        let subtitles = self.opts.work_dir.join(SUBTITLES_FILE);
        let caption_files: Vec<&Path> = produced.iter().map(|p| p.captions.as_path()).collect();
        let track = CaptionTrack::concat_files(&caption_files)?;
        track.save(&subtitles)?;
        info!(cues = track.len(), path = %subtitles.display(), "merged captions");

        let clips: Vec<AudioClip> = produced.iter().map(|p| p.clip.clone()).collect();
        let timeline = Timeline::plan(&clips, self.with.probe);
        let total = timeline.total_voice_length();

        let background_duration = duration_or_zero(self.with.probe, &self.opts.background_video);
        let background_start = match self.opts.background_seed {
            Some(seed) => {
                pick_background_start(background_duration, total, &mut StdRng::seed_from_u64(seed))
            }
            None => pick_background_start(background_duration, total, &mut rand::thread_rng()),
        };
        info!(total, background_duration, background_start, "planned timeline");

        let overlays = overlays_for(&produced, &timeline);

        let compiler = FilterGraphCompiler::new(self.opts.render.clone());
        let plan = compiler.compile(&RenderRequest {
            clips: &clips,
            timeline: &timeline,
            overlays: &overlays,
            background: &self.opts.background_video,
            background_start,
            captions: &subtitles,
            output: &self.opts.output_path,
        })?;

        self.with.renderer.render(&plan)?;

        let items = fill_outcomes(outcomes, &produced, &articles, &timeline);

        Ok(RunReport {
            items,
            outro: outro_path,
            subtitles,
            windows: timeline.windows().to_vec(),
            total_duration: total,
            background_start,
            output: self.opts.output_path.clone(),
            directive: plan.directive,
        })
    }

    fn produce_item(&mut self, idx: usize, article: &Article, offset: f64) -> Result<ProducedClip> {
        let summary = self.with.summarizer.summarize(&article.content)?;
        info!(chars = summary.len(), "summarized");

        let voiceover = self.opts.work_dir.join(format!("voiceover_{idx}.mp3"));
        self.with.synthesizer.synthesize(&summary, &voiceover)?;

        let clip = AudioClip::new(&voiceover);
        let captions = self.opts.work_dir.join(format!("captions_{idx}.srt"));
        let cues = self.caption_clip(&clip, offset, &captions)?;

        let image = article
            .image_url
            .as_deref()
            .and_then(|url| self.fetch_image(idx, url));

        Ok(ProducedClip {
            item: Some(idx),
            clip,
            captions,
            image,
            headline: Some(article.title.clone()).filter(|t| !t.trim().is_empty()),
            cues,
        })
    }

    fn produce_outro(&mut self, offset: f64) -> Result<Option<ProducedClip>> {
        let Some(text) = self.opts.outro_text.clone().filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };
        let _span = info_span!("outro").entered();

        let voiceover = self.opts.work_dir.join(OUTRO_VOICE_FILE);
        if voiceover.is_file() {
            info!(path = %voiceover.display(), "reusing cached outro voiceover");
        } else {
            self.with.synthesizer.synthesize(&text, &voiceover)?;
        }

        let clip = AudioClip::new(&voiceover);
        let captions = self.opts.work_dir.join(OUTRO_CAPTIONS_FILE);
        let cues = self.caption_clip(&clip, offset, &captions)?;

        Ok(Some(ProducedClip {
            item: None,
            clip,
            captions,
            image: None,
            headline: None,
            cues,
        }))
    }

    /// Transcribe `clip`, shift its cues by `offset` and write them to `dest`.
    fn caption_clip(&mut self, clip: &AudioClip, offset: f64, dest: &Path) -> Result<usize> {
        let segments = self.with.transcriber.transcribe(clip.path())?;
        let transcribed = cues_from_transcript(&segments, offset);
        let transcribed_count = transcribed.len();

        let duration = clip.duration(self.with.probe);
        let cues = fit_cues(transcribed, TimelineWindow::new(offset, offset + duration));
        if cues.len() < transcribed_count {
            warn!(
                dropped = transcribed_count - cues.len(),
                duration,
                "captions fall outside the clip's window"
            );
        }

        let track = CaptionTrack::from_clips([cues]);
        track.save(dest)?;
        info!(cues = track.len(), offset, duration, "captioned clip");
        Ok(track.len())
    }

    fn fetch_image(&self, idx: usize, url: &str) -> Option<PathBuf> {
        let dest = self
            .opts
            .work_dir
            .join(format!("article_image_{idx}.{}", image_extension(url)));

        match self.with.images.fetch_image(url, &dest) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(url, error = %err, "image download failed; item will have no overlay");
                None
            }
        }
    }
}

/// Clamp cues into the clip's window on the master timeline and drop the ones left empty.
///
/// A clip whose duration could not be probed has a zero-length window, so all of its cues go.
fn fit_cues(cues: Vec<CaptionCue>, window: TimelineWindow) -> Vec<CaptionCue> {
    cues.into_iter()
        .filter_map(|mut cue| {
            cue.start = cue.start.clamp(window.start, window.end);
            cue.end = cue.end.clamp(cue.start, window.end);
            (cue.end > cue.start).then_some(cue)
        })
        .collect()
}

/// One overlay per produced item that has an image, shown during that item's own window.
fn overlays_for(produced: &[ProducedClip], timeline: &Timeline) -> Vec<OverlayAsset> {
    produced
        .iter()
        .enumerate()
        .filter_map(|(position, clip)| {
            let image = clip.image.as_ref()?;
            let window = timeline.window(position)?;
            let overlay = OverlayAsset::new(image, window);
            Some(match &clip.headline {
                Some(headline) => overlay.with_headline(headline),
                None => overlay,
            })
        })
        .collect()
}

fn fill_outcomes(
    outcomes: Vec<Option<ItemOutcome>>,
    produced: &[ProducedClip],
    articles: &[Article],
    timeline: &Timeline,
) -> Vec<ItemOutcome> {
    let mut positions = produced
        .iter()
        .enumerate()
        .filter_map(|(position, clip)| clip.item.map(|item| (item, position)));

    outcomes
        .into_iter()
        .enumerate()
        .filter_map(|(idx, outcome)| {
            if outcome.is_some() {
                return outcome;
            }
            let (item, position) = positions.next()?;
            let clip = &produced[position];
            Some(ItemOutcome::Produced {
                index: item,
                title: articles.get(idx).map(|a| a.title.clone()).unwrap_or_default(),
                voiceover: clip.clip.path().to_path_buf(),
                captions: clip.captions.clone(),
                image: clip.image.clone(),
                cues: clip.cues,
                window: timeline.window(position).unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cues_are_clamped_into_their_window() {
        let cues = vec![
            CaptionCue {
                index: 1,
                start: 2.9,
                end: 3.4,
                text: "early".to_owned(),
            },
            CaptionCue {
                index: 2,
                start: 5.0,
                end: 6.2,
                text: "late".to_owned(),
            },
        ];

        let cues = fit_cues(cues, TimelineWindow::new(3.0, 5.5));

        assert_eq!((cues[0].start, cues[0].end), (3.0, 3.4));
        assert_eq!((cues[1].start, cues[1].end), (5.0, 5.5));
    }

    #[test]
    fn zero_length_window_drops_every_cue() {
        let cues = vec![CaptionCue {
            index: 1,
            start: 3.2,
            end: 4.0,
            text: "Breaking news".to_owned(),
        }];

        assert!(fit_cues(cues, TimelineWindow::new(3.0, 3.0)).is_empty());
    }

    #[test]
    fn overlays_follow_their_own_clip() {
        let produced = vec![
            ProducedClip {
                item: Some(0),
                clip: AudioClip::with_duration("v0.mp3", 3.0),
                captions: PathBuf::from("c0.srt"),
                image: None,
                headline: None,
                cues: 1,
            },
            ProducedClip {
                item: Some(2),
                clip: AudioClip::with_duration("v2.mp3", 2.5),
                captions: PathBuf::from("c2.srt"),
                image: Some(PathBuf::from("article_image_2.png")),
                headline: Some("Headline".to_owned()),
                cues: 1,
            },
        ];
        let timeline = Timeline::from_durations([3.0, 2.5]);

        let overlays = overlays_for(&produced, &timeline);
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].image, PathBuf::from("article_image_2.png"));
        assert_eq!(overlays[0].window, TimelineWindow::new(3.0, 5.5));
        assert_eq!(overlays[0].headline.as_deref(), Some("Headline"));
    }
}
