//! `newsreel` builds short vertical news videos.
//!
//! This crate provides:
//! - Word-timed captions from speech-to-text output, merged into one SubRip track
//! - A cumulative timeline of voiceover clips and a random background offset
//! - An ffmpeg filter-graph model, its compiler and a renderer that runs ffmpeg
//! - A sequential pipeline that ties news, summaries, voiceovers and images together
//!
//! Network collaborators (news, summarization, speech, images, publishing) are behind the
//! `net` feature; the core stays usable offline with your own implementations of the traits
//! in [`sources`].

mod error;
pub use error::{Error, Result};

// Configuration.
pub mod opts;

// Captions: words in, SubRip out.
pub mod captions;
pub mod cue_encoder;
pub mod srt;
pub mod timing;
pub mod words;

// Timeline planning.
pub mod probe;
pub mod timeline;

// Filter graph and rendering.
pub mod compiler;
pub mod escape;
pub mod filter_graph;
pub mod render;

// Speech-to-text and audio decoding.
pub mod audio_pipeline;
pub mod backends;
pub mod decode;
pub mod decoder;
pub mod demux;
pub mod transcriber;

// External content and orchestration.
pub mod pipeline;
pub mod sources;

#[cfg(feature = "net")]
pub mod publish;

// Logging configuration.
#[cfg(feature = "logging")]
pub mod logging;

pub use captions::{CaptionCue, CaptionTrack};
pub use compiler::{FilterGraphCompiler, OverlayAsset, RenderPlan, RenderRequest};
pub use filter_graph::FilterGraphSpec;
pub use opts::{Opts, RenderOpts};
pub use pipeline::{Collaborators, ItemOutcome, Pipeline, RunReport};
pub use timeline::{AudioClip, Timeline, TimelineWindow};
pub use words::{TranscriptSegment, WordSpan};
