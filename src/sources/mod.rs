//! External collaborators the pipeline pulls content from.
//!
//! Each collaborator is a trait so the pipeline can run against fakes in tests. HTTP
//! implementations live behind the `net` feature.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

pub mod download;

#[cfg(feature = "net")]
pub mod elevenlabs;
#[cfg(feature = "net")]
pub mod extract;
#[cfg(feature = "net")]
pub(crate) mod http;
#[cfg(feature = "net")]
pub mod newsapi;
#[cfg(feature = "net")]
pub mod summarize;

/// A news item ready to be narrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    /// Full body text, or the listing's description when the page could not be read.
    pub content: String,
    pub image_url: Option<String>,
    pub published_at: Option<String>,
    pub url: Option<String>,
}

impl Article {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            image_url: None,
            published_at: None,
            url: None,
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// Lists current news items, newest first, at most `max_items` of them.
pub trait NewsSource {
    fn fetch(&self, max_items: usize) -> Result<Vec<Article>>;
}

/// Condenses article text into a few narratable sentences.
pub trait Summarizer {
    fn summarize(&self, text: &str) -> Result<String>;
}

/// Speaks `text` into an audio file at `dest`.
pub trait SpeechSynthesizer {
    fn synthesize(&self, text: &str, dest: &Path) -> Result<()>;
}

/// Downloads an image to `dest`.
pub trait ImageFetcher {
    fn fetch_image(&self, url: &str, dest: &Path) -> Result<PathBuf>;
}

/// File extension for an image URL, taken from its path; `jpg` when there is none.
pub fn image_extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);

    match file.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extension_comes_from_the_url_path() {
        assert_eq!(image_extension("https://cdn.example.com/a/b/photo.png"), "png");
        assert_eq!(image_extension("https://cdn.example.com/photo.webp?w=1200&h=630"), "webp");
        assert_eq!(image_extension("https://cdn.example.com/photo.JPEG#top"), "JPEG");
    }

    #[test]
    fn image_extension_defaults_to_jpg() {
        assert_eq!(image_extension("https://cdn.example.com/image"), "jpg");
        assert_eq!(image_extension("https://cdn.example.com/.hidden"), "jpg");
        assert_eq!(image_extension("https://cdn.example.com/x.not-an-ext"), "jpg");
        assert_eq!(image_extension("https://cdn.example.com/resize?src=a.png"), "jpg");
    }
}
