//! Top headlines from newsapi.org, enriched with the full article text.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::extract::{ExtractedArticle, extract_article};
use super::http::{DEFAULT_TIMEOUT, build_client, success_or_body};
use super::{Article, NewsSource};
use crate::{Error, Result};

/// Articles shorter than this are not worth narrating.
pub const MIN_ARTICLE_CHARS: usize = 100;

/// Placeholder newsapi uses for withdrawn articles.
const REMOVED: &str = "[Removed]";

#[derive(Debug, Clone)]
pub struct NewsApiConfig {
    pub api_key: String,
    pub endpoint: String,
    pub category: String,
    pub language: String,
    pub timeout: Duration,
}

impl NewsApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: "https://newsapi.org/v2/top-headlines".to_owned(),
            category: "technology".to_owned(),
            language: "en".to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct NewsApiSource {
    config: NewsApiConfig,
    client: Client,
}

impl NewsApiSource {
    pub fn new(config: NewsApiConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn fetch_listing(&self) -> Result<Vec<ListedArticle>> {
        let resp = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("category", self.config.category.as_str()),
                ("language", self.config.language.as_str()),
                ("apiKey", self.config.api_key.as_str()),
            ])
            .send()?;

        let resp = success_or_body(resp).map_err(|(status, body)| {
            Error::fetch(&self.config.endpoint, format!("status {status}: {body}"))
        })?;
        let listing: Listing = resp.json()?;

        if listing.status.as_deref() == Some("error") {
            return Err(Error::fetch(
                &self.config.endpoint,
                listing.message.unwrap_or_else(|| "newsapi returned an error".to_owned()),
            ));
        }
        Ok(listing.articles)
    }

    fn fetch_page(&self, url: &str) -> Result<ExtractedArticle> {
        let html = self.client.get(url).send()?.error_for_status()?.text()?;
        extract_article(&html)
    }
}

impl NewsSource for NewsApiSource {
    fn fetch(&self, max_items: usize) -> Result<Vec<Article>> {
        let listed = usable_listings(self.fetch_listing()?);
        info!(candidates = listed.len(), "fetched headlines");

        let mut articles = Vec::new();
        for item in listed {
            if articles.len() >= max_items {
                break;
            }
            let Some(url) = item.url.as_deref() else {
                continue;
            };

            let page = match self.fetch_page(url) {
                Ok(page) => page,
                Err(err) => {
                    warn!(url, error = %err, "failed to fetch article; skipping");
                    continue;
                }
            };

            match build_article(&item, page) {
                Some(article) => articles.push(article),
                None => debug!(url, "article too short or without image; skipping"),
            }
        }

        Ok(articles)
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<ListedArticle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedArticle {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    published_at: Option<String>,
}

/// Drop withdrawn records and records without a link or date, newest first.
fn usable_listings(articles: Vec<ListedArticle>) -> Vec<ListedArticle> {
    let mut usable: Vec<ListedArticle> = articles
        .into_iter()
        .filter(|a| a.title.as_deref() != Some(REMOVED) && a.content.as_deref() != Some(REMOVED))
        .filter(|a| is_present(&a.url) && is_present(&a.published_at))
        .collect();

    // RFC 3339 timestamps in one zone order lexically.
    usable.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    usable
}

/// Combine a listing with its page. Requires an image and at least [`MIN_ARTICLE_CHARS`] of
/// text; the listing's description stands in when the page has no usable text.
fn build_article(item: &ListedArticle, page: ExtractedArticle) -> Option<Article> {
    let image_url = item.url_to_image.clone().filter(|u| !u.trim().is_empty())?;

    let content = if page.text.chars().count() >= MIN_ARTICLE_CHARS {
        page.text
    } else {
        item.description.clone().unwrap_or_default()
    };
    if content.chars().count() < MIN_ARTICLE_CHARS {
        return None;
    }

    let title = page
        .title
        .or_else(|| item.title.clone())
        .unwrap_or_default();

    Some(Article {
        title,
        content,
        image_url: Some(image_url),
        published_at: item.published_at.clone(),
        url: item.url.clone(),
    })
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
