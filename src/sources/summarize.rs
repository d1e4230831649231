//! Abstractive summaries from a hosted `facebook/bart-large-cnn` inference endpoint.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Summarizer;
use super::http::{DEFAULT_TIMEOUT, build_client, success_or_body};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub token: String,
    pub endpoint: String,
    pub max_length: u32,
    pub min_length: u32,
    /// Input is cut to this many characters; the model's context is limited.
    pub max_input_chars: usize,
    pub timeout: Duration,
}

impl SummarizerConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoint: "https://api-inference.huggingface.co/models/facebook/bart-large-cnn"
                .to_owned(),
            max_length: 120,
            min_length: 35,
            max_input_chars: 1024,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct HfSummarizer {
    config: SummarizerConfig,
    client: Client,
}

impl HfSummarizer {
    pub fn new(config: SummarizerConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }
}

impl Summarizer for HfSummarizer {
    fn summarize(&self, text: &str) -> Result<String> {
        let request = build_request(&self.config, text);
        debug!(chars = request.inputs.chars().count(), "requesting summary");

        let resp = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.token)
            .json(&request)
            .send()
            .map_err(|e| Error::SummarizationFailed(e.to_string()))?;

        let resp = success_or_body(resp).map_err(|(status, body)| {
            Error::SummarizationFailed(format!("status {status}: {body}"))
        })?;
        let body = resp
            .text()
            .map_err(|e| Error::SummarizationFailed(e.to_string()))?;

        parse_summary(&body)
    }
}

#[derive(Debug, Serialize)]
struct SummaryRequest<'a> {
    inputs: &'a str,
    parameters: SummaryParameters,
    options: SummaryOptions,
}

#[derive(Debug, Serialize)]
struct SummaryParameters {
    max_length: u32,
    min_length: u32,
    do_sample: bool,
}

#[derive(Debug, Serialize)]
struct SummaryOptions {
    wait_for_model: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SummaryResponse {
    Summaries(Vec<SummaryText>),
    Error { error: String },
}

#[derive(Debug, Deserialize)]
struct SummaryText {
    summary_text: String,
}

fn build_request<'a>(config: &SummarizerConfig, text: &'a str) -> SummaryRequest<'a> {
    SummaryRequest {
        inputs: truncate_chars(text.trim(), config.max_input_chars),
        parameters: SummaryParameters {
            max_length: config.max_length,
            min_length: config.min_length,
            do_sample: false,
        },
        options: SummaryOptions {
            wait_for_model: true,
        },
    }
}

fn parse_summary(body: &str) -> Result<String> {
    let parsed: SummaryResponse = serde_json::from_str(body)
        .map_err(|e| Error::SummarizationFailed(format!("unexpected response: {e}")))?;

    match parsed {
        SummaryResponse::Error { error } => Err(Error::SummarizationFailed(error)),
        SummaryResponse::Summaries(items) => items
            .into_iter()
            .map(|s| s.summary_text.trim().to_owned())
            .find(|s| !s.is_empty())
            .ok_or_else(|| Error::SummarizationFailed("empty summary".to_owned())),
    }
}

/// The first `max_chars` characters of `text`, never splitting a character.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
