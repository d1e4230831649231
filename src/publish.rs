//! Posting a finished reel to TikTok via the Content Posting API (direct post).
//!
//! The flow is: initialize a post describing a single-chunk file upload, `PUT` the whole file
//! to the returned upload URL, then poll the publish status until it is terminal.

use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sources::http::{DEFAULT_TIMEOUT, build_client, success_or_body};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct TikTokConfig {
    pub access_token: String,
    pub api_base: String,
    pub privacy_level: String,
    pub disable_duet: bool,
    pub disable_comment: bool,
    pub disable_stitch: bool,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub timeout: Duration,
}

impl TikTokConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            api_base: "https://open.tiktokapis.com".to_owned(),
            privacy_level: "SELF_ONLY".to_owned(),
            disable_duet: false,
            disable_comment: false,
            disable_stitch: false,
            poll_interval: Duration::from_secs(5),
            max_polls: 24,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base.trim_end_matches('/'))
    }
}

/// Where a post ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub publish_id: String,
    pub status: String,
}

pub struct TikTokPublisher {
    config: TikTokConfig,
    client: Client,
}

impl TikTokPublisher {
    pub fn new(config: TikTokConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    pub fn publish(&self, video: &Path, title: &str) -> Result<PublishReceipt> {
        let bytes = std::fs::read(video)?;
        if bytes.is_empty() {
            return Err(Error::PublishFailed(format!("{} is empty", video.display())));
        }
        let size = bytes.len() as u64;

        let init = self.init(title, size)?;
        info!(publish_id = %init.publish_id, size, "initialized post");

        self.upload(&init.upload_url, bytes)?;
        info!(publish_id = %init.publish_id, "uploaded video");

        let status = self.wait_for_status(&init.publish_id)?;
        Ok(PublishReceipt {
            publish_id: init.publish_id,
            status,
        })
    }

    fn init(&self, title: &str, size: u64) -> Result<InitData> {
        let body = init_request(&self.config, title, size);
        let resp = self
            .client
            .post(self.config.url("/v2/post/publish/video/init/"))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .map_err(publish_err)?;
        let resp = success_or_body(resp).map_err(|(status, body)| {
            Error::PublishFailed(format!("init failed with status {status}: {body}"))
        })?;
        let text = resp.text().map_err(publish_err)?;
        parse_init(&text)
    }

    fn upload(&self, upload_url: &str, bytes: Vec<u8>) -> Result<()> {
        let size = bytes.len() as u64;
        let resp = self
            .client
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .header(reqwest::header::CONTENT_RANGE, content_range(size))
            .body(bytes)
            .send()
            .map_err(publish_err)?;
        success_or_body(resp).map_err(|(status, body)| {
            Error::PublishFailed(format!("upload failed with status {status}: {body}"))
        })?;
        Ok(())
    }

    fn wait_for_status(&self, publish_id: &str) -> Result<String> {
        for attempt in 1..=self.config.max_polls {
            let status = self.fetch_status(publish_id)?;
            debug!(publish_id, attempt, status = %status.status, "publish status");

            match classify_status(&status.status) {
                PollState::Done => return Ok(status.status),
                PollState::Failed => {
                    return Err(Error::PublishFailed(format!(
                        "post {publish_id} failed: {}",
                        status.fail_reason.unwrap_or(status.status)
                    )));
                }
                PollState::Pending => thread::sleep(self.config.poll_interval),
            }
        }

        Err(Error::PublishFailed(format!(
            "post {publish_id} still processing after {} status checks",
            self.config.max_polls
        )))
    }

    fn fetch_status(&self, publish_id: &str) -> Result<StatusData> {
        let resp = self
            .client
            .post(self.config.url("/v2/post/publish/status/fetch/"))
            .bearer_auth(&self.config.access_token)
            .json(&serde_json::json!({ "publish_id": publish_id }))
            .send()
            .map_err(publish_err)?;
        let resp = success_or_body(resp).map_err(|(status, body)| {
            Error::PublishFailed(format!("status check failed with status {status}: {body}"))
        })?;
        let text = resp.text().map_err(publish_err)?;
        let parsed: Envelope<StatusData> = serde_json::from_str(&text)
            .map_err(|e| Error::PublishFailed(format!("unexpected status response: {e}")))?;
        parsed.into_data()
    }
}

fn publish_err(err: reqwest::Error) -> Error {
    Error::PublishFailed(err.to_string())
}

#[derive(Debug, Serialize)]
struct InitRequest<'a> {
    post_info: PostInfo<'a>,
    source_info: SourceInfo,
}

#[derive(Debug, Serialize)]
struct PostInfo<'a> {
    title: &'a str,
    privacy_level: &'a str,
    disable_duet: bool,
    disable_comment: bool,
    disable_stitch: bool,
}

#[derive(Debug, Serialize)]
struct SourceInfo {
    source: &'static str,
    video_size: u64,
    chunk_size: u64,
    total_chunk_count: u32,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InitData {
    publish_id: String,
    upload_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatusData {
    status: String,
    fail_reason: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T> {
        if let Some(err) = self.error.filter(|e| e.code != "ok") {
            return Err(Error::PublishFailed(format!("{}: {}", err.code, err.message)));
        }
        self.data
            .ok_or_else(|| Error::PublishFailed("response carried no data".to_owned()))
    }
}

fn init_request<'a>(config: &'a TikTokConfig, title: &'a str, size: u64) -> InitRequest<'a> {
    InitRequest {
        post_info: PostInfo {
            title,
            privacy_level: &config.privacy_level,
            disable_duet: config.disable_duet,
            disable_comment: config.disable_comment,
            disable_stitch: config.disable_stitch,
        },
        source_info: SourceInfo {
            source: "FILE_UPLOAD",
            video_size: size,
            chunk_size: size,
            total_chunk_count: 1,
        },
    }
}

fn parse_init(body: &str) -> Result<InitData> {
    let parsed: Envelope<InitData> = serde_json::from_str(body)
        .map_err(|e| Error::PublishFailed(format!("unexpected init response: {e}")))?;
    let data = parsed.into_data()?;
    if data.publish_id.is_empty() || data.upload_url.is_empty() {
        return Err(Error::PublishFailed(format!(
            "init response lacks a publish id or upload url: {body}"
        )));
    }
    Ok(data)
}

/// `Content-Range` for a single chunk holding the whole file.
fn content_range(size: u64) -> String {
    format!("bytes 0-{}/{size}", size.saturating_sub(1))
}

#[derive(Debug, PartialEq, Eq)]
enum PollState {
    Pending,
    Done,
    Failed,
}

fn classify_status(status: &str) -> PollState {
    match status {
        "PUBLISH_COMPLETE" | "SEND_TO_USER_INBOX" | "SUCCESS" => PollState::Done,
        "FAILED" => PollState::Failed,
        _ => PollState::Pending,
    }
}
