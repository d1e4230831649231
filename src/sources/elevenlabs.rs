//! Text-to-speech through the ElevenLabs API.

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::info;

use super::SpeechSynthesizer;
use super::download::write_atomically;
use super::http::{DEFAULT_TIMEOUT, build_client, success_or_body};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            voice_id: "TX3LPaxmHKxFdv7VOQHJ".to_owned(),
            model_id: "eleven_flash_v2_5".to_owned(),
            base_url: "https://api.elevenlabs.io".to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn speech_url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        )
    }
}

pub struct ElevenLabsSynthesizer {
    config: ElevenLabsConfig,
    client: Client,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: ElevenLabsConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn synthesize(&self, text: &str, dest: &Path) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::SynthesisFailed("no text to speak".to_owned()));
        }

        let resp = self
            .client
            .post(self.config.speech_url())
            .header("xi-api-key", &self.config.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&SpeechRequest {
                text,
                model_id: &self.config.model_id,
            })
            .send()
            .map_err(|e| Error::SynthesisFailed(e.to_string()))?;

        let resp = success_or_body(resp)
            .map_err(|(status, body)| Error::SynthesisFailed(format!("status {status}: {body}")))?;

        let bytes = write_atomically(resp, dest)?;
        if bytes == 0 {
            let _ = std::fs::remove_file(dest);
            return Err(Error::SynthesisFailed("empty audio response".to_owned()));
        }

        info!(path = %dest.display(), bytes, "synthesized voiceover");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speech_url_includes_voice() {
        let mut config = ElevenLabsConfig::new("key");
        config.base_url = "http://localhost:9000/".to_owned();
        assert_eq!(
            config.speech_url(),
            "http://localhost:9000/v1/text-to-speech/TX3LPaxmHKxFdv7VOQHJ"
        );
    }

    #[test]
    fn request_body_names_the_model() -> anyhow::Result<()> {
        let body = serde_json::to_value(SpeechRequest {
            text: "Hello",
            model_id: "eleven_flash_v2_5",
        })?;
        assert_eq!(
            body,
            serde_json::json!({"text": "Hello", "model_id": "eleven_flash_v2_5"})
        );
        Ok(())
    }
}
