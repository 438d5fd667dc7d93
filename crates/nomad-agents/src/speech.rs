use std::time::Duration;

use async_trait::async_trait;
use nomad_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::openai::{map_transport_error, status_error};

/// Turns base64-encoded audio into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio_base64: &str, language: Option<&str>) -> Result<String>;
}

/// Turns text into WAV audio bytes.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        language: Option<&str>,
    ) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    audio_base64: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

/// JSON-over-HTTP client for the transcription and synthesis services.
#[derive(Clone)]
pub struct HttpSpeechClient {
    client: Client,
    stt_url: Option<String>,
    tts_url: Option<String>,
    api_key: Option<String>,
}

impl HttpSpeechClient {
    pub fn new(
        stt_url: Option<String>,
        tts_url: Option<String>,
        api_key: Option<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            stt_url,
            tts_url,
            api_key,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.stt_url.is_some() && self.tts_url.is_some()
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechClient {
    async fn transcribe(&self, audio_base64: &str, language: Option<&str>) -> Result<String> {
        let url = self
            .stt_url
            .as_deref()
            .ok_or_else(|| Error::Config("speech.stt_url is not configured".to_string()))?;

        let response = self
            .post(url)
            .json(&TranscribeRequest {
                audio_base64,
                language,
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }

        let parsed: TranscribeResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Agent(format!("failed to parse transcription: {e}")))?;
        let text = parsed.text.trim().to_string();
        debug!(chars = text.len(), "transcription received");
        if text.is_empty() {
            return Err(Error::Validation("no speech detected in audio".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl TextToSpeech for HttpSpeechClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        language: Option<&str>,
    ) -> Result<Vec<u8>> {
        let url = self
            .tts_url
            .as_deref()
            .ok_or_else(|| Error::Config("speech.tts_url is not configured".to_string()))?;

        let response = self
            .post(url)
            .json(&SynthesizeRequest {
                text,
                voice,
                language,
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let audio = response.bytes().await.map_err(map_transport_error)?;
        if audio.is_empty() {
            return Err(Error::Upstream {
                status: status.as_u16(),
                message: "speech service returned no audio".to_string(),
            });
        }
        debug!(bytes = audio.len(), "synthesized speech");
        Ok(audio.to_vec())
    }
}
