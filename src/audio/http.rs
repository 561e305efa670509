//! OpenAI-compatible speech endpoint (`/v1/audio/speech`).

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::audio::SpeechBackend;
use crate::core::config::AudioConfig;
use crate::core::errors::{AudioSynthesisError, AudioSynthesisResult};

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Speech backend streaming the synthesized audio straight to disk.
pub struct HttpSpeechBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    response_format: String,
}

impl HttpSpeechBackend {
    /// Create a backend from the audio settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AudioConfig) -> AudioSynthesisResult<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            response_format: config.response_format.clone(),
        })
    }
}

#[async_trait]
impl SpeechBackend for HttpSpeechBackend {
    async fn synthesize(&self, text: &str, output: &Path) -> AudioSynthesisResult<()> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: &self.response_format,
        };

        let url = format!("{}/v1/audio/speech", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AudioSynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut file = File::create(output).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
