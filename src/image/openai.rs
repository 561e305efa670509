//! OpenAI-compatible image generation (`/v1/images/generations`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::ImageConfig;
use crate::core::errors::{ImageGenerationError, ImageGenerationResult};
use crate::image::{ImageBackend, ImageRef};

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    url: Option<String>,
    b64_json: Option<String>,
}

/// Image backend speaking the OpenAI images API.
pub struct OpenAiImageBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    size: String,
}

impl OpenAiImageBackend {
    /// Create a backend from the image settings.
    ///
    /// # Errors
    /// Returns an error if no API key is configured or the HTTP client
    /// cannot be built.
    pub fn new(config: &ImageConfig) -> ImageGenerationResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ImageGenerationError::MissingApiKey)?;
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            size: config.size.clone(),
        })
    }
}

#[async_trait]
impl ImageBackend for OpenAiImageBackend {
    async fn generate(&self, prompt: &str) -> ImageGenerationResult<ImageRef> {
        let request = GenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: &self.size,
        };

        let url = format!("{}/v1/images/generations", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageGenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerationResponse = response.json().await?;
        let image = parsed
            .data
            .into_iter()
            .next()
            .ok_or(ImageGenerationError::MissingImage)?;

        match (image.url, image.b64_json) {
            (Some(url), _) => Ok(ImageRef::Url { url }),
            (None, Some(data)) => Ok(ImageRef::Inline {
                media_type: "image/png".to_string(),
                data,
            }),
            (None, None) => Err(ImageGenerationError::MissingImage),
        }
    }
}
