//! Cover image generation.

pub mod cache;
pub mod client;
pub mod openai;

pub use cache::ImageCache;
pub use client::ImageGenerationClient;
pub use openai::OpenAiImageBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ImageGenerationResult;

/// Where a generated image can be found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    /// Hosted by the backend.
    Url {
        /// Image URL.
        url: String,
    },
    /// Returned inline, base64 encoded.
    Inline {
        /// MIME type, e.g. `image/png`.
        media_type: String,
        /// Base64 payload.
        data: String,
    },
}

impl ImageRef {
    /// A URL usable in an `<img src>`: the hosted URL or a `data:` URL.
    #[must_use]
    pub fn to_src(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Inline { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }
}

/// An image-synthesis backend.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Generate one image for `prompt`.
    ///
    /// # Errors
    /// Returns an error if the backend fails or returns no image.
    async fn generate(&self, prompt: &str) -> ImageGenerationResult<ImageRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_image_becomes_data_url() {
        let image = ImageRef::Inline {
            media_type: "image/png".to_string(),
            data: "AAAA".to_string(),
        };
        assert_eq!(image.to_src(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn image_ref_is_tagged() {
        let image = ImageRef::Url {
            url: "https://img.example/1.png".to_string(),
        };
        let json = serde_json::to_value(&image).unwrap_or_default();
        assert_eq!(json["kind"], "url");
        assert_eq!(json["url"], "https://img.example/1.png");
    }
}
