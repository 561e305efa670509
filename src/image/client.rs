//! Image generation client: validation, timeout and caching around a backend.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::config::ImageConfig;
use crate::core::errors::{ImageGenerationError, ImageGenerationResult};
use crate::image::{ImageBackend, ImageCache, ImageRef};

/// Turns a seed prompt into an image reference.
pub struct ImageGenerationClient {
    backend: Arc<dyn ImageBackend>,
    cache: Option<ImageCache>,
    timeout: Duration,
}

impl ImageGenerationClient {
    /// Create a client; caching follows `config.cache_enabled`.
    #[must_use]
    pub fn new(backend: Arc<dyn ImageBackend>, config: &ImageConfig) -> Self {
        Self {
            backend,
            cache: ImageCache::from_config(config),
            timeout: config.timeout,
        }
    }

    /// Generate (or reuse) an image for `prompt`.
    ///
    /// # Errors
    /// Returns an error if the prompt is blank, the backend fails, or it does
    /// not answer within the configured timeout.
    pub async fn generate_image(&self, prompt: &str) -> ImageGenerationResult<ImageRef> {
        if prompt.trim().is_empty() {
            return Err(ImageGenerationError::EmptyPrompt);
        }

        if let Some(image) = self.cache.as_ref().and_then(|cache| cache.get(prompt)) {
            debug!("Image cache hit for prompt");
            return Ok(image);
        }

        let image = tokio::time::timeout(self.timeout, self.backend.generate(prompt))
            .await
            .map_err(|_| ImageGenerationError::Timeout)??;

        if let Some(cache) = &self.cache {
            cache.insert(prompt, image.clone());
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct CountingBackend {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl ImageBackend for CountingBackend {
        async fn generate(&self, prompt: &str) -> ImageGenerationResult<ImageRef> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(ImageRef::Url {
                url: format!("https://img.example/{n}/{}", prompt.len()),
            })
        }
    }

    fn backend(delay: Duration) -> Arc<CountingBackend> {
        Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    #[tokio::test]
    async fn test_repeated_prompt_uses_cache() {
        let backend = backend(Duration::ZERO);
        let client = ImageGenerationClient::new(backend.clone(), &ImageConfig::default());

        let first = client.generate_image("a dragon").await.ok();
        let second = client.generate_image("a dragon").await.ok();

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_without_cache_every_call_hits_backend() {
        let backend = backend(Duration::ZERO);
        let config = ImageConfig {
            cache_enabled: false,
            ..ImageConfig::default()
        };
        let client = ImageGenerationClient::new(backend.clone(), &config);

        let _ = client.generate_image("a dragon").await;
        let _ = client.generate_image("a dragon").await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected() {
        let client = ImageGenerationClient::new(backend(Duration::ZERO), &ImageConfig::default());
        let result = client.generate_image(" ").await;
        assert!(matches!(result, Err(ImageGenerationError::EmptyPrompt)));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let config = ImageConfig {
            timeout: Duration::from_millis(20),
            ..ImageConfig::default()
        };
        let client = ImageGenerationClient::new(backend(Duration::from_secs(5)), &config);

        let result = client.generate_image("a dragon").await;
        assert!(matches!(result, Err(ImageGenerationError::Timeout)));
    }
}
