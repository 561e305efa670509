//! Audio synthesis client: unique naming, timeout and cleanup.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::audio::{ArtifactNamer, AudioRef, SpeechBackend};
use crate::core::config::AudioConfig;
use crate::core::errors::{AudioSynthesisError, AudioSynthesisResult};

/// Turns story text into an audio file.
pub struct AudioSynthesisClient {
    backend: Arc<dyn SpeechBackend>,
    namer: ArtifactNamer,
    timeout: Duration,
}

impl AudioSynthesisClient {
    /// Create a client writing into `config.output_dir`.
    #[must_use]
    pub fn new(backend: Arc<dyn SpeechBackend>, config: &AudioConfig) -> Self {
        Self {
            backend,
            namer: ArtifactNamer::new(
                config.output_dir.clone(),
                config.file_prefix.clone(),
                config.file_extension(),
            ),
            timeout: config.timeout,
        }
    }

    /// Directory receiving the artifacts.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        self.namer.dir()
    }

    /// Synthesize `text` into a newly named file.
    ///
    /// A partially written file is removed on failure.
    ///
    /// # Errors
    /// Returns an error if the text is blank, the backend fails, or it does
    /// not finish within the configured timeout.
    pub async fn synthesize_audio(&self, text: &str) -> AudioSynthesisResult<AudioRef> {
        if text.trim().is_empty() {
            return Err(AudioSynthesisError::EmptyText);
        }

        tokio::fs::create_dir_all(self.namer.dir()).await?;
        let (path, file_name) = self.namer.next_path();
        debug!("Synthesizing {} chars into {}", text.len(), path.display());

        let outcome = tokio::time::timeout(self.timeout, self.backend.synthesize(text, &path))
            .await
            .unwrap_or(Err(AudioSynthesisError::Timeout));

        if let Err(err) = outcome {
            if tokio::fs::remove_file(&path).await.is_ok() {
                debug!("Removed incomplete artifact {}", path.display());
            }
            return Err(err);
        }

        info!("Wrote audio artifact {file_name}");
        Ok(AudioRef { path, file_name })
    }
}
