//! Narration: text-to-speech backends and artifact naming.

pub mod client;
pub mod command;
pub mod http;
pub mod naming;

pub use client::AudioSynthesisClient;
pub use command::CommandSpeechBackend;
pub use http::HttpSpeechBackend;
pub use naming::ArtifactNamer;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::AudioSynthesisResult;

/// A written audio artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    /// Location on disk.
    pub path: PathBuf,
    /// File name, unique within the artifact directory.
    pub file_name: String,
}

/// A text-to-speech backend writing its output to a given path.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Synthesize `text` into `output`.
    ///
    /// # Errors
    /// Returns an error if synthesis or writing fails.
    async fn synthesize(&self, text: &str, output: &Path) -> AudioSynthesisResult<()>;
}
