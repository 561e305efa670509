//! Story orchestration.
//!
//! One request moves `Idle -> Generating -> Success | Failed`. Text
//! generation is mandatory; the cover image (from the seed prompt) and the
//! narration (from the generated text) are best-effort and run concurrently
//! once the text is complete.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::audio::{
    AudioRef, AudioSynthesisClient, CommandSpeechBackend, HttpSpeechBackend, SpeechBackend,
};
use crate::conversation::ConversationStore;
use crate::core::config::{AudioConfig, AudioMode, ImageConfig, StoryConfig};
use crate::core::errors::OrchestratorResult;
use crate::core::ids::{RequestId, SessionId};
use crate::export::DocumentExporter;
use crate::image::{ImageGenerationClient, ImageRef, OpenAiImageBackend};
use crate::llm::{OllamaChatBackend, TextGenerationClient};

/// Outcome of a successful generation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryResult {
    /// Full generated story.
    pub text: String,
    /// Cover image, absent if its generation failed or is disabled.
    pub image: Option<ImageRef>,
    /// Narration, absent if its synthesis failed or is disabled.
    pub audio: Option<AudioRef>,
}

/// Lifecycle of one generation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationState {
    /// Prompt not yet accepted.
    Idle,
    /// Text, then image and audio, in progress.
    Generating,
    /// Text generated; auxiliary artifacts may be missing.
    Success,
    /// Text generation failed.
    Failed,
}

impl GenerationState {
    /// Stable string form for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    const fn can_enter(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Generating)
                | (Self::Generating, Self::Success)
                | (Self::Generating, Self::Failed)
        )
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-request state tracker.
struct RequestState {
    id: RequestId,
    session: SessionId,
    state: GenerationState,
}

impl RequestState {
    fn new(session: SessionId) -> Self {
        Self {
            id: RequestId::new(),
            session,
            state: GenerationState::Idle,
        }
    }

    fn enter(&mut self, next: GenerationState) {
        debug_assert!(self.state.can_enter(next), "{} -> {next}", self.state);
        debug!(
            "Request {} (session {}): {} -> {next}",
            self.id, self.session, self.state
        );
        self.state = next;
    }
}

/// Composes text, image and audio generation into one request.
pub struct StoryOrchestrator {
    text: TextGenerationClient,
    image: Option<ImageGenerationClient>,
    audio: Option<AudioSynthesisClient>,
    exporter: DocumentExporter,
    session_locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl StoryOrchestrator {
    /// Assemble an orchestrator from ready-made clients.
    #[must_use]
    pub fn new(
        text: TextGenerationClient,
        image: Option<ImageGenerationClient>,
        audio: Option<AudioSynthesisClient>,
        exporter: DocumentExporter,
    ) -> Self {
        Self {
            text,
            image,
            audio,
            exporter,
            session_locks: DashMap::new(),
        }
    }

    /// Build the default pipeline: Ollama for text, the OpenAI images API
    /// for covers and the configured speech backend.
    ///
    /// Auxiliary generators that cannot be built are disabled with a warning.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the text backend
    /// cannot be created.
    pub fn from_config(config: &StoryConfig) -> OrchestratorResult<Self> {
        config.validate()?;

        let store = Arc::new(ConversationStore::new(config.conversation.clone())?);
        let backend = Arc::new(OllamaChatBackend::new(&config.text)?);
        let text = TextGenerationClient::new(backend, store, &config.text);

        Ok(Self::new(
            text,
            build_image_client(&config.image),
            build_audio_client(&config.audio),
            DocumentExporter::new(config.export.clone()),
        ))
    }

    /// Conversation store shared with the text client.
    #[must_use]
    pub const fn store(&self) -> &Arc<ConversationStore> {
        self.text.store()
    }

    /// Directory receiving audio artifacts, if narration is enabled.
    #[must_use]
    pub fn audio_dir(&self) -> Option<&Path> {
        self.audio.as_ref().map(AudioSynthesisClient::output_dir)
    }

    /// The document exporter.
    #[must_use]
    pub const fn exporter(&self) -> &DocumentExporter {
        &self.exporter
    }

    /// Generate a story for `prompt` in the context of `session`.
    ///
    /// # Errors
    /// Returns an error only if text generation fails; image and audio
    /// failures leave the corresponding field empty.
    pub async fn generate(
        &self,
        session: SessionId,
        prompt: &str,
    ) -> OrchestratorResult<StoryResult> {
        self.run(session, prompt, None).await
    }

    /// Like [`generate`](Self::generate), also sending each text fragment to
    /// `progress` as soon as it arrives.
    ///
    /// # Errors
    /// Returns an error only if text generation fails.
    pub async fn generate_streaming(
        &self,
        session: SessionId,
        prompt: &str,
        progress: mpsc::Sender<String>,
    ) -> OrchestratorResult<StoryResult> {
        self.run(session, prompt, Some(&progress)).await
    }

    /// Render `text` as a PDF.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn export(&self, text: &str) -> OrchestratorResult<Vec<u8>> {
        Ok(self.exporter.export(text)?)
    }

    async fn run(
        &self,
        session: SessionId,
        prompt: &str,
        progress: Option<&mpsc::Sender<String>>,
    ) -> OrchestratorResult<StoryResult> {
        let lease = self.lease_session(session);
        let _guard = lease.lock.lock().await;
        self.run_locked(session, prompt, progress).await
    }

    async fn run_locked(
        &self,
        session: SessionId,
        prompt: &str,
        progress: Option<&mpsc::Sender<String>>,
    ) -> OrchestratorResult<StoryResult> {
        let mut request = RequestState::new(session);
        request.enter(GenerationState::Generating);

        let generated = match progress {
            Some(sender) => self.text.generate_with_progress(session, prompt, sender).await,
            None => self.text.generate(session, prompt).await,
        };
        let text = match generated {
            Ok(text) => text,
            Err(err) => {
                request.enter(GenerationState::Failed);
                warn!("Story request {} failed: {err}", request.id);
                return Err(err.into());
            }
        };

        let (image, audio) = tokio::join!(self.cover_image(prompt), self.narration(&text));

        request.enter(GenerationState::Success);
        info!(
            "Story request {} done: {} chars, image: {}, audio: {}",
            request.id,
            text.len(),
            image.is_some(),
            audio.is_some()
        );

        Ok(StoryResult { text, image, audio })
    }

    async fn cover_image(&self, prompt: &str) -> Option<ImageRef> {
        let client = self.image.as_ref()?;
        match client.generate_image(prompt).await {
            Ok(image) => Some(image),
            Err(err) => {
                warn!("Cover image skipped: {err}");
                None
            }
        }
    }

    async fn narration(&self, text: &str) -> Option<AudioRef> {
        let client = self.audio.as_ref()?;
        match client.synthesize_audio(text).await {
            Ok(audio) => Some(audio),
            Err(err) => {
                warn!("Narration skipped: {err}");
                None
            }
        }
    }

    fn lease_session(&self, session: SessionId) -> SessionLease<'_> {
        let lock = Arc::clone(self.session_locks.entry(session).or_default().value());
        SessionLease {
            locks: &self.session_locks,
            session,
            lock,
        }
    }
}

/// A request's handle on its session lock.
///
/// Dropping the last lease removes the map entry, including when the request
/// future is cancelled before it completes.
struct SessionLease<'a> {
    locks: &'a DashMap<SessionId, Arc<Mutex<()>>>,
    session: SessionId,
    lock: Arc<Mutex<()>>,
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        // The map and this lease hold two references; any other holder is
        // a request still queued or running on the session.
        self.locks.remove_if(&self.session, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

fn build_image_client(config: &ImageConfig) -> Option<ImageGenerationClient> {
    if !config.enabled {
        return None;
    }
    match OpenAiImageBackend::new(config) {
        Ok(backend) => Some(ImageGenerationClient::new(Arc::new(backend), config)),
        Err(err) => {
            warn!("Cover images disabled: {err}");
            None
        }
    }
}

fn build_audio_client(config: &AudioConfig) -> Option<AudioSynthesisClient> {
    if !config.enabled {
        return None;
    }
    let backend: Arc<dyn SpeechBackend> = match config.mode {
        AudioMode::Command => Arc::new(CommandSpeechBackend::from_config(config)),
        AudioMode::Http => match HttpSpeechBackend::new(config) {
            Ok(backend) => Arc::new(backend),
            Err(err) => {
                warn!("Narration disabled: {err}");
                return None;
            }
        },
    };
    Some(AudioSynthesisClient::new(backend, config))
}
