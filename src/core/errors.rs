//! Error types for the story pipeline.
//!
//! One enum per component. Text generation errors are fatal to a request;
//! image and audio errors are recovered by the orchestrator.

use thiserror::Error;

/// Conversation store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// Turn content was empty or whitespace only.
    #[error("turn content must not be empty")]
    EmptyContent,
}

/// Convenience result alias for conversation operations.
pub type ConversationResult<T> = Result<T, ConversationError>;

/// Text generation failures.
///
/// Variants raised after the stream has started carry the text accumulated
/// so far in `partial`.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The prompt was empty or whitespace only.
    #[error("prompt must not be empty")]
    EmptyPrompt,
    /// HTTP client error before the stream started.
    #[error("text backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend answered with a non-success status.
    #[error("text backend returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if readable.
        body: String,
    },
    /// Backend reported an error inside the stream.
    #[error("text backend reported an error: {message}")]
    Backend {
        /// Error message from the backend.
        message: String,
        /// Text received before the failure.
        partial: String,
    },
    /// The stream broke or ended before its completion marker.
    #[error("text stream interrupted: {message}")]
    Stream {
        /// Transport-level description.
        message: String,
        /// Text received before the failure.
        partial: String,
    },
    /// No response (or no next fragment) within the configured timeout.
    #[error("text backend timed out")]
    Timeout {
        /// Text received before the timeout.
        partial: String,
    },
    /// A stream chunk could not be decoded.
    #[error("malformed stream chunk: {message}")]
    Decode {
        /// Decoder message.
        message: String,
        /// Text received before the failure.
        partial: String,
    },
    /// The stream completed without producing any text.
    #[error("text backend completed without producing text")]
    EmptyResponse,
    /// The finished exchange could not be committed.
    #[error("conversation error: {0}")]
    Conversation(#[from] ConversationError),
}

impl GenerationError {
    /// Text accumulated before the failure, if this variant tracks it.
    #[must_use]
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            Self::Backend { partial, .. }
            | Self::Stream { partial, .. }
            | Self::Timeout { partial }
            | Self::Decode { partial, .. } => Some(partial.as_str()),
            _ => None,
        }
    }

    /// Attach the accumulated text to variants that carry it.
    #[must_use]
    pub fn with_partial(mut self, text: &str) -> Self {
        match &mut self {
            Self::Backend { partial, .. }
            | Self::Stream { partial, .. }
            | Self::Timeout { partial }
            | Self::Decode { partial, .. } => {
                text.clone_into(partial);
            }
            _ => {}
        }
        self
    }
}

/// Convenience result alias for text generation.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Image generation failures.
#[derive(Debug, Error)]
pub enum ImageGenerationError {
    /// The prompt was empty or whitespace only.
    #[error("image prompt must not be empty")]
    EmptyPrompt,
    /// The backend needs an API key that is not configured.
    #[error("image backend API key is not configured")]
    MissingApiKey,
    /// HTTP client error.
    #[error("image backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend answered with a non-success status.
    #[error("image backend returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if readable.
        body: String,
    },
    /// Response contained neither a URL nor inline data.
    #[error("image backend response contained no image")]
    MissingImage,
    /// No response within the configured timeout.
    #[error("image backend timed out")]
    Timeout,
}

/// Convenience result alias for image generation.
pub type ImageGenerationResult<T> = Result<T, ImageGenerationError>;

/// Audio synthesis failures.
#[derive(Debug, Error)]
pub enum AudioSynthesisError {
    /// The text was empty or whitespace only.
    #[error("text to synthesize must not be empty")]
    EmptyText,
    /// HTTP client error.
    #[error("speech backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend answered with a non-success status.
    #[error("speech backend returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if readable.
        body: String,
    },
    /// Filesystem or process I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The local synthesis program exited unsuccessfully.
    #[error("{program} exited with {code:?}: {stderr}")]
    CommandFailed {
        /// Program that was run.
        program: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// Synthesis did not finish within the configured timeout.
    #[error("speech backend timed out")]
    Timeout,
}

/// Convenience result alias for audio synthesis.
pub type AudioSynthesisResult<T> = Result<T, AudioSynthesisError>;

/// Document export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The PDF writer failed.
    #[error("pdf rendering failed: {0}")]
    Pdf(#[from] lopdf::Error),
    /// Writing the document failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for document export.
pub type ExportResult<T> = Result<T, ExportError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A configured URL does not parse.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience result alias for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum StoryError {
    /// Text generation failed; no result was produced.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Document export failed.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// The pipeline could not be built from its configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience result alias for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, StoryError>;
