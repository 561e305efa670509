//! Text generation: the streaming backend seam and the client that ties it
//! to the conversation store.

pub mod client;
pub mod ollama;

pub use client::{GenerationStream, TextGenerationClient};
pub use ollama::OllamaChatBackend;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::conversation::Turn;
use crate::core::errors::GenerationResult;

/// Finite, non-restartable stream of text fragments in emission order.
pub type FragmentStream = BoxStream<'static, GenerationResult<String>>;

/// A chat backend able to stream its reply.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Model identifier, for logging.
    fn model(&self) -> &str;

    /// Start a reply to `turns` (oldest first, last one is the new prompt).
    ///
    /// # Errors
    /// Returns an error if the request cannot be started.
    async fn stream_chat(&self, turns: &[Turn]) -> GenerationResult<FragmentStream>;
}
