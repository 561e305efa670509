//! Text generation client with all-or-nothing commits.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};
use tracing::{debug, info};

use crate::conversation::{ConversationStore, Turn};
use crate::core::config::TextConfig;
use crate::core::errors::{GenerationError, GenerationResult};
use crate::core::ids::SessionId;
use crate::llm::{FragmentStream, TextBackend};

/// Drives a [`TextBackend`] with the context of a session.
pub struct TextGenerationClient {
    backend: Arc<dyn TextBackend>,
    store: Arc<ConversationStore>,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl TextGenerationClient {
    /// Create a client over `backend`, reading and committing turns in `store`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn TextBackend>,
        store: Arc<ConversationStore>,
        config: &TextConfig,
    ) -> Self {
        Self {
            backend,
            store,
            request_timeout: config.request_timeout,
            idle_timeout: config.idle_timeout,
        }
    }

    /// Model used by the backend.
    #[must_use]
    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// The store this client reads from and commits to.
    #[must_use]
    pub const fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Start generating a reply to `prompt`.
    ///
    /// The backend receives the session context followed by the prompt. The
    /// prompt and the reply are committed together once the returned stream
    /// completes; a failed or dropped stream commits nothing.
    ///
    /// # Errors
    /// Returns an error if the prompt is blank, or the backend fails or
    /// times out before streaming.
    pub async fn stream_generate(
        &self,
        session: SessionId,
        prompt: &str,
    ) -> GenerationResult<GenerationStream> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let mut turns = self.store.context_snapshot(session);
        turns.push(Turn::user(prompt));
        debug!(
            "Requesting {} with {} turns for session {session}",
            self.backend.model(),
            turns.len()
        );

        let inner = tokio::time::timeout(self.request_timeout, self.backend.stream_chat(&turns))
            .await
            .map_err(|_| GenerationError::Timeout {
                partial: String::new(),
            })??;

        Ok(GenerationStream::new(
            inner,
            Arc::clone(&self.store),
            session,
            prompt.to_string(),
            self.idle_timeout,
        ))
    }

    /// Generate a full reply, returning it once the stream completes.
    ///
    /// # Errors
    /// Returns the first [`GenerationError`]; the store is then unchanged.
    pub async fn generate(&self, session: SessionId, prompt: &str) -> GenerationResult<String> {
        self.generate_inner(session, prompt, None).await
    }

    /// Like [`generate`](Self::generate), also forwarding each fragment to
    /// `progress` as it arrives.
    ///
    /// A closed receiver does not stop generation.
    ///
    /// # Errors
    /// Returns the first [`GenerationError`]; the store is then unchanged.
    pub async fn generate_with_progress(
        &self,
        session: SessionId,
        prompt: &str,
        progress: &mpsc::Sender<String>,
    ) -> GenerationResult<String> {
        self.generate_inner(session, prompt, Some(progress)).await
    }

    async fn generate_inner(
        &self,
        session: SessionId,
        prompt: &str,
        progress: Option<&mpsc::Sender<String>>,
    ) -> GenerationResult<String> {
        let mut stream = self.stream_generate(session, prompt).await?;
        let mut fragments = 0_usize;

        while let Some(item) = stream.next().await {
            let fragment = item?;
            fragments += 1;
            if let Some(sender) = progress {
                if sender.send(fragment).await.is_err() {
                    debug!("Progress receiver closed for session {session}");
                }
            }
        }

        info!("Generated {fragments} fragments for session {session}");
        Ok(stream.into_text())
    }
}

/// Fragments of one reply, in emission order.
///
/// Yields `Ok(fragment)` items, then either ends (reply committed) or yields
/// one `Err` carrying the partial text and ends.
pub struct GenerationStream {
    inner: Option<FragmentStream>,
    store: Arc<ConversationStore>,
    session: SessionId,
    prompt: String,
    accumulated: String,
    committed: bool,
    idle_timeout: Duration,
    idle: Pin<Box<Sleep>>,
}

impl GenerationStream {
    fn new(
        inner: FragmentStream,
        store: Arc<ConversationStore>,
        session: SessionId,
        prompt: String,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Some(inner),
            store,
            session,
            prompt,
            accumulated: String::new(),
            committed: false,
            idle_timeout,
            idle: Box::pin(tokio::time::sleep(idle_timeout)),
        }
    }

    /// Text received so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// Whether the exchange has been committed to the store.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    /// Consume the stream, returning the text received so far.
    #[must_use]
    pub fn into_text(mut self) -> String {
        std::mem::take(&mut self.accumulated)
    }

    fn commit(&mut self) -> GenerationResult<()> {
        if self.accumulated.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        self.store
            .append_exchange(self.session, self.prompt.as_str(), self.accumulated.as_str())?;
        self.committed = true;
        Ok(())
    }
}

impl Stream for GenerationStream {
    type Item = GenerationResult<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                this.accumulated.push_str(&fragment);
                this.idle.as_mut().reset(Instant::now() + this.idle_timeout);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.inner = None;
                Poll::Ready(Some(Err(err.with_partial(&this.accumulated))))
            }
            Poll::Ready(None) => {
                this.inner = None;
                match this.commit() {
                    Ok(()) => Poll::Ready(None),
                    Err(err) => Poll::Ready(Some(Err(err))),
                }
            }
            Poll::Pending => {
                if this.idle.as_mut().poll(cx).is_ready() {
                    this.inner = None;
                    return Poll::Ready(Some(Err(GenerationError::Timeout {
                        partial: this.accumulated.clone(),
                    })));
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        if self.inner.is_some() {
            debug!(
                "Generation for session {} abandoned after {} bytes; nothing committed",
                self.session,
                self.accumulated.len()
            );
        }
    }
}
