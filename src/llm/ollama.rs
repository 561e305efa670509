//! Streaming chat backend for Ollama.
//!
//! Behaviour:
//! - `POST /api/chat` with `stream: true` and the whole turn sequence.
//! - The body is newline-delimited JSON. Each line carries a
//!   `message.content` fragment; the last line has `done: true`.
//! - A line with an `error` field aborts the stream.
//! - A body that ends before `done: true` is an interrupted stream.

use std::collections::VecDeque;
use std::fmt::Display;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conversation::Turn;
use crate::core::config::TextConfig;
use crate::core::errors::{GenerationError, GenerationResult};
use crate::llm::{FragmentStream, TextBackend};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    keep_alive: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Ollama chat client producing a fragment stream.
pub struct OllamaChatBackend {
    client: Client,
    base_url: String,
    model: String,
    keep_alive: String,
}

impl OllamaChatBackend {
    /// Create a client from the text settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &TextConfig) -> GenerationResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            keep_alive: config.keep_alive.clone(),
        })
    }

    /// Whether Ollama answers `GET /api/version`.
    pub async fn is_ready(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("Ollama not reachable at {}: {err}", self.base_url);
                false
            }
        }
    }
}

#[async_trait]
impl TextBackend for OllamaChatBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, turns: &[Turn]) -> GenerationResult<FragmentStream> {
        let request = ChatRequest {
            model: &self.model,
            messages: turns
                .iter()
                .map(|turn| ChatMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            stream: true,
            keep_alive: &self.keep_alive,
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(decode_chat_stream(Box::pin(response.bytes_stream())))
    }
}

struct DecodeState<S> {
    bytes: S,
    buffer: Vec<u8>,
    pending: VecDeque<GenerationResult<String>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn push_bytes(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line);
            if self.finished {
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }

        match serde_json::from_slice::<ChatChunk>(line) {
            Ok(chunk) => {
                if let Some(message) = chunk.error {
                    self.fail(GenerationError::Backend {
                        message,
                        partial: String::new(),
                    });
                    return;
                }
                if let Some(message) = chunk.message {
                    if !message.content.is_empty() {
                        self.pending.push_back(Ok(message.content));
                    }
                }
                if chunk.done {
                    self.finished = true;
                }
            }
            Err(err) => self.fail(GenerationError::Decode {
                message: err.to_string(),
                partial: String::new(),
            }),
        }
    }

    fn end_of_body(&mut self) {
        let rest = std::mem::take(&mut self.buffer);
        self.handle_line(&rest);
        if !self.finished {
            self.fail(GenerationError::Stream {
                message: "stream ended before completion marker".to_string(),
                partial: String::new(),
            });
        }
    }

    fn fail(&mut self, err: GenerationError) {
        self.pending.push_back(Err(err));
        self.finished = true;
    }
}

/// Turn an NDJSON byte stream into text fragments.
///
/// Reading stops at the completion marker or the first error.
pub(crate) fn decode_chat_stream<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.push_bytes(chunk.as_ref()),
                Some(Err(err)) => state.fail(GenerationError::Stream {
                    message: err.to_string(),
                    partial: String::new(),
                }),
                None => state.end_of_body(),
            }
        }
    })
    .boxed()
}
