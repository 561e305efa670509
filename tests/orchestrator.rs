//! End-to-end orchestration with in-process backends.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::sync::mpsc;

use taleforge::audio::{AudioSynthesisClient, SpeechBackend};
use taleforge::conversation::{ConversationStore, Role, Turn};
use taleforge::core::config::{AudioConfig, ConversationConfig, ImageConfig, TextConfig};
use taleforge::core::errors::{
    AudioSynthesisError, AudioSynthesisResult, GenerationError, GenerationResult, ImageGenerationError,
    ImageGenerationResult, StoryError,
};
use taleforge::core::ids::SessionId;
use taleforge::export::DocumentExporter;
use taleforge::image::{ImageBackend, ImageGenerationClient, ImageRef};
use taleforge::llm::{FragmentStream, TextBackend, TextGenerationClient};
use taleforge::orchestrator::StoryOrchestrator;

/// Replies with fixed fragments, optionally failing after them, and records
/// every context it is given.
struct ScriptedText {
    fragments: Vec<&'static str>,
    fail_after: bool,
    delay: Duration,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedText {
    fn replying(fragments: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            fragments,
            fail_after: false,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing_after(fragments: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            fragments,
            fail_after: true,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn slow(fragments: Vec<&'static str>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fragments,
            fail_after: false,
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextBackend for ScriptedText {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, turns: &[Turn]) -> GenerationResult<FragmentStream> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(turns.to_vec());
        }

        let mut items: Vec<GenerationResult<String>> = self
            .fragments
            .iter()
            .map(|fragment| Ok((*fragment).to_string()))
            .collect();
        if self.fail_after {
            items.push(Err(GenerationError::Stream {
                message: "connection reset".to_string(),
                partial: String::new(),
            }));
        }

        let delay = self.delay;
        Ok(stream::iter(items)
            .then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            })
            .boxed())
    }
}

/// Records prompts; answers with a URL or fails.
struct FakeImage {
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageBackend for FakeImage {
    async fn generate(&self, prompt: &str) -> ImageGenerationResult<ImageRef> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail {
            return Err(ImageGenerationError::Status {
                status: 500,
                body: "quota exceeded".to_string(),
            });
        }
        Ok(ImageRef::Url {
            url: "https://img.example/cover.png".to_string(),
        })
    }
}

/// Records texts; writes them to the artifact path or fails like a broken
/// synthesizer.
struct FakeSpeech {
    fail: bool,
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechBackend for FakeSpeech {
    async fn synthesize(&self, text: &str, output: &Path) -> AudioSynthesisResult<()> {
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }
        if self.fail {
            return Err(AudioSynthesisError::CommandFailed {
                program: "espeak-ng".to_string(),
                code: Some(1),
                stderr: "no voice installed".to_string(),
            });
        }
        tokio::fs::write(output, text).await?;
        Ok(())
    }
}

struct Harness {
    orchestrator: Arc<StoryOrchestrator>,
    text: Arc<ScriptedText>,
    image: Arc<FakeImage>,
    speech: Arc<FakeSpeech>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(text: Arc<ScriptedText>) -> Self {
        Self::with_failures(text, false, false)
    }

    fn with_failures(text: Arc<ScriptedText>, image_fails: bool, speech_fails: bool) -> Self {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let store = Arc::new(
            ConversationStore::new(ConversationConfig::default())
                .unwrap_or_else(|e| panic!("store: {e}")),
        );
        let image = Arc::new(FakeImage {
            fail: image_fails,
            prompts: Mutex::new(Vec::new()),
        });
        let speech = Arc::new(FakeSpeech {
            fail: speech_fails,
            texts: Mutex::new(Vec::new()),
        });
        let audio_config = AudioConfig {
            output_dir: dir.path().join("audio"),
            ..AudioConfig::default()
        };

        let orchestrator = StoryOrchestrator::new(
            TextGenerationClient::new(text.clone(), store, &TextConfig::default()),
            Some(ImageGenerationClient::new(
                image.clone(),
                &ImageConfig::default(),
            )),
            Some(AudioSynthesisClient::new(speech.clone(), &audio_config)),
            DocumentExporter::default(),
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            text,
            image,
            speech,
            _dir: dir,
        }
    }

    fn image_prompts(&self) -> Vec<String> {
        self.image
            .prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn spoken_texts(&self) -> Vec<String> {
        self.speech
            .texts
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

#[tokio::test]
async fn lighthouse_story_produces_all_artifacts() {
    let harness = Harness::new(ScriptedText::replying(vec!["Once", " upon", " a time..."]));
    let session = SessionId::new();

    let result = harness
        .orchestrator
        .generate(session, "A lighthouse keeper")
        .await
        .unwrap_or_else(|e| panic!("generate: {e}"));

    assert_eq!(result.text, "Once upon a time...");
    assert_eq!(
        result.image,
        Some(ImageRef::Url {
            url: "https://img.example/cover.png".to_string()
        })
    );
    let audio = result.audio.unwrap_or_else(|| panic!("audio missing"));
    assert_eq!(
        tokio::fs::read_to_string(&audio.path).await.unwrap_or_default(),
        "Once upon a time..."
    );

    assert_eq!(harness.image_prompts(), vec!["A lighthouse keeper"]);
    assert_eq!(harness.spoken_texts(), vec!["Once upon a time..."]);

    let history = harness.orchestrator.store().history(session);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "A lighthouse keeper");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "Once upon a time...");
}

#[tokio::test]
async fn image_failure_still_yields_a_story() {
    let harness = Harness::with_failures(ScriptedText::replying(vec!["A dragon slept."]), true, false);

    let result = harness
        .orchestrator
        .generate(SessionId::new(), "A sleepy dragon")
        .await
        .unwrap_or_else(|e| panic!("generate: {e}"));

    assert_eq!(result.text, "A dragon slept.");
    assert!(result.image.is_none());
    assert!(result.audio.is_some());
}

#[tokio::test]
async fn narration_failure_still_yields_a_story() {
    let harness = Harness::with_failures(ScriptedText::replying(vec!["The owl hooted."]), false, true);

    let result = harness
        .orchestrator
        .generate(SessionId::new(), "A wise owl")
        .await
        .unwrap_or_else(|e| panic!("generate: {e}"));

    assert_eq!(result.text, "The owl hooted.");
    assert!(result.audio.is_none());
    assert!(result.image.is_some());
    assert_eq!(harness.spoken_texts(), vec!["The owl hooted."]);
}

#[tokio::test]
async fn both_auxiliary_failures_still_yield_a_story() {
    let harness = Harness::with_failures(ScriptedText::replying(vec!["Snow fell."]), true, true);
    let session = SessionId::new();

    let result = harness
        .orchestrator
        .generate(session, "A winter night")
        .await
        .unwrap_or_else(|e| panic!("generate: {e}"));

    assert_eq!(result.text, "Snow fell.");
    assert!(result.image.is_none());
    assert!(result.audio.is_none());
    assert_eq!(harness.orchestrator.store().len(session), 2);
}

#[tokio::test]
async fn text_failure_changes_nothing() {
    let harness = Harness::new(ScriptedText::failing_after(vec!["Once", " upon"]));
    let session = SessionId::new();

    let result = harness.orchestrator.generate(session, "A lighthouse keeper").await;

    match result {
        Err(StoryError::Generation(err)) => assert_eq!(err.partial_text(), Some("Once upon")),
        other => panic!("expected a generation error, got {other:?}"),
    }
    assert!(harness.orchestrator.store().is_empty(session));
    assert!(harness.image_prompts().is_empty());
    assert!(harness.spoken_texts().is_empty());
}

#[tokio::test]
async fn follow_up_sees_previous_exchange() {
    let harness = Harness::new(ScriptedText::replying(vec!["And then..."]));
    let session = SessionId::new();

    for prompt in ["Start a tale", "Continue it"] {
        harness
            .orchestrator
            .generate(session, prompt)
            .await
            .unwrap_or_else(|e| panic!("generate: {e}"));
    }

    let seen = harness.text.seen();
    assert_eq!(seen.len(), 2);
    let second: Vec<(Role, &str)> = seen[1]
        .iter()
        .map(|turn| (turn.role, turn.content.as_str()))
        .collect();
    assert_eq!(
        second,
        vec![
            (Role::User, "Start a tale"),
            (Role::Assistant, "And then..."),
            (Role::User, "Continue it"),
        ]
    );
    assert_eq!(harness.orchestrator.store().len(session), 4);
}

#[tokio::test]
async fn streaming_delivers_fragments_in_order() {
    let harness = Harness::new(ScriptedText::replying(vec!["Once", " upon", " a time..."]));
    let (tx, mut rx) = mpsc::channel(16);

    let result = harness
        .orchestrator
        .generate_streaming(SessionId::new(), "A lighthouse keeper", tx)
        .await
        .unwrap_or_else(|e| panic!("generate: {e}"));

    let mut fragments = Vec::new();
    while let Some(fragment) = rx.recv().await {
        fragments.push(fragment);
    }
    assert_eq!(fragments, vec!["Once", " upon", " a time..."]);
    assert_eq!(fragments.concat(), result.text);
}

#[tokio::test]
async fn same_session_requests_are_serialized() {
    let harness = Harness::new(ScriptedText::slow(vec!["Tick", " tock."], Duration::from_millis(20)));
    let session = SessionId::new();

    let first = harness.orchestrator.generate(session, "First");
    let second = harness.orchestrator.generate(session, "Second");
    let (first, second) = tokio::join!(first, second);
    assert!(first.is_ok() && second.is_ok());

    let mut context_sizes: Vec<usize> = harness.text.seen().iter().map(Vec::len).collect();
    context_sizes.sort_unstable();
    assert_eq!(context_sizes, vec![1, 3]);

    let roles: Vec<Role> = harness
        .orchestrator
        .store()
        .history(session)
        .iter()
        .map(|turn| turn.role)
        .collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn other_sessions_are_not_blocked() {
    let harness = Harness::new(ScriptedText::slow(vec!["Tick", " tock."], Duration::from_millis(20)));

    let (a, b) = tokio::join!(
        harness.orchestrator.generate(SessionId::new(), "First"),
        harness.orchestrator.generate(SessionId::new(), "Second")
    );
    assert!(a.is_ok() && b.is_ok());

    let context_sizes: Vec<usize> = harness.text.seen().iter().map(Vec::len).collect();
    assert_eq!(context_sizes, vec![1, 1]);
}

#[test]
fn export_renders_a_pdf() {
    let harness = Harness::new(ScriptedText::replying(vec!["x"]));
    let bytes = harness
        .orchestrator
        .export("Once upon a time...\nThe end.")
        .unwrap_or_else(|e| panic!("export: {e}"));
    assert!(bytes.starts_with(b"%PDF"));
}
