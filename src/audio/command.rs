//! Local text-to-speech program (espeak-ng by default).
//!
//! The text goes to the program's standard input; `{output}` in the argument
//! list is replaced by the artifact path. The child is killed if the
//! synthesis future is dropped, e.g. on timeout.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tracing::debug;

use crate::audio::SpeechBackend;
use crate::core::config::AudioConfig;
use crate::core::errors::{AudioSynthesisError, AudioSynthesisResult};

/// Placeholder replaced by the output path.
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Speech backend running a local program.
pub struct CommandSpeechBackend {
    program: String,
    args: Vec<String>,
}

impl CommandSpeechBackend {
    /// Run `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from the audio settings.
    #[must_use]
    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    fn render_args(&self, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }
}

#[async_trait]
impl SpeechBackend for CommandSpeechBackend {
    async fn synthesize(&self, text: &str, output: &Path) -> AudioSynthesisResult<()> {
        let args = self.render_args(output);
        debug!("Running {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Input is fed while stderr is drained, so a chatty program cannot
        // block on a full pipe before it reads its text.
        let feed = feed_stdin(child.stdin.take(), text, &self.program);
        let (fed, result) = tokio::join!(feed, child.wait_with_output());
        fed?;
        let result = result?;

        if !result.status.success() {
            return Err(AudioSynthesisError::CommandFailed {
                program: self.program.clone(),
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Write `text` and close the pipe. A program that exits without reading is
/// judged by its exit status instead.
async fn feed_stdin(stdin: Option<ChildStdin>, text: &str, program: &str) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(text.as_bytes()).await {
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
            debug!("{program} closed its input early");
            Ok(())
        }
        other => other,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandSpeechBackend {
        CommandSpeechBackend::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), OUTPUT_PLACEHOLDER.to_string()],
        )
    }

    #[test]
    fn test_placeholder_replaced() {
        let backend = CommandSpeechBackend::from_config(&AudioConfig::default());
        let args = backend.render_args(Path::new("/tmp/story.wav"));
        assert_eq!(args, vec!["-w", "/tmp/story.wav", "--stdin"]);
    }

    #[tokio::test]
    async fn test_text_reaches_program_and_file_is_written() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let output = dir.path().join("story.wav");
        let backend = shell("cat > \"$0\"");

        let result = backend.synthesize("Once upon a time...", &output).await;

        assert!(result.is_ok());
        let written = tokio::fs::read_to_string(&output).await.unwrap_or_default();
        assert_eq!(written, "Once upon a time...");
    }

    #[tokio::test]
    async fn test_failing_program_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let backend = shell("cat > /dev/null; echo 'no voice' >&2; exit 3");

        let result = backend
            .synthesize("text", &dir.path().join("story.wav"))
            .await;

        assert!(matches!(
            result,
            Err(AudioSynthesisError::CommandFailed { code: Some(3), ref stderr, .. }) if stderr == "no voice"
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let backend = CommandSpeechBackend::new("definitely-not-a-tts-program", Vec::new());
        let result = backend.synthesize("text", Path::new("unused.wav")).await;
        assert!(matches!(result, Err(AudioSynthesisError::Io(_))));
    }

    #[tokio::test]
    async fn test_stderr_is_drained_while_text_is_written() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let output = dir.path().join("story.wav");
        let backend = shell("head -c 262144 /dev/zero >&2; cat > \"$0\"");
        let text = "word ".repeat(50_000);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(20),
            backend.synthesize(&text, &output),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        let written = tokio::fs::read(&output).await.unwrap_or_default();
        assert_eq!(written.len(), text.len());
    }
}
