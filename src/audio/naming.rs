//! Collision-free artifact names.
//!
//! Names are `<prefix>_<run>_<counter>.<ext>`: `run` is fixed for the process
//! and `counter` is a process-wide monotonic sequence, so two calls never
//! produce the same name and restarts do not overwrite earlier files.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

static ARTIFACT_COUNTER: AtomicU64 = AtomicU64::new(0);
static RUN_ID: OnceLock<String> = OnceLock::new();

fn run_id() -> &'static str {
    RUN_ID.get_or_init(|| Uuid::new_v4().simple().to_string()[..8].to_string())
}

/// Derives unique artifact paths inside one directory.
#[derive(Clone, Debug)]
pub struct ArtifactNamer {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl ArtifactNamer {
    /// Names under `dir` shaped `<prefix>_<run>_<n>.<extension>`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// Directory receiving the artifacts.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Next unique file name.
    #[must_use]
    pub fn next_file_name(&self) -> String {
        let n = ARTIFACT_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{n:06}.{}", self.prefix, run_id(), self.extension)
    }

    /// Next unique path, with its file name.
    #[must_use]
    pub fn next_path(&self) -> (PathBuf, String) {
        let file_name = self.next_file_name();
        (self.dir.join(&file_name), file_name)
    }
}
