//! Story orchestration: text first, then best-effort image and audio.

pub mod story;

pub use story::{GenerationState, StoryOrchestrator, StoryResult};
