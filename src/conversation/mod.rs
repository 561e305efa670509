//! Conversation context: turns and the per-session store.

pub mod store;
pub mod turn;

pub use store::ConversationStore;
pub use turn::{Role, Turn};
