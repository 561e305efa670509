//! Prompt-keyed cache for generated images.
//!
//! Retried requests with the same seed prompt reuse the earlier image
//! instead of paying for a second generation.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::core::config::ImageConfig;
use crate::image::ImageRef;

/// Cache entry with TTL.
#[derive(Clone)]
struct CacheEntry {
    image: ImageRef,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(image: ImageRef, ttl: Duration) -> Self {
        Self {
            image,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe TTL cache keyed by the SHA-256 of the prompt.
pub struct ImageCache {
    ttl: Duration,
    max_entries: usize,
    entries: DashMap<String, CacheEntry>,
}

impl ImageCache {
    /// Create a cache; `max_entries` is clamped to at least one.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: DashMap::new(),
        }
    }

    /// Build from the image settings, or `None` when caching is disabled.
    #[must_use]
    pub fn from_config(config: &ImageConfig) -> Option<Self> {
        config.cache_enabled.then(|| {
            Self::new(
                Duration::from_secs(config.cache_ttl_seconds),
                config.cache_max_entries,
            )
        })
    }

    /// Cached image for `prompt`, if present and fresh.
    #[must_use]
    pub fn get(&self, prompt: &str) -> Option<ImageRef> {
        let key = prompt_hash(prompt);
        self.entries.get(&key).and_then(|entry| {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(&key);
                None
            } else {
                Some(entry.image.clone())
            }
        })
    }

    /// Remember the image generated for `prompt`.
    pub fn insert(&self, prompt: &str, image: ImageRef) {
        self.enforce_max_entries();
        self.entries
            .insert(prompt_hash(prompt), CacheEntry::new(image, self.ttl));
    }

    /// Number of cached prompts, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    /// Make room for one insert, dropping expired entries first, then the
    /// entries closest to expiry.
    fn enforce_max_entries(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }

        self.cleanup_expired();

        if self.entries.len() >= self.max_entries {
            let mut by_expiry: Vec<(String, Instant)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.expires_at))
                .collect();
            by_expiry.sort_by_key(|(_, expires_at)| *expires_at);

            let to_remove = self.entries.len() - self.max_entries + 1;
            for (key, _) in by_expiry.into_iter().take(to_remove) {
                self.entries.remove(&key);
            }
        }
    }
}

/// Hex SHA-256 of a prompt.
#[must_use]
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}
