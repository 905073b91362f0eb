//! Generation cache in front of any [`TextGenerator`].
//!
//! Responses are keyed on `(sha256(prompt), model, temperature)` and stored in
//! the run ledger database. Re-running an unchanged input set replays cached
//! generations instead of calling the service again. Storage problems never
//! fail a generation; they are logged and the call falls through.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use rfqscope_llm::TextGenerator;
use rfqscope_shared::Result;
use rfqscope_storage::Storage;

/// Hex SHA-256 of a prompt.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct CachedGenerator<G> {
    inner: G,
    storage: Arc<Storage>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<G: TextGenerator> CachedGenerator<G> {
    pub fn new(inner: G, storage: Arc<Storage>) -> Self {
        Self {
            inner,
            storage,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

impl<G: TextGenerator> TextGenerator for CachedGenerator<G> {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let hash = prompt_hash(prompt);
        let model = self.inner.model();

        match self
            .storage
            .get_cached_generation(&hash, model, temperature)
            .await
        {
            Ok(Some(response)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(hash = %&hash[..12], "generation cache hit");
                return Ok(response);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "generation cache lookup failed"),
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let response = self.inner.generate(prompt, temperature).await?;

        if let Err(e) = self
            .storage
            .put_cached_generation(&hash, model, temperature, &response)
            .await
        {
            warn!(error = %e, "failed to store generation in cache");
        }
        Ok(response)
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfqscope_llm::mock::MockGenerator;
    use uuid::Uuid;

    async fn temp_storage() -> Arc<Storage> {
        let path = std::env::temp_dir()
            .join(format!("rfqscope_cache_{}", Uuid::now_v7()))
            .join("rfqscope.db");
        Arc::new(Storage::open(&path).await.expect("open storage"))
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = prompt_hash("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, prompt_hash("hello"));
        assert_ne!(h, prompt_hash("hello "));
    }

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        let storage = temp_storage().await;
        let mock = MockGenerator::fixed("summary text");
        let cached = CachedGenerator::new(mock.clone(), Arc::clone(&storage));

        assert_eq!(cached.generate("prompt", 0.0).await.unwrap(), "summary text");
        assert_eq!(cached.generate("prompt", 0.0).await.unwrap(), "summary text");

        assert_eq!(mock.call_count(), 1);
        assert_eq!(cached.hits(), 1);
        assert_eq!(cached.misses(), 1);
        assert_eq!(storage.cached_generation_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn temperature_is_part_of_the_key() {
        let storage = temp_storage().await;
        let mock = MockGenerator::fixed("x");
        let cached = CachedGenerator::new(mock.clone(), storage);

        cached.generate("prompt", 0.0).await.unwrap();
        cached.generate("prompt", 0.3).await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let storage = temp_storage().await;
        let mock = MockGenerator::fixed("x").failing_on("boom");
        let cached = CachedGenerator::new(mock.clone(), Arc::clone(&storage));

        assert!(cached.generate("boom", 0.0).await.is_err());
        assert!(cached.generate("boom", 0.0).await.is_err());
        assert_eq!(mock.call_count(), 2);
        assert_eq!(storage.cached_generation_count().await.unwrap(), 0);
    }
}
