//! Memoization of pipeline outputs
//!
//! Entries are keyed by a SHA-256 fingerprint of the raw batch, the column
//! policy and both artifact versions, so reloading either artifact never
//! serves stale results. When full, the oldest entry is evicted.

use crate::error::Result;
use crate::models::RawBatch;
use crate::pipeline::PipelineOutput;
use crate::preprocessor::ColumnPolicy;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default number of cached batches
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

struct CacheEntry {
    output: Arc<PipelineOutput>,
    inserted_at: u64,
}

/// Bounded, thread-safe prediction cache
pub struct PredictionCache {
    entries: DashMap<String, CacheEntry>,
    capacity: usize,
    clock: AtomicU64,
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for PredictionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl PredictionCache {
    /// A capacity of 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            clock: AtomicU64::new(0),
        }
    }

    /// Cache key for one pipeline call
    pub fn fingerprint(
        batch: &RawBatch,
        policy: ColumnPolicy,
        scaler_version: &str,
        model_version: &str,
    ) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(batch)?);
        for part in [policy.as_str(), scaler_version, model_version] {
            hasher.update([0u8]);
            hasher.update(part.as_bytes());
        }
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn get(&self, key: &str) -> Option<Arc<PipelineOutput>> {
        self.entries.get(key).map(|entry| Arc::clone(&entry.output))
    }

    pub fn insert(&self, key: String, output: Arc<PipelineOutput>) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.inserted_at)
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                debug!(key = %oldest, "Evicted oldest cached prediction");
            }
        }
        let inserted_at = self.clock.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, CacheEntry { output, inserted_at });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, PredictionResult, RawRecord};

    fn output(p: f64) -> Arc<PipelineOutput> {
        Arc::new(PipelineOutput {
            results: vec![PredictionResult {
                id: "1".to_string(),
                probability: p,
            }],
            corrections: Vec::new(),
            scaler_version: "s".to_string(),
            model_version: "m".to_string(),
        })
    }

    fn batch(download: f64) -> RawBatch {
        RawBatch::with_all_columns(vec![RawRecord::new().with(Column::DownloadAvg, download)])
    }

    #[test]
    fn test_fingerprint_depends_on_every_input() {
        let base = PredictionCache::fingerprint(&batch(1.0), ColumnPolicy::Strict, "s1", "m1").unwrap();
        assert_eq!(
            base,
            PredictionCache::fingerprint(&batch(1.0), ColumnPolicy::Strict, "s1", "m1").unwrap()
        );
        for other in [
            PredictionCache::fingerprint(&batch(2.0), ColumnPolicy::Strict, "s1", "m1"),
            PredictionCache::fingerprint(&batch(1.0), ColumnPolicy::Lenient, "s1", "m1"),
            PredictionCache::fingerprint(&batch(1.0), ColumnPolicy::Strict, "s2", "m1"),
            PredictionCache::fingerprint(&batch(1.0), ColumnPolicy::Strict, "s1", "m2"),
        ] {
            assert_ne!(base, other.unwrap());
        }
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let cache = PredictionCache::new(2);
        cache.insert("a".into(), output(0.1));
        cache.insert("b".into(), output(0.2));
        cache.insert("c".into(), output(0.3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c").unwrap().results[0].probability, 0.3);
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = PredictionCache::new(0);
        cache.insert("a".into(), output(0.1));
        assert!(cache.is_empty());
    }
}
