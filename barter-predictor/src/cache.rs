//! Short-lived memoisation of predictions per (instrument, horizon).

use crate::{config::CacheConfig, model::Prediction};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub instrument: SmolStr,
    pub horizon_secs: u32,
}

impl CacheKey {
    pub fn new(instrument: impl Into<SmolStr>, horizon_secs: u32) -> Self {
        Self {
            instrument: instrument.into(),
            horizon_secs,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedPrediction {
    prediction: Prediction,
    stored_at: Instant,
}

/// Serves the stored prediction while it is younger than the horizon's TTL.
#[derive(Debug)]
pub struct PredictionCache {
    config: CacheConfig,
    entries: RwLock<FnvHashMap<CacheKey, CachedPrediction>>,
}

impl PredictionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(FnvHashMap::default()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Prediction> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Prediction> {
        let ttl = self.config.ttl(key.horizon_secs);
        self.entries
            .read()
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.stored_at) < ttl)
            .map(|entry| entry.prediction.clone())
    }

    pub fn insert(&self, key: CacheKey, prediction: Prediction) {
        self.insert_at(key, prediction, Instant::now());
    }

    pub fn insert_at(&self, key: CacheKey, prediction: Prediction, now: Instant) {
        self.entries.write().insert(
            key,
            CachedPrediction {
                prediction,
                stored_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove entries older than `max_age_secs`. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        let max_age = Duration::from_secs(self.config.max_age_secs);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.stored_at) <= max_age);
        before - entries.len()
    }
}
