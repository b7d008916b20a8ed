//! Bounded per-instrument tick storage.

use crate::{
    instrument::MarketCategory,
    model::{Prediction, Tick},
};
use chrono::{Duration as ChronoDuration, Utc};
use fnv::FnvHashMap;
use itertools::Itertools;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::collections::VecDeque;
use tracing::debug;

/// Ring buffer of the most recent ticks for one instrument, plus its category tag.
#[derive(Debug, Clone)]
struct InstrumentBuffer {
    category: MarketCategory,
    ticks: VecDeque<Tick>,
}

impl InstrumentBuffer {
    fn new(category: MarketCategory, capacity: usize) -> Self {
        Self {
            category,
            ticks: VecDeque::with_capacity(capacity),
        }
    }
}

/// Thread-safe tick store.
///
/// Readers receive owned copies of the window, so indicator work never holds the lock
/// that tick ingestion needs.
#[derive(Debug)]
pub struct TickStore {
    max_ticks: usize,
    tags: FnvHashMap<SmolStr, MarketCategory>,
    buffers: RwLock<FnvHashMap<SmolStr, InstrumentBuffer>>,
    predictions: RwLock<FnvHashMap<SmolStr, Vec<Prediction>>>,
}

impl TickStore {
    pub fn new(max_ticks: usize, tags: FnvHashMap<SmolStr, MarketCategory>) -> Self {
        Self {
            max_ticks: max_ticks.max(1),
            tags,
            buffers: RwLock::new(FnvHashMap::default()),
            predictions: RwLock::new(FnvHashMap::default()),
        }
    }

    /// Tag an instrument explicitly, before or after its first tick.
    pub fn register(&self, instrument: impl Into<SmolStr>, category: MarketCategory) {
        let instrument = instrument.into();
        let mut buffers = self.buffers.write();
        buffers
            .entry(instrument)
            .and_modify(|buffer| buffer.category = category)
            .or_insert_with(|| InstrumentBuffer::new(category, self.max_ticks));
    }

    /// Append a tick, dropping the oldest once the buffer is full.
    ///
    /// Returns the category the instrument is tagged with.
    pub fn add_tick(&self, tick: Tick) -> MarketCategory {
        let mut buffers = self.buffers.write();
        let buffer = buffers
            .entry(tick.instrument.clone())
            .or_insert_with(|| {
                let category = self
                    .tags
                    .get(&tick.instrument)
                    .copied()
                    .unwrap_or_else(|| MarketCategory::classify(&tick.instrument));
                debug!(instrument = %tick.instrument, %category, "registered instrument");
                InstrumentBuffer::new(category, self.max_ticks)
            });

        while buffer.ticks.len() >= self.max_ticks {
            buffer.ticks.pop_front();
        }
        buffer.ticks.push_back(tick);

        buffer.category
    }

    pub fn category(&self, instrument: &str) -> Option<MarketCategory> {
        self.buffers.read().get(instrument).map(|buffer| buffer.category)
    }

    pub fn all_ticks(&self, instrument: &str) -> Vec<Tick> {
        self.buffers
            .read()
            .get(instrument)
            .map(|buffer| buffer.ticks.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_n(&self, instrument: &str, n: usize) -> Vec<Tick> {
        self.buffers
            .read()
            .get(instrument)
            .map(|buffer| {
                let skip = buffer.ticks.len().saturating_sub(n);
                buffer.ticks.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn latest_price(&self, instrument: &str) -> Option<f64> {
        self.buffers
            .read()
            .get(instrument)
            .and_then(|buffer| buffer.ticks.back())
            .map(|tick| tick.price)
    }

    pub fn tick_count(&self, instrument: &str) -> usize {
        self.buffers
            .read()
            .get(instrument)
            .map_or(0, |buffer| buffer.ticks.len())
    }

    /// Instruments with at least one stored tick, sorted by identifier.
    pub fn active_instruments(&self) -> Vec<SmolStr> {
        self.buffers
            .read()
            .iter()
            .filter(|(_, buffer)| !buffer.ticks.is_empty())
            .map(|(instrument, _)| instrument.clone())
            .sorted()
            .collect()
    }

    pub fn store_prediction(&self, prediction: Prediction) {
        self.predictions
            .write()
            .entry(prediction.instrument.clone())
            .or_default()
            .push(prediction);
    }

    pub fn predictions(&self, instrument: &str) -> Vec<Prediction> {
        self.predictions
            .read()
            .get(instrument)
            .cloned()
            .unwrap_or_default()
    }

    /// Prune stored predictions older than `retention`. Ticks are left untouched.
    ///
    /// Returns the number of predictions removed.
    pub fn cleanup(&self, retention: ChronoDuration) -> usize {
        let cutoff = Utc::now() - retention;
        let mut removed = 0;

        let mut predictions = self.predictions.write();
        for history in predictions.values_mut() {
            let before = history.len();
            history.retain(|prediction| prediction.timestamp >= cutoff);
            removed += before - history.len();
        }
        predictions.retain(|_, history| !history.is_empty());

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instrument::SpikeSide,
        model::{DecisionOutcome, Prediction},
    };
    use chrono::{DateTime, TimeZone};

    fn time(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn store(max_ticks: usize) -> TickStore {
        TickStore::new(max_ticks, FnvHashMap::default())
    }

    #[test]
    fn test_add_tick_trims_oldest() {
        let store = store(3);
        for (i, price) in [1.0, 2.0, 3.0, 4.0, 5.0].into_iter().enumerate() {
            store.add_tick(Tick::new("volatility_75_1s", price, time(i as i64)));
        }

        let prices = store
            .all_ticks("volatility_75_1s")
            .into_iter()
            .map(|tick| tick.price)
            .collect::<Vec<_>>();

        assert_eq!(prices, vec![3.0, 4.0, 5.0]);
        assert_eq!(store.tick_count("volatility_75_1s"), 3);
        assert_eq!(store.latest_price("volatility_75_1s"), Some(5.0));
    }

    #[test]
    fn test_last_n() {
        struct TestCase {
            input: usize,
            expected: Vec<f64>,
        }

        let store = store(10);
        for (i, price) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            store.add_tick(Tick::new("boom_500_1s", price, time(i as i64)));
        }

        let tests = vec![
            TestCase {
                // TC0: fewer than stored
                input: 2,
                expected: vec![3.0, 4.0],
            },
            TestCase {
                // TC1: more than stored
                input: 10,
                expected: vec![1.0, 2.0, 3.0, 4.0],
            },
            TestCase {
                // TC2: zero
                input: 0,
                expected: vec![],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = store
                .last_n("boom_500_1s", test.input)
                .into_iter()
                .map(|tick| tick.price)
                .collect::<Vec<_>>();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_unknown_instrument_is_empty() {
        let store = store(10);
        assert!(store.all_ticks("missing").is_empty());
        assert_eq!(store.latest_price("missing"), None);
        assert_eq!(store.category("missing"), None);
        assert_eq!(store.tick_count("missing"), 0);
    }

    #[test]
    fn test_category_tagging() {
        let mut tags = FnvHashMap::default();
        tags.insert(SmolStr::new("custom_pair"), MarketCategory::Forex);
        let store = TickStore::new(10, tags);

        assert_eq!(
            store.add_tick(Tick::new("custom_pair", 1.1, time(0))),
            MarketCategory::Forex
        );
        assert_eq!(
            store.add_tick(Tick::new("crash_300_1s", 100.0, time(0))),
            MarketCategory::CrashBoom(SpikeSide::Crash)
        );

        store.register("volatility_10_1s", MarketCategory::Volatility);
        assert_eq!(
            store.category("volatility_10_1s"),
            Some(MarketCategory::Volatility)
        );
    }

    #[test]
    fn test_active_instruments_skips_empty_buffers() {
        let store = store(10);
        store.register("volatility_10_1s", MarketCategory::Volatility);
        store.add_tick(Tick::new("volatility_75_1s", 1.0, time(0)));
        store.add_tick(Tick::new("boom_500_1s", 1.0, time(0)));

        assert_eq!(
            store.active_instruments(),
            vec![SmolStr::new("boom_500_1s"), SmolStr::new("volatility_75_1s")]
        );
    }

    #[test]
    fn test_cleanup_prunes_old_predictions_only() {
        let store = store(10);
        store.add_tick(Tick::new("volatility_75_1s", 1.0, time(0)));

        let mut old = Prediction::neutral(
            SmolStr::new("volatility_75_1s"),
            MarketCategory::Volatility,
            60,
            1,
            DecisionOutcome::InsufficientData,
            "old",
        );
        old.timestamp = Utc::now() - ChronoDuration::hours(13);
        let fresh = Prediction::neutral(
            SmolStr::new("volatility_75_1s"),
            MarketCategory::Volatility,
            60,
            1,
            DecisionOutcome::InsufficientData,
            "fresh",
        );
        store.store_prediction(old);
        store.store_prediction(fresh);

        let removed = store.cleanup(ChronoDuration::hours(12));

        assert_eq!(removed, 1);
        let remaining = store.predictions("volatility_75_1s");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].reason, "fresh");
        assert_eq!(store.tick_count("volatility_75_1s"), 1);
    }
}
