//! Request-level prediction pipeline.
//!
//! `predict` refuses over-limit requests, serves fresh cached predictions, and
//! otherwise aggregates the instrument's ticks into candles for the requested
//! horizon, runs the [`ConsensusEngine`] over the candle closes and hands
//! directional results to the [`OutcomeTracker`].

use crate::{
    cache::{CacheKey, PredictionCache},
    candle::{candles_to_ticks, to_candles},
    config::PredictorConfig,
    consensus::ConsensusEngine,
    error::PredictorError,
    instrument::{MarketCategory, MarketMode},
    model::{DecisionOutcome, PendingPrediction, Prediction, Stats, Tick, TradeResult},
    rate_limit::RateLimiter,
    ranking::Opportunity,
    store::TickStore,
    tracker::{OutcomeTracker, PerformanceSummary, SettlementScheduler},
};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Predictor {
    config: PredictorConfig,
    store: Arc<TickStore>,
    consensus: ConsensusEngine,
    cache: PredictionCache,
    limiter: RateLimiter,
    tracker: OutcomeTracker,
    scheduler: Mutex<Option<SettlementScheduler>>,
}

impl Predictor {
    pub fn new(config: PredictorConfig) -> Result<Self, PredictorError> {
        config.validate()?;

        let store = Arc::new(TickStore::new(
            config.storage.max_ticks,
            config.instruments.clone(),
        ));
        let (tracker, scheduler) = OutcomeTracker::new(store.clone(), config.tracking.clone());

        Ok(Self {
            consensus: ConsensusEngine::new(&config),
            cache: PredictionCache::new(config.cache.clone()),
            limiter: RateLimiter::new(config.rate_limit.clone()),
            store,
            tracker,
            scheduler: Mutex::new(Some(scheduler)),
            config,
        })
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TickStore> {
        &self.store
    }

    pub fn tracker(&self) -> &OutcomeTracker {
        &self.tracker
    }

    pub fn add_tick(&self, tick: Tick) -> MarketCategory {
        self.store.add_tick(tick)
    }

    /// Category an instrument is, or would be, tagged with.
    pub fn category(&self, instrument: &str) -> MarketCategory {
        self.store.category(instrument).unwrap_or_else(|| {
            self.config
                .instruments
                .get(instrument)
                .copied()
                .unwrap_or_else(|| MarketCategory::classify(instrument))
        })
    }

    /// Predict the direction of `instrument` over the next `horizon_secs`.
    ///
    /// Only rate limit refusals are errors; every "no trade" outcome is a neutral
    /// prediction with a reason.
    pub fn predict(&self, instrument: &str, horizon_secs: u32) -> Result<Prediction, PredictorError> {
        let instrument = SmolStr::new(instrument);
        let category = self.category(&instrument);

        self.limiter.try_acquire(&instrument, category)?;

        let key = CacheKey::new(instrument.clone(), horizon_secs);
        if let Some(cached) = self.cache.get(&key) {
            debug!(%instrument, horizon_secs, "serving cached prediction");
            return Ok(cached);
        }

        let ticks = self.store.all_ticks(&instrument);
        let timeframe = self.config.timeframes.select(category, horizon_secs);
        let min_ticks = self.config.timeframes.minimum_ticks(category, timeframe);

        if ticks.len() < min_ticks {
            let minutes = ((min_ticks - ticks.len()) / category.ticks_per_minute()).max(1);
            return Ok(Prediction::neutral(
                instrument,
                category,
                horizon_secs,
                ticks.len(),
                DecisionOutcome::InsufficientData,
                format!(
                    "Collecting data: {}/{} ticks (~{} min remaining)",
                    ticks.len(),
                    min_ticks,
                    minutes
                ),
            ));
        }

        let candles = to_candles(&ticks, timeframe.candle_period_ms());
        if let Err(error) = self.config.timeframes.validate(&candles, timeframe.min_candles) {
            return Ok(Prediction::neutral(
                instrument,
                category,
                horizon_secs,
                ticks.len(),
                DecisionOutcome::InsufficientData,
                format!(
                    "Data quality issue: {} (candles: {}/{})",
                    error,
                    candles.len(),
                    timeframe.min_candles
                ),
            ));
        }

        let mut prediction = self.consensus.evaluate(
            &instrument,
            category,
            horizon_secs,
            &candles_to_ticks(&candles),
            timeframe,
        );
        prediction.confidence = self.consensus.config().boosted(
            prediction.confidence,
            candles.len(),
            timeframe.min_candles,
        );

        self.cache.insert(key, prediction.clone());
        self.store.store_prediction(prediction.clone());

        if prediction.is_directional() {
            let entry_price = self
                .store
                .latest_price(&instrument)
                .unwrap_or(prediction.current_price);
            self.tracker.track(&prediction, entry_price);

            info!(
                %instrument,
                horizon_secs,
                direction = %prediction.direction,
                confidence = prediction.confidence,
                reason = %prediction.reason,
                "prediction accepted"
            );
        } else {
            debug!(
                %instrument,
                horizon_secs,
                outcome = %prediction.outcome,
                reason = %prediction.reason,
                "neutral prediction"
            );
        }

        Ok(prediction)
    }

    /// Predict every active instrument. Rate limited instruments are omitted.
    pub fn predict_all(&self, horizon_secs: u32) -> FnvHashMap<SmolStr, Prediction> {
        self.predict_mode(horizon_secs, MarketMode::Both)
    }

    /// Predict every active instrument included by `mode`.
    pub fn predict_mode(&self, horizon_secs: u32, mode: MarketMode) -> FnvHashMap<SmolStr, Prediction> {
        self.store
            .active_instruments()
            .into_iter()
            .filter(|instrument| mode.includes(self.category(instrument)))
            .filter_map(|instrument| {
                self.predict(&instrument, horizon_secs)
                    .ok()
                    .map(|prediction| (instrument, prediction))
            })
            .collect()
    }

    /// Current directional predictions ranked by quality score, best first.
    pub fn best_opportunities(&self, horizon_secs: u32, mode: MarketMode, limit: usize) -> Vec<Opportunity> {
        let mut opportunities = self
            .predict_mode(horizon_secs, mode)
            .into_values()
            .filter_map(|prediction| {
                let stats = self.tracker.stats(&prediction.instrument);
                let tick_count = self.store.tick_count(&prediction.instrument);
                self.config
                    .ranking
                    .quality_score(
                        &prediction,
                        &stats,
                        tick_count,
                        self.config.tracking.min_trades_for_stats,
                    )
                    .map(|quality_score| Opportunity {
                        quality_score,
                        tick_count,
                        win_rate: stats.win_rate,
                        total_trades: stats.total_trades,
                        prediction,
                    })
            })
            .collect::<Vec<_>>();

        opportunities.sort_by(|a, b| {
            b.quality_score
                .total_cmp(&a.quality_score)
                .then_with(|| a.prediction.instrument.cmp(&b.prediction.instrument))
        });
        opportunities.truncate(limit);
        opportunities
    }

    pub fn stats(&self, instrument: &str) -> Stats {
        self.tracker.stats(instrument)
    }

    pub fn all_stats(&self) -> FnvHashMap<SmolStr, Stats> {
        self.tracker.all_stats()
    }

    pub fn results(&self, instrument: &str) -> Vec<TradeResult> {
        self.tracker.results(instrument)
    }

    pub fn all_results(&self) -> FnvHashMap<SmolStr, Vec<TradeResult>> {
        self.tracker.all_results()
    }

    pub fn pending(&self, instrument: &str) -> Vec<PendingPrediction> {
        self.tracker.pending(instrument)
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        self.tracker.performance_summary()
    }

    /// Spawn the settlement scheduler and the periodic maintenance tasks: cache
    /// cleanup, rate limiter pruning, stats recomputation, prediction retention and
    /// the performance summary.
    ///
    /// The settlement scheduler is only spawned by the first call.
    pub fn spawn_maintenance(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(scheduler) = self.scheduler.lock().take() {
            handles.push(tokio::spawn(scheduler.run()));
        }

        handles.push(self.spawn_periodic(self.config.cache.cleanup_interval_secs, |predictor| {
            let removed = predictor.cache.cleanup_expired();
            debug!(removed, remaining = predictor.cache.len(), "cache cleanup");
        }));

        handles.push(self.spawn_periodic(self.config.rate_limit.prune_interval_secs, |predictor| {
            let removed = predictor.limiter.prune();
            debug!(removed, "rate limiter windows pruned");
        }));

        handles.push(self.spawn_periodic(self.config.tracking.stats_interval_secs, |predictor| {
            predictor.tracker.update_all_stats();
            debug!(pending = predictor.tracker.pending_count(), "stats recomputed");
        }));

        handles.push(self.spawn_periodic(self.config.storage.cleanup_interval_secs, |predictor| {
            let retention = chrono::Duration::hours(predictor.config.storage.prediction_retention_hours);
            let removed = predictor.store.cleanup(retention);
            debug!(removed, "prediction history cleanup");
        }));

        handles.push(self.spawn_periodic(self.config.tracking.summary_interval_secs, |predictor| {
            let summary = predictor.performance_summary();
            info!(
                total_trades = summary.total_trades,
                win_rate = summary.win_rate(),
                profit_loss = summary.total_profit_loss,
                "performance summary\n{summary}"
            );
        }));

        handles
    }

    fn spawn_periodic<F>(self: &Arc<Self>, period_secs: u64, mut task: F) -> JoinHandle<()>
    where
        F: FnMut(&Predictor) + Send + 'static,
    {
        let predictor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(period_secs.max(1)));
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                task(&predictor);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{instrument::SpikeSide, model::Direction, strategy::test_util};
    use chrono::{TimeZone, Utc};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn predictor() -> Predictor {
        Predictor::new(PredictorConfig::default()).unwrap()
    }

    fn feed(predictor: &Predictor, instrument: &str, prices: &[f64]) {
        for tick in test_util::ticks(instrument, prices, 13) {
            predictor.add_tick(tick);
        }
    }

    fn random_walk(instrument: &str, start: f64, max_step: f64, spacing_secs: i64, seed: u64) -> Vec<Tick> {
        let mut rng = StdRng::seed_from_u64(seed);
        let origin = Utc.with_ymd_and_hms(2024, 3, 4, 13, 0, 0).unwrap();
        let mut price = start;
        (0..500)
            .map(|i| {
                price *= 1.0 + rng.random_range(-max_step..max_step);
                Tick::new(instrument, price, origin + chrono::Duration::seconds(i * spacing_secs))
            })
            .collect()
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let mut config = PredictorConfig::default();
        config.storage.max_ticks = 0;

        assert!(matches!(
            Predictor::new(config),
            Err(PredictorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_collecting_data() {
        struct TestCase {
            input: (&'static str, usize, u32),
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: unknown instrument
                input: ("volatility_10_1s", 0, 60),
                expected: "Collecting data: 0/25 ticks (~1 min remaining)",
            },
            TestCase {
                // TC1: partial synthetic window
                input: ("volatility_75_1s", 10, 60),
                expected: "Collecting data: 10/25 ticks (~1 min remaining)",
            },
            TestCase {
                // TC2: forex ticks arrive slowly
                input: ("frxEURUSD", 4, 900),
                expected: "Collecting data: 4/20 ticks (~8 min remaining)",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let predictor = predictor();
            let (instrument, ticks, horizon) = test.input;
            feed(&predictor, instrument, &vec![100.0; ticks]);

            let actual = predictor.predict(instrument, horizon).unwrap();

            assert_eq!(actual.direction, Direction::Neutral, "TC{} failed", index);
            assert_eq!(actual.outcome, DecisionOutcome::InsufficientData, "TC{} failed", index);
            assert_eq!(actual.reason, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_data_quality_issue() {
        let predictor = predictor();
        let now = Utc::now();
        for i in 0..30 {
            predictor.add_tick(Tick::new("volatility_75_1s", 100.0 + i as f64 * 0.01, now));
        }

        let actual = predictor.predict("volatility_75_1s", 60).unwrap();

        assert_eq!(actual.outcome, DecisionOutcome::InsufficientData);
        assert_eq!(
            actual.reason,
            "Data quality issue: insufficient_candles (candles: 1/15)"
        );
    }

    #[test]
    fn test_rate_limit_refuses_before_computation() {
        let predictor = predictor();

        for _ in 0..20 {
            predictor.predict("frxEURUSD", 900).unwrap();
        }

        let error = predictor.predict("frxEURUSD", 900).unwrap_err();
        assert!(error.is_rate_limited());
        assert!(predictor.predict("frxGBPUSD", 900).is_ok());
    }

    #[test]
    fn test_cached_prediction_is_identical() {
        let predictor = predictor();
        // 130 one-second ticks: 26 five-second candles of a frozen feed.
        feed(&predictor, "volatility_75_1s", &vec![100.0; 130]);

        let first = predictor.predict("volatility_75_1s", 60).unwrap();
        let second = predictor.predict("volatility_75_1s", 60).unwrap();

        assert_eq!(first.outcome, DecisionOutcome::UnfavorableConditions);
        assert_eq!(first.data_points, 26);
        assert_eq!(second, first);
        assert_eq!(predictor.store().predictions("volatility_75_1s").len(), 1);
        assert!(predictor.pending("volatility_75_1s").is_empty());
    }

    #[test]
    fn test_predict_mode_and_opportunities() {
        let predictor = predictor();
        feed(&predictor, "volatility_75_1s", &vec![100.0; 130]);
        feed(&predictor, "frxEURUSD", &vec![1.1; 10]);
        feed(&predictor, "crash_500", &vec![1000.0; 10]);

        let all = predictor.predict_all(60);
        assert_eq!(all.len(), 3);

        let forex = predictor.predict_mode(60, MarketMode::Forex);
        assert_eq!(forex.keys().collect::<Vec<_>>(), vec!["frxEURUSD"]);

        assert_eq!(
            predictor.category("crash_500"),
            MarketCategory::CrashBoom(SpikeSide::Crash)
        );
        assert!(predictor.best_opportunities(60, MarketMode::Both, 5).is_empty());
    }

    #[test]
    fn test_explicit_category_tag() {
        let mut config = PredictorConfig::default();
        config
            .instruments
            .insert(SmolStr::new("custom_index"), MarketCategory::Forex);
        let predictor = Predictor::new(config).unwrap();

        assert_eq!(predictor.category("custom_index"), MarketCategory::Forex);
        assert_eq!(
            predictor.add_tick(Tick::new("custom_index", 1.0, Utc::now())),
            MarketCategory::Forex
        );
    }

    #[test]
    fn test_accepted_prediction_is_cached_stored_and_tracked() {
        struct TestCase {
            // instrument, start price, max relative step, tick spacing secs, horizon
            input: (&'static str, f64, f64, i64, u32),
            expected: MarketCategory,
        }

        let tests = vec![
            TestCase {
                // TC0: volatility index on one-second ticks, five-second candles
                input: ("volatility_75_1s", 1000.0, 0.001, 1, 60),
                expected: MarketCategory::Volatility,
            },
            TestCase {
                // TC1: forex pair on fifteen-second ticks, one-minute candles
                input: ("frxEURUSD", 1.1, 0.0002, 15, 900),
                expected: MarketCategory::Forex,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (instrument, start, max_step, spacing, horizon) = test.input;

            let accepted = (0..300).find_map(|seed| {
                let predictor = predictor();
                for tick in random_walk(instrument, start, max_step, spacing, seed) {
                    predictor.add_tick(tick);
                }
                let prediction = predictor.predict(instrument, horizon).unwrap();
                (prediction.outcome == DecisionOutcome::Accepted).then_some((predictor, prediction))
            });
            let Some((predictor, prediction)) = accepted else {
                panic!("TC{} failed: no walk produced an accepted prediction", index);
            };

            assert_eq!(prediction.category, test.expected, "TC{} failed", index);
            assert!(prediction.direction.is_directional(), "TC{} failed", index);

            let min_confidence = predictor
                .config()
                .consensus
                .thresholds(prediction.category)
                .min_confidence;
            assert!(
                prediction.confidence >= min_confidence,
                "TC{} failed: {}",
                index,
                prediction.confidence
            );

            assert!(
                prediction
                    .reason
                    .starts_with(&format!("[{}] ", prediction.category)),
                "TC{} failed: {}",
                index,
                prediction.reason
            );
            assert!(
                prediction
                    .reason
                    .contains(&format!("strategies {}", prediction.direction)),
                "TC{} failed: {}",
                index,
                prediction.reason
            );
            assert!(!prediction.reason.ends_with("[]"), "TC{} failed: {}", index, prediction.reason);

            let latest_price = predictor.store().latest_price(instrument);
            let pending = predictor.pending(instrument);
            assert_eq!(pending.len(), 1, "TC{} failed", index);
            assert_eq!(pending[0].id, prediction.id, "TC{} failed", index);
            assert_eq!(pending[0].direction, prediction.direction, "TC{} failed", index);
            assert_eq!(Some(pending[0].entry_price), latest_price, "TC{} failed", index);
            assert_eq!(
                predictor.store().predictions(instrument),
                vec![prediction.clone()],
                "TC{} failed",
                index
            );

            // Served from cache, neither stored nor tracked again
            assert_eq!(predictor.predict(instrument, horizon).unwrap(), prediction, "TC{} failed", index);
            assert_eq!(predictor.pending(instrument).len(), 1, "TC{} failed", index);
            assert_eq!(predictor.store().predictions(instrument).len(), 1, "TC{} failed", index);
        }
    }
}
