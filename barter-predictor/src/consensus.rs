//! Weighted consensus over every strategy signal.
//!
//! A request walks `InsufficientData -> UnfavorableConditions -> NoSignals ->
//! WeakConsensus -> FilteredOut -> Accepted`, stopping at the first state that
//! rejects it. Rejections are never errors: they produce a neutral [`Prediction`]
//! carrying the terminal [`DecisionOutcome`] and a human-readable reason.

use crate::{
    candle::TimeframeConfig,
    config::{Band, HorizonTiers, PredictorConfig},
    indicator::{IndicatorConfig, Indicators},
    instrument::MarketCategory,
    model::{DecisionOutcome, Direction, Prediction, StrategySignal, Tick},
    strategy::{SignalContext, StrategySet},
};
use derive_more::Constructor;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::trace;

/// Post-vote sanity checks. `None` disables a check.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityFilters {
    /// Minimum |EMA fast - EMA trend| / EMA trend.
    pub min_ema_separation: Option<f64>,
    /// UP is refused above `high`, DOWN below `low`.
    pub rsi_extreme_guard: Option<Band>,
    /// Largest momentum (percent) tolerated against the direction.
    pub max_counter_momentum: Option<f64>,
    /// Maximum volatility / BB middle.
    pub max_volatility_ratio: Option<f64>,
}

impl Default for QualityFilters {
    fn default() -> Self {
        Self {
            min_ema_separation: Some(0.0),
            rsi_extreme_guard: Some(Band::new(15.0, 85.0)),
            max_counter_momentum: Some(1.0),
            max_volatility_ratio: Some(0.03),
        }
    }
}

impl QualityFilters {
    pub fn check(&self, direction: Direction, ind: &Indicators) -> Result<(), Rejection> {
        let filtered = |reason: String| Err(Rejection::new(DecisionOutcome::FilteredOut, reason));

        if let Some(min) = self.min_ema_separation.filter(|_| ind.ema_trend != 0.0) {
            let separation = (ind.ema_fast - ind.ema_trend).abs() / ind.ema_trend;
            if separation < min {
                return filtered(format!(
                    "Trend unclear: EMA separation {:.4}% below {:.4}%",
                    separation * 100.0,
                    min * 100.0
                ));
            }
        }

        if let Some(guard) = self.rsi_extreme_guard {
            match direction {
                Direction::Up if ind.rsi > guard.high => {
                    return filtered(format!("RSI {:.1} too overbought for UP", ind.rsi));
                }
                Direction::Down if ind.rsi < guard.low => {
                    return filtered(format!("RSI {:.1} too oversold for DOWN", ind.rsi));
                }
                _ => {}
            }
        }

        if let Some(max) = self.max_counter_momentum {
            let against = match direction {
                Direction::Up => -ind.momentum,
                Direction::Down => ind.momentum,
                Direction::Neutral => 0.0,
            };
            if against > max {
                return filtered(format!(
                    "Momentum {:+.2}% contradicts {}",
                    ind.momentum, direction
                ));
            }
        }

        if let Some(max) = self.max_volatility_ratio.filter(|_| ind.bb_middle != 0.0) {
            let ratio = ind.volatility / ind.bb_middle;
            if ratio > max {
                return filtered(format!(
                    "Volatility ratio {:.4} above {:.4} ceiling",
                    ratio, max
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CategoryThresholds {
    /// Share of directional votes the majority side must reach.
    pub agreement: f64,
    pub min_confidence: f64,
    /// Pre-filter ceiling for volatility, relative to the BB middle.
    pub volatility_ceiling: f64,
    /// Candle samples required before any strategy runs, keyed by horizon.
    pub min_candles: HorizonTiers<usize>,
    pub filters: QualityFilters,
}

impl CategoryThresholds {
    pub fn synthetic() -> Self {
        Self {
            agreement: 0.40,
            min_confidence: 0.52,
            volatility_ceiling: 0.08,
            min_candles: HorizonTiers::new([(30, 20), (60, 25), (120, 30)], 35),
            filters: QualityFilters::default(),
        }
    }

    pub fn forex() -> Self {
        Self {
            volatility_ceiling: 0.10,
            min_candles: HorizonTiers::new([(900, 20), (1800, 25)], 30),
            filters: QualityFilters {
                max_volatility_ratio: Some(0.025),
                ..QualityFilters::default()
            },
            ..Self::synthetic()
        }
    }
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self::synthetic()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub volatility: CategoryThresholds,
    pub crash_boom: CategoryThresholds,
    pub forex: CategoryThresholds,
    /// Trailing samples inspected for a frozen feed.
    pub frozen_window: usize,
    /// Relative band around the first sample within which the window counts as frozen.
    pub frozen_tolerance: f64,
    /// Candles needed, as a multiple of the timeframe minimum, for the abundance boost.
    pub abundance_multiple: usize,
    pub abundance_boost: f64,
    pub abundance_cap: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            volatility: CategoryThresholds::synthetic(),
            crash_boom: CategoryThresholds::synthetic(),
            forex: CategoryThresholds::forex(),
            frozen_window: 8,
            frozen_tolerance: 0.00005,
            abundance_multiple: 2,
            abundance_boost: 1.05,
            abundance_cap: 0.95,
        }
    }
}

impl ConsensusConfig {
    pub fn thresholds(&self, category: MarketCategory) -> &CategoryThresholds {
        match category {
            MarketCategory::Volatility => &self.volatility,
            MarketCategory::CrashBoom(_) => &self.crash_boom,
            MarketCategory::Forex => &self.forex,
        }
    }

    /// Confidence after the abundant-data boost, applied when `candles` reaches
    /// `abundance_multiple` times the timeframe minimum.
    pub fn boosted(&self, confidence: f64, candles: usize, min_candles: usize) -> f64 {
        if candles >= min_candles * self.abundance_multiple {
            (confidence * self.abundance_boost).min(self.abundance_cap)
        } else {
            confidence
        }
    }
}

/// Terminal non-accepted state of a prediction request.
#[derive(Debug, Clone, PartialEq, Constructor)]
pub struct Rejection {
    pub outcome: DecisionOutcome,
    pub reason: String,
}

/// Winning side of a successful vote.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub direction: Direction,
    /// Weighted mean confidence of the winning side.
    pub confidence: f64,
    pub votes: usize,
    pub total_votes: usize,
    /// `votes / total_votes`
    pub agreement: f64,
    /// `Name(C%)` for every winning signal.
    pub contributors: Vec<String>,
}

#[derive(Debug, Default)]
struct Side {
    votes: usize,
    weighted: f64,
    weight: f64,
    contributors: Vec<String>,
}

impl Side {
    fn add(&mut self, signal: &StrategySignal) {
        self.votes += 1;
        self.weighted += signal.confidence * signal.weight;
        self.weight += signal.weight;
        self.contributors
            .push(format!("{}({:.0}%)", signal.name, signal.confidence * 100.0));
    }

    fn confidence(&self) -> f64 {
        if self.weight == 0.0 {
            0.0
        } else {
            self.weighted / self.weight
        }
    }
}

/// Majority vote by signal count. The majority wins when its share of the
/// directional votes reaches `agreement`; ties never win.
pub fn vote(signals: &[StrategySignal], agreement: f64) -> Result<Consensus, Rejection> {
    let (mut up, mut down) = (Side::default(), Side::default());
    for signal in signals {
        match signal.direction {
            Direction::Up => up.add(signal),
            Direction::Down => down.add(signal),
            Direction::Neutral => {}
        }
    }

    let total_votes = up.votes + down.votes;
    if total_votes == 0 {
        return Err(Rejection::new(
            DecisionOutcome::NoSignals,
            "No directional signals".to_string(),
        ));
    }

    let (direction, winner) = match up.votes.cmp(&down.votes) {
        std::cmp::Ordering::Greater => (Direction::Up, up),
        std::cmp::Ordering::Less => (Direction::Down, down),
        std::cmp::Ordering::Equal => {
            return Err(conflicting(up.votes, down.votes));
        }
    };

    let ratio = winner.votes as f64 / total_votes as f64;
    if ratio < agreement {
        let (up_votes, down_votes) = match direction {
            Direction::Up => (winner.votes, total_votes - winner.votes),
            _ => (total_votes - winner.votes, winner.votes),
        };
        return Err(conflicting(up_votes, down_votes));
    }

    Ok(Consensus {
        direction,
        confidence: winner.confidence(),
        votes: winner.votes,
        total_votes,
        agreement: ratio,
        contributors: winner.contributors,
    })
}

fn conflicting(up: usize, down: usize) -> Rejection {
    Rejection::new(
        DecisionOutcome::WeakConsensus,
        format!("Conflicting signals: {} UP vs {} DOWN", up, down),
    )
}

/// Runs indicators, strategies and the vote over one analysed series.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    strategies: StrategySet,
    indicators: IndicatorConfig,
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: &PredictorConfig) -> Self {
        Self {
            strategies: StrategySet::new(config),
            indicators: config.indicators.clone(),
            config: config.consensus.clone(),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Produce a prediction from `ticks` (candle closes, oldest first).
    pub fn evaluate(
        &self,
        instrument: &SmolStr,
        category: MarketCategory,
        horizon_secs: u32,
        ticks: &[Tick],
        timeframe: &TimeframeConfig,
    ) -> Prediction {
        let thresholds = self.config.thresholds(category);
        let mut prediction = Prediction::neutral(
            instrument.clone(),
            category,
            horizon_secs,
            ticks.len(),
            DecisionOutcome::Accepted,
            "",
        );

        let min_required = *thresholds.min_candles.select(horizon_secs);
        if ticks.len() < min_required {
            return prediction.reject(
                DecisionOutcome::InsufficientData,
                format!(
                    "Collecting data: {}/{} ticks needed (~{} min)",
                    ticks.len(),
                    min_required,
                    (min_required - ticks.len()) / 2
                ),
            );
        }

        let prices = ticks.iter().map(|tick| tick.price).collect::<Vec<_>>();
        let indicators = Indicators::compute(&prices, &self.indicators);
        prediction.indicators = indicators;
        prediction.current_price = prices.last().copied().unwrap_or_default();

        if let Err(rejection) = self.pre_filter(&prices, &indicators, category, thresholds) {
            return prediction.reject(rejection.outcome, rejection.reason);
        }

        let ctx = SignalContext {
            instrument: instrument.as_str(),
            category,
            horizon_secs,
            ticks,
            prices: &prices,
            indicators: &indicators,
            indicator_config: &self.indicators,
            timeframe,
        };
        let signals = self.strategies.signals(&ctx);
        if signals.is_empty() {
            return prediction.reject(DecisionOutcome::NoSignals, "No trading signals generated");
        }

        match self.decide(category, &signals, &indicators, thresholds) {
            Ok(consensus) => {
                prediction.direction = consensus.direction;
                prediction.confidence = consensus.confidence;
                prediction.reason = format!(
                    "[{}] {}/{} strategies {} ({:.0}% agreement): [{}]",
                    category,
                    consensus.votes,
                    consensus.total_votes,
                    consensus.direction,
                    consensus.agreement * 100.0,
                    consensus.contributors.iter().join(" ")
                );
                prediction
            }
            Err(rejection) => prediction.reject(rejection.outcome, rejection.reason),
        }
    }

    /// Refuse frozen feeds and volatility above the category ceiling.
    fn pre_filter(
        &self,
        prices: &[f64],
        ind: &Indicators,
        category: MarketCategory,
        thresholds: &CategoryThresholds,
    ) -> Result<(), Rejection> {
        let unfavourable =
            |reason: String| Err(Rejection::new(DecisionOutcome::UnfavorableConditions, reason));
        let unstable = "Market conditions too unstable".to_string();

        if self.config.frozen_window > 0 && prices.len() >= self.config.frozen_window {
            let recent = &prices[prices.len() - self.config.frozen_window..];
            let first = recent[0];
            let tolerance = first * self.config.frozen_tolerance;
            if recent.iter().all(|price| (price - first).abs() <= tolerance) {
                return unfavourable(unstable);
            }
        }

        if ind.volatility > ind.bb_middle * thresholds.volatility_ceiling {
            return if category.is_forex() {
                unfavourable(format!(
                    "Extreme market volatility ({:.5}) - too dangerous",
                    ind.volatility
                ))
            } else {
                unfavourable(unstable)
            };
        }

        Ok(())
    }

    fn decide(
        &self,
        category: MarketCategory,
        signals: &[StrategySignal],
        ind: &Indicators,
        thresholds: &CategoryThresholds,
    ) -> Result<Consensus, Rejection> {
        let consensus = vote(signals, thresholds.agreement)?;
        thresholds.filters.check(consensus.direction, ind)?;

        if consensus.confidence < thresholds.min_confidence {
            return Err(Rejection::new(
                DecisionOutcome::WeakConsensus,
                format!(
                    "Confidence {:.1}% below {:.1}% minimum",
                    consensus.confidence * 100.0,
                    thresholds.min_confidence * 100.0
                ),
            ));
        }

        trace!(
            %category,
            direction = %consensus.direction,
            confidence = consensus.confidence,
            "consensus reached"
        );
        Ok(consensus)
    }
}
