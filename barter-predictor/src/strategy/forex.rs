//! Trending generators for currency pairs.
//!
//! Signals only fire in favourable conditions (calm volatility, non-extreme RSI and
//! an active trading session) and every confidence is scaled by a session multiplier.

use super::{SignalContext, Strategy, capped};
use crate::{
    config::Band,
    indicator::{
        Indicators,
        pivot::{Extremum, find_pivots},
    },
    model::{Direction, StrategySignal},
};
use chrono::Timelike;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Trading session by UTC hour.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display)]
pub enum ForexSession {
    /// 00:00 - 07:00 UTC
    #[display("ASIA")]
    Asian,
    /// 08:00 - 12:00 UTC
    #[display("LONDON")]
    London,
    /// 12:00 - 16:00 UTC
    #[display("OVERLAP")]
    Overlap,
    /// 16:00 - 20:00 UTC
    #[display("NEW-YORK")]
    NewYork,
    #[display("OFF-HOURS")]
    OffHours,
}

impl ForexSession {
    pub fn from_utc_hour(hour: u32) -> Self {
        match hour {
            0..=6 => ForexSession::Asian,
            8..=11 => ForexSession::London,
            12..=15 => ForexSession::Overlap,
            16..=19 => ForexSession::NewYork,
            _ => ForexSession::OffHours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Boost the London/New York overlap above the other active sessions.
    pub boost_overlap: bool,
    /// Penalise the Asian session.
    pub avoid_asian_session: bool,
    pub overlap_multiplier: f64,
    pub active_multiplier: f64,
    pub asian_multiplier: f64,
    pub off_hours_multiplier: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            boost_overlap: true,
            avoid_asian_session: true,
            overlap_multiplier: 1.20,
            active_multiplier: 1.10,
            asian_multiplier: 0.90,
            off_hours_multiplier: 0.85,
        }
    }
}

impl SessionConfig {
    pub fn multiplier(&self, session: ForexSession) -> f64 {
        match session {
            ForexSession::Overlap if self.boost_overlap => self.overlap_multiplier,
            ForexSession::Overlap | ForexSession::London | ForexSession::NewYork => {
                self.active_multiplier
            }
            ForexSession::Asian if self.avoid_asian_session => self.asian_multiplier,
            ForexSession::Asian => 1.0,
            ForexSession::OffHours => self.off_hours_multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ForexConfig {
    /// Samples required, as a multiple of the timeframe RSI period.
    pub min_rsi_periods: usize,
    pub session: SessionConfig,

    pub max_volatility: f64,
    /// RSI must lie within this band (inclusive).
    pub tradeable_rsi: Band,
    pub min_session_multiplier: f64,

    pub trend_weight: f64,
    pub trend_strong_spread: f64,
    pub trend_spread: f64,
    pub trend_bullish_rsi: Band,
    pub trend_bearish_rsi: Band,
    pub trend_strong_momentum: f64,
    pub trend_momentum: f64,
    pub trend_band_position: f64,
    /// Recent moves inspected for consistent price action.
    pub trend_recent_moves: usize,
    pub trend_min_consistent_moves: usize,
    pub trend_min_score: u32,
    pub trend_base_confidence: f64,
    pub trend_score_step: f64,
    /// Horizon at or above which trend confidence is discounted.
    pub trend_long_horizon_secs: u32,
    pub trend_long_horizon_factor: f64,
    pub trend_max_confidence: f64,

    pub crossover_weight: f64,
    /// Samples back at which the previous EMA ordering is read.
    pub crossover_lookback: usize,
    pub crossover_strong_momentum: f64,
    pub crossover_momentum: f64,
    pub crossover_bullish_rsi: Band,
    pub crossover_bearish_rsi: Band,
    pub crossover_overbought: f64,
    pub crossover_oversold: f64,
    pub crossover_min_confirmations: u32,
    pub crossover_base_confidence: f64,
    pub crossover_step: f64,
    pub crossover_max_confidence: f64,

    pub level_weight: f64,
    pub level_pivot_radius: usize,
    pub level_max_levels: usize,
    /// Maximum relative distance from a level to trade it.
    pub level_proximity: f64,
    pub level_touch_tolerance: f64,
    pub level_touch_lookback: usize,
    pub level_support_rsi: f64,
    pub level_support_soft_rsi: f64,
    pub level_resistance_rsi: f64,
    pub level_resistance_soft_rsi: f64,
    /// Momentum band in which a support bounce is turning.
    pub level_support_momentum: Band,
    /// Momentum band in which a resistance rejection is turning.
    pub level_resistance_momentum: Band,
    pub level_band_position: f64,
    pub level_min_strength: u32,
    pub level_base_confidence: f64,
    pub level_step: f64,
    pub level_max_confidence: f64,

    pub continuation_weight: f64,
    pub continuation_momentum: f64,
    pub continuation_strong_momentum: f64,
    pub continuation_bullish_rsi: Band,
    pub continuation_bearish_rsi: Band,
    pub continuation_min_trend_strength: f64,
    pub continuation_base_confidence: f64,
    pub continuation_boost: f64,
    pub continuation_max_confidence: f64,
}

impl Default for ForexConfig {
    fn default() -> Self {
        Self {
            min_rsi_periods: 2,
            session: SessionConfig::default(),

            max_volatility: 0.015,
            tradeable_rsi: Band::new(20.0, 80.0),
            min_session_multiplier: 0.93,

            trend_weight: 0.45,
            trend_strong_spread: 0.008,
            trend_spread: 0.005,
            trend_bullish_rsi: Band::new(52.0, 68.0),
            trend_bearish_rsi: Band::new(32.0, 48.0),
            trend_strong_momentum: 0.005,
            trend_momentum: 0.003,
            trend_band_position: 0.2,
            trend_recent_moves: 10,
            trend_min_consistent_moves: 7,
            trend_min_score: 8,
            trend_base_confidence: 0.65,
            trend_score_step: 0.02,
            trend_long_horizon_secs: 900,
            trend_long_horizon_factor: 0.95,
            trend_max_confidence: 0.88,

            crossover_weight: 0.40,
            crossover_lookback: 15,
            crossover_strong_momentum: 0.006,
            crossover_momentum: 0.004,
            crossover_bullish_rsi: Band::new(48.0, 65.0),
            crossover_bearish_rsi: Band::new(35.0, 52.0),
            crossover_overbought: 70.0,
            crossover_oversold: 30.0,
            crossover_min_confirmations: 7,
            crossover_base_confidence: 0.62,
            crossover_step: 0.02,
            crossover_max_confidence: 0.85,

            level_weight: 0.35,
            level_pivot_radius: 8,
            level_max_levels: 5,
            level_proximity: 0.0015,
            level_touch_tolerance: 0.002,
            level_touch_lookback: 100,
            level_support_rsi: 38.0,
            level_support_soft_rsi: 45.0,
            level_resistance_rsi: 62.0,
            level_resistance_soft_rsi: 55.0,
            level_support_momentum: Band::new(-0.001, 0.003),
            level_resistance_momentum: Band::new(-0.003, 0.001),
            level_band_position: 0.5,
            level_min_strength: 6,
            level_base_confidence: 0.63,
            level_step: 0.02,
            level_max_confidence: 0.80,

            continuation_weight: 0.30,
            continuation_momentum: 0.010,
            continuation_strong_momentum: 0.015,
            continuation_bullish_rsi: Band::new(55.0, 75.0),
            continuation_bearish_rsi: Band::new(25.0, 45.0),
            continuation_min_trend_strength: 0.6,
            continuation_base_confidence: 0.60,
            continuation_boost: 0.05,
            continuation_max_confidence: 0.78,
        }
    }
}

/// Recent swing levels, oldest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyLevels {
    pub support: Vec<f64>,
    pub resistance: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ForexStrategy {
    config: ForexConfig,
}

impl Strategy for ForexStrategy {
    fn analyze(&self, ctx: &SignalContext<'_>) -> Vec<StrategySignal> {
        if ctx.prices.len() < ctx.timeframe.rsi_period * self.config.min_rsi_periods {
            return Vec::new();
        }

        let session = self.session_multiplier(ctx);
        if !self.is_favourable(ctx.indicators, session) {
            return Vec::new();
        }

        [
            self.strong_trend(ctx, session),
            self.confirmed_crossover(ctx, session),
            self.support_resistance(ctx),
            self.momentum_continuation(ctx.indicators, session),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl ForexStrategy {
    pub fn new(config: ForexConfig) -> Self {
        Self { config }
    }

    fn session_multiplier(&self, ctx: &SignalContext<'_>) -> f64 {
        ctx.last_timestamp()
            .map(|timestamp| {
                self.config
                    .session
                    .multiplier(ForexSession::from_utc_hour(timestamp.hour()))
            })
            .unwrap_or(self.config.session.off_hours_multiplier)
    }

    fn is_favourable(&self, ind: &Indicators, session: f64) -> bool {
        ind.volatility <= self.config.max_volatility
            && self.config.tradeable_rsi.contains(ind.rsi)
            && session >= self.config.min_session_multiplier
    }

    fn strong_trend(&self, ctx: &SignalContext<'_>, session: f64) -> Option<StrategySignal> {
        let config = &self.config;
        let ind = ctx.indicators;

        let (direction, score) = if ind.bullish_alignment() {
            let spread = (ind.ema_fast - ind.ema_trend) / ind.ema_trend;
            let score = 3
                + tier(spread, config.trend_strong_spread, config.trend_spread)
                + if config.trend_bullish_rsi.strictly_contains(ind.rsi) { 2 } else { 0 }
                + tier(ind.momentum, config.trend_strong_momentum, config.trend_momentum)
                + u32::from(ind.bb_position > config.trend_band_position)
                + u32::from(self.consistent_moves(ctx.prices, |from, to| to > from));
            (Direction::Up, score)
        } else if ind.bearish_alignment() {
            let spread = (ind.ema_trend - ind.ema_fast) / ind.ema_trend;
            let score = 3
                + tier(spread, config.trend_strong_spread, config.trend_spread)
                + if config.trend_bearish_rsi.strictly_contains(ind.rsi) { 2 } else { 0 }
                + tier(-ind.momentum, config.trend_strong_momentum, config.trend_momentum)
                + u32::from(ind.bb_position < -config.trend_band_position)
                + u32::from(self.consistent_moves(ctx.prices, |from, to| to < from));
            (Direction::Down, score)
        } else {
            return None;
        };

        if score < config.trend_min_score {
            return None;
        }

        let mut confidence = (config.trend_base_confidence
            + (score - config.trend_min_score) as f64 * config.trend_score_step)
            * session;
        if ctx.horizon_secs >= config.trend_long_horizon_secs {
            confidence *= config.trend_long_horizon_factor;
        }

        let label = if direction == Direction::Up { "uptrend" } else { "downtrend" };
        Some(capped(
            "StrongTrend",
            direction,
            confidence,
            config.trend_max_confidence,
            config.trend_weight,
            format!("Very strong {} (score: {}/12)", label, score),
        ))
    }

    /// At least `trend_min_consistent_moves` of the last `trend_recent_moves` moves
    /// satisfy `moved`.
    fn consistent_moves(&self, prices: &[f64], moved: impl Fn(f64, f64) -> bool) -> bool {
        let start = prices.len().saturating_sub(self.config.trend_recent_moves + 1);
        let count = prices[start..]
            .windows(2)
            .filter(|pair| moved(pair[0], pair[1]))
            .count();
        count >= self.config.trend_min_consistent_moves
    }

    fn confirmed_crossover(&self, ctx: &SignalContext<'_>, session: f64) -> Option<StrategySignal> {
        let config = &self.config;
        if ctx.prices.len() < ctx.timeframe.rsi_period + config.crossover_lookback {
            return None;
        }

        let ind = ctx.indicators;
        let previous = ctx.indicators_before(
            config.crossover_lookback,
            &ctx.indicator_config.for_timeframe(ctx.timeframe),
        );

        let (direction, confirmations) =
            if ind.ema_fast > ind.ema_slow && previous.ema_fast <= previous.ema_slow {
                let confirmations = tier3(ind.momentum, config.crossover_strong_momentum, config.crossover_momentum)
                    + if config.crossover_bullish_rsi.strictly_contains(ind.rsi) { 2 } else { 0 }
                    + if ind.ema_slow > ind.ema_trend { 2 } else { 0 }
                    + u32::from(ind.bb_position > 0.0)
                    + u32::from(ind.rsi < config.crossover_overbought);
                (Direction::Up, confirmations)
            } else if ind.ema_fast < ind.ema_slow && previous.ema_fast >= previous.ema_slow {
                let confirmations = tier3(-ind.momentum, config.crossover_strong_momentum, config.crossover_momentum)
                    + if config.crossover_bearish_rsi.strictly_contains(ind.rsi) { 2 } else { 0 }
                    + if ind.ema_slow < ind.ema_trend { 2 } else { 0 }
                    + u32::from(ind.bb_position < 0.0)
                    + u32::from(ind.rsi > config.crossover_oversold);
                (Direction::Down, confirmations)
            } else {
                return None;
            };

        if confirmations < config.crossover_min_confirmations {
            return None;
        }

        let confidence = (config.crossover_base_confidence
            + (confirmations - config.crossover_min_confirmations) as f64 * config.crossover_step)
            * session;
        let label = if direction == Direction::Up { "Bullish" } else { "Bearish" };
        Some(capped(
            "ConfirmedCrossover",
            direction,
            confidence,
            config.crossover_max_confidence,
            config.crossover_weight,
            format!("{} crossover confirmed ({}/9)", label, confirmations),
        ))
    }

    /// Swing levels within the last `lookback` samples; at most `level_max_levels`
    /// of each kind, most recent kept.
    pub fn key_levels(&self, prices: &[f64], lookback: usize) -> KeyLevels {
        let recent = &prices[prices.len() - lookback.min(prices.len())..];
        let pivots = find_pivots(
            recent,
            recent.len(),
            self.config.level_pivot_radius,
            Extremum::Inclusive,
        );

        let keep = |levels: Vec<f64>| {
            let skip = levels.len().saturating_sub(self.config.level_max_levels);
            levels.into_iter().skip(skip).collect::<Vec<_>>()
        };

        KeyLevels {
            support: keep(pivots.lows.into_iter().map(|pivot| pivot.value).collect()),
            resistance: keep(pivots.highs.into_iter().map(|pivot| pivot.value).collect()),
        }
    }

    fn touches(&self, prices: &[f64], level: f64) -> usize {
        let start = prices.len().saturating_sub(self.config.level_touch_lookback);
        prices[start..]
            .iter()
            .filter(|price| ((*price - level) / level).abs() < self.config.level_touch_tolerance)
            .count()
    }

    fn support_resistance(&self, ctx: &SignalContext<'_>) -> Option<StrategySignal> {
        let config = &self.config;
        let ind = ctx.indicators;
        let price = ctx.price();
        let levels = self.key_levels(ctx.prices, ctx.timeframe.lookback);

        let near = |level: &f64| *level != 0.0 && ((price - level) / level).abs() < config.level_proximity;
        let touch_score = |touches: usize| match touches {
            0..=1 => 0,
            2 => 2,
            _ => 3,
        };
        let signal = |direction, strength: u32, reason: String| {
            let confidence = config.level_base_confidence
                + (strength - config.level_min_strength) as f64 * config.level_step;
            capped(
                "SupportResistance",
                direction,
                confidence,
                config.level_max_confidence,
                config.level_weight,
                reason,
            )
        };

        for level in levels.support.iter().filter(|level| near(level)) {
            let touches = self.touches(ctx.prices, *level);
            let strength = touch_score(touches)
                + tier_below(ind.rsi, config.level_support_rsi, config.level_support_soft_rsi)
                + if config.level_support_momentum.strictly_contains(ind.momentum) { 2 } else { 0 }
                + u32::from(ind.bb_position < -config.level_band_position);
            if strength >= config.level_min_strength {
                return Some(signal(
                    Direction::Up,
                    strength,
                    format!("Strong support bounce ({} touches)", touches),
                ));
            }
        }

        for level in levels.resistance.iter().filter(|level| near(level)) {
            let touches = self.touches(ctx.prices, *level);
            let strength = touch_score(touches)
                + tier(ind.rsi, config.level_resistance_rsi, config.level_resistance_soft_rsi)
                + if config.level_resistance_momentum.strictly_contains(ind.momentum) { 2 } else { 0 }
                + u32::from(ind.bb_position > config.level_band_position);
            if strength >= config.level_min_strength {
                return Some(signal(
                    Direction::Down,
                    strength,
                    format!("Strong resistance rejection ({} touches)", touches),
                ));
            }
        }

        None
    }

    fn momentum_continuation(&self, ind: &Indicators, session: f64) -> Option<StrategySignal> {
        let config = &self.config;

        let (direction, strong, reason) = if ind.momentum > config.continuation_momentum
            && config.continuation_bullish_rsi.strictly_contains(ind.rsi)
            && ind.ema_fast > ind.ema_slow
            && ind.trend_strength > config.continuation_min_trend_strength
        {
            (
                Direction::Up,
                ind.momentum > config.continuation_strong_momentum,
                "Strong upward momentum continuation",
            )
        } else if ind.momentum < -config.continuation_momentum
            && config.continuation_bearish_rsi.strictly_contains(ind.rsi)
            && ind.ema_fast < ind.ema_slow
            && ind.trend_strength > config.continuation_min_trend_strength
        {
            (
                Direction::Down,
                ind.momentum < -config.continuation_strong_momentum,
                "Strong downward momentum continuation",
            )
        } else {
            return None;
        };

        let boost = if strong { config.continuation_boost } else { 0.0 };
        Some(capped(
            "MomentumContinuation",
            direction,
            config.continuation_base_confidence * session + boost,
            config.continuation_max_confidence,
            config.continuation_weight,
            reason,
        ))
    }
}

/// 2 above `strong`, 1 above `weak`, else 0.
fn tier(value: f64, strong: f64, weak: f64) -> u32 {
    if value > strong {
        2
    } else if value > weak {
        1
    } else {
        0
    }
}

/// 3 above `strong`, 2 above `weak`, else 0.
fn tier3(value: f64, strong: f64, weak: f64) -> u32 {
    if value > strong {
        3
    } else if value > weak {
        2
    } else {
        0
    }
}

/// 2 below `strong`, 1 below `weak`, else 0.
fn tier_below(value: f64, strong: f64, weak: f64) -> u32 {
    if value < strong {
        2
    } else if value < weak {
        1
    } else {
        0
    }
}
