use crate::{
    candle::TimeframeConfig,
    config::PredictorConfig,
    indicator::{
        IndicatorConfig, Indicators,
        divergence::{Divergence, DivergenceConfig, DivergenceKind, detect_divergence},
        pattern::{ChartPattern, PatternConfig, detect_pattern},
    },
    instrument::MarketCategory,
    model::{Direction, StrategySignal, Tick},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Spike-cyclical (crash/boom) signal generators.
pub mod crash_boom;

/// Trending (forex) signal generators.
pub mod forex;

/// Range-bound (volatility index) signal generators.
pub mod volatility;

/// Inputs shared by every signal generator for one prediction cycle.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub instrument: &'a str,
    pub category: MarketCategory,
    pub horizon_secs: u32,
    /// Analysed samples (candle closes), oldest first.
    pub ticks: &'a [Tick],
    /// Prices of `ticks`.
    pub prices: &'a [f64],
    pub indicators: &'a Indicators,
    pub indicator_config: &'a IndicatorConfig,
    pub timeframe: &'a TimeframeConfig,
}

impl SignalContext<'_> {
    pub fn price(&self) -> f64 {
        self.prices.last().copied().unwrap_or_default()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.ticks.last().map(|tick| tick.timestamp)
    }

    /// Indicators as they stood `samples` samples ago.
    pub fn indicators_before(&self, samples: usize, config: &IndicatorConfig) -> Indicators {
        let end = self.prices.len().saturating_sub(samples);
        Indicators::compute(&self.prices[..end], config)
    }
}

/// Category signal generator set. Each generator contributes at most one signal.
pub trait Strategy {
    fn analyze(&self, ctx: &SignalContext<'_>) -> Vec<StrategySignal>;
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrossSignalConfig {
    pub divergence_weight: f64,
    pub pattern_weight: f64,
    pub divergence: DivergenceConfig,
    pub pattern: PatternConfig,
}

impl Default for CrossSignalConfig {
    fn default() -> Self {
        Self {
            divergence_weight: 0.55,
            pattern_weight: 0.45,
            divergence: DivergenceConfig::default(),
            pattern: PatternConfig::default(),
        }
    }
}

/// Every generator, dispatched by market category.
#[derive(Debug, Clone)]
pub struct StrategySet {
    volatility: volatility::VolatilityStrategy,
    crash_boom: crash_boom::CrashBoomStrategy,
    forex: forex::ForexStrategy,
    cross: CrossSignalConfig,
}

impl StrategySet {
    pub fn new(config: &PredictorConfig) -> Self {
        Self {
            volatility: volatility::VolatilityStrategy::new(config.volatility.clone()),
            crash_boom: crash_boom::CrashBoomStrategy::new(config.crash_boom.clone()),
            forex: forex::ForexStrategy::new(config.forex.clone()),
            cross: config.cross_signals.clone(),
        }
    }

    /// Divergence and chart pattern signals, which apply to every category.
    pub fn cross_signals(&self, ctx: &SignalContext<'_>) -> Vec<StrategySignal> {
        let divergence = detect_divergence(
            ctx.prices,
            ctx.indicator_config.rsi_period,
            &self.cross.divergence,
        )
        .map(|divergence| divergence_signal(&divergence, self.cross.divergence_weight));

        let pattern = detect_pattern(ctx.prices, &self.cross.pattern)
            .map(|pattern| pattern_signal(&pattern, self.cross.pattern_weight));

        divergence.into_iter().chain(pattern).collect()
    }

    /// Signals from the generator set owned by the context's category.
    pub fn category_signals(&self, ctx: &SignalContext<'_>) -> Vec<StrategySignal> {
        self.strategy(ctx.category).analyze(ctx)
    }

    /// Cross-cutting signals first, then category signals.
    pub fn signals(&self, ctx: &SignalContext<'_>) -> Vec<StrategySignal> {
        let mut signals = self.cross_signals(ctx);
        signals.extend(self.category_signals(ctx));
        signals
    }

    fn strategy(&self, category: MarketCategory) -> &dyn Strategy {
        match category {
            MarketCategory::Volatility => &self.volatility,
            MarketCategory::CrashBoom(_) => &self.crash_boom,
            MarketCategory::Forex => &self.forex,
        }
    }
}

pub fn divergence_signal(divergence: &Divergence, weight: f64) -> StrategySignal {
    let reason = match divergence.kind {
        DivergenceKind::Bullish => format!(
            "Bullish RSI divergence ({:.0}% strength)",
            divergence.strength * 100.0
        ),
        DivergenceKind::Bearish => format!(
            "Bearish RSI divergence ({:.0}% strength)",
            divergence.strength * 100.0
        ),
        DivergenceKind::HiddenBullish => "Hidden bullish divergence (trend continuation)".to_string(),
        DivergenceKind::HiddenBearish => "Hidden bearish divergence (trend continuation)".to_string(),
    };

    StrategySignal::new(
        "RSI_Divergence",
        divergence.kind.direction(),
        divergence.confidence,
        weight,
        reason,
    )
}

pub fn pattern_signal(pattern: &ChartPattern, weight: f64) -> StrategySignal {
    StrategySignal::new(
        "Advanced_Pattern",
        pattern.kind.direction(),
        pattern.confidence,
        weight,
        format!(
            "{} pattern detected ({:.0}% quality)",
            pattern.kind,
            pattern.strength * 100.0
        ),
    )
}

/// Signal carrying `confidence` capped at `ceiling`.
pub(crate) fn capped(
    name: &'static str,
    direction: Direction,
    confidence: f64,
    ceiling: f64,
    weight: f64,
    reason: impl Into<String>,
) -> StrategySignal {
    StrategySignal::new(name, direction, confidence.min(ceiling), weight, reason)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use chrono::TimeZone;

    pub fn ticks(instrument: &str, prices: &[f64], start_hour: u32) -> Vec<Tick> {
        let start = Utc
            .with_ymd_and_hms(2024, 3, 4, start_hour, 0, 0)
            .unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, price)| Tick::new(instrument, *price, start + chrono::Duration::seconds(i as i64)))
            .collect()
    }
}
