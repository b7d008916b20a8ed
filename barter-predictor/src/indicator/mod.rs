use crate::candle::TimeframeConfig;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Pure indicator functions over price slices.
pub mod calc;

/// RSI divergence detection.
pub mod divergence;

/// Chart pattern recognition.
pub mod pattern;

/// Swing point detection.
pub mod pivot;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    /// Half-width of the fallback band used when too few samples exist.
    pub bb_fallback_pct: f64,
    pub volatility_period: usize,
    pub momentum_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_overbought: 72.0,
            rsi_oversold: 28.0,
            ema_fast: 9,
            ema_slow: 21,
            ema_trend: 50,
            bb_period: 20,
            bb_std_dev: 2.0,
            bb_fallback_pct: 0.03,
            volatility_period: 20,
            momentum_period: 10,
        }
    }
}

impl IndicatorConfig {
    /// Indicator settings driven by a timeframe: RSI and EMA periods come from the
    /// timeframe, and momentum is measured over the RSI period. Band settings and
    /// thresholds are kept.
    pub fn for_timeframe(&self, timeframe: &TimeframeConfig) -> Self {
        Self {
            rsi_period: timeframe.rsi_period,
            ema_fast: timeframe.ema_fast,
            ema_slow: timeframe.ema_slow,
            ema_trend: timeframe.ema_trend,
            momentum_period: timeframe.rsi_period,
            ..self.clone()
        }
    }
}

/// Indicator snapshot for the most recent sample of a price series.
#[derive(Debug, Copy, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Indicators {
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub ema_trend: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    /// Position within the bands, in [-1, 1].
    pub bb_position: f64,
    pub volatility: f64,
    /// Percent change over the momentum period.
    pub momentum: f64,
    pub trend_strength: f64,
}

impl Indicators {
    /// Compute every indicator over `prices` (oldest first). Empty input yields an
    /// all-zero snapshot.
    pub fn compute(prices: &[f64], config: &IndicatorConfig) -> Self {
        let Some(&price) = prices.last() else {
            return Self::default();
        };

        let bands = calc::bollinger(prices, config.bb_period, config.bb_std_dev, config.bb_fallback_pct);
        let ema_fast = calc::ema(prices, config.ema_fast);
        let ema_slow = calc::ema(prices, config.ema_slow);
        let ema_trend = calc::ema(prices, config.ema_trend);

        let trend_strength = if prices.len() < calc::MIN_SAMPLES {
            0.0
        } else {
            calc::trend_strength(price, ema_fast, ema_slow, ema_trend)
        };

        Self {
            rsi: calc::rsi(prices, config.rsi_period),
            ema_fast,
            ema_slow,
            ema_trend,
            bb_upper: bands.upper,
            bb_middle: bands.middle,
            bb_lower: bands.lower,
            bb_position: calc::bb_position(price, &bands),
            volatility: calc::volatility(prices, config.volatility_period),
            momentum: calc::momentum(prices, config.momentum_period),
            trend_strength,
        }
    }

    /// EMAs stacked fast > slow > trend.
    pub fn bullish_alignment(&self) -> bool {
        self.ema_fast > self.ema_slow && self.ema_slow > self.ema_trend
    }

    /// EMAs stacked fast < slow < trend.
    pub fn bearish_alignment(&self) -> bool {
        self.ema_fast < self.ema_slow && self.ema_slow < self.ema_trend
    }
}

/// Shape of the last five samples.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum TickPattern {
    #[display("double_bottom")]
    DoubleBottom,
    #[display("double_top")]
    DoubleTop,
    #[display("strong_uptrend")]
    StrongUptrend,
    #[display("strong_downtrend")]
    StrongDowntrend,
    #[display("consolidation")]
    Consolidation,
    #[display("insufficient_data")]
    InsufficientData,
}

impl TickPattern {
    const WINDOW: usize = 5;
    /// Maximum relative gap between the two matching extremes of a double top/bottom.
    const DOUBLE_TOLERANCE: f64 = 0.001;

    pub fn detect(prices: &[f64]) -> Self {
        let [r0, r1, r2, r3, r4] = match prices {
            [.., a, b, c, d, e] => [*a, *b, *c, *d, *e],
            _ => return TickPattern::InsufficientData,
        };
        let matching = (r0 - r2).abs() < r0 * Self::DOUBLE_TOLERANCE;

        if r0 < r1 && r1 > r2 && r2 < r3 && r3 > r4 && matching {
            return TickPattern::DoubleBottom;
        }
        if r0 > r1 && r1 < r2 && r2 > r3 && r3 < r4 && matching {
            return TickPattern::DoubleTop;
        }

        let up_moves = prices[prices.len() - Self::WINDOW..]
            .windows(2)
            .filter(|pair| pair[1] > pair[0])
            .count();

        match up_moves {
            0 => TickPattern::StrongDowntrend,
            moves if moves >= Self::WINDOW - 1 => TickPattern::StrongUptrend,
            _ => TickPattern::Consolidation,
        }
    }
}
