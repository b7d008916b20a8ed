//! Range-bound generators for volatility indices: mean reversion at the band
//! extremes, EMA momentum alignment, Bollinger Band extremes and squeezes, extreme
//! RSI and fresh EMA crossovers.

use super::{SignalContext, Strategy};
use crate::{
    config::Band,
    indicator::{Indicators, TickPattern},
    model::{Direction, StrategySignal},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VolatilityConfig {
    /// Samples required, as a multiple of the RSI period.
    pub min_rsi_periods: usize,

    pub mean_reversion_weight: f64,
    pub momentum_weight: f64,
    pub bollinger_weight: f64,
    pub rsi_weight: f64,
    pub crossover_weight: f64,

    /// |BB position| beyond which price is stretched enough to revert.
    pub reversion_band_position: f64,
    pub reversion_confidence: f64,
    /// Confidence when the last five samples form a matching double bottom/top.
    pub reversion_pattern_confidence: f64,
    pub reversion_extreme_rsi_low: f64,
    pub reversion_extreme_rsi_high: f64,
    pub reversion_extreme_band_position: f64,
    pub reversion_extreme_boost: f64,
    pub reversion_momentum_turn: f64,
    pub reversion_momentum_boost: f64,

    pub momentum_bullish_rsi: Band,
    pub momentum_bearish_rsi: Band,
    pub momentum_threshold: f64,
    pub momentum_confidence: f64,
    pub momentum_strong_trend: f64,
    pub momentum_strong_confidence: f64,
    pub momentum_ema_spread: f64,
    pub momentum_spread_boost: f64,

    pub band_extreme_position: f64,
    pub band_confidence: f64,
    pub band_rsi_low: f64,
    pub band_rsi_high: f64,
    pub band_rsi_boost: f64,
    /// Band width relative to the middle below which the bands are squeezed.
    pub squeeze_width: f64,
    pub squeeze_momentum: f64,
    pub squeeze_confidence: f64,

    pub rsi_oversold_extreme: f64,
    pub rsi_overbought_extreme: f64,
    pub rsi_very_oversold: f64,
    pub rsi_very_overbought: f64,
    pub rsi_confidence: f64,
    pub rsi_very_confidence: f64,
    pub rsi_turn_lookback: usize,
    pub rsi_turn_boost: f64,

    /// Samples back at which the previous EMA ordering is read.
    pub crossover_lookback: usize,
    /// Samples required beyond the RSI period.
    pub crossover_extra_samples: usize,
    pub crossover_confidence: f64,
    /// UP gets the RSI boost below this level.
    pub crossover_rsi_high: f64,
    /// DOWN gets the RSI boost above this level.
    pub crossover_rsi_low: f64,
    pub crossover_rsi_boost: f64,
    pub crossover_momentum: f64,
    pub crossover_momentum_boost: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            min_rsi_periods: 2,

            mean_reversion_weight: 0.45,
            momentum_weight: 0.35,
            bollinger_weight: 0.25,
            rsi_weight: 0.15,
            crossover_weight: 0.30,

            reversion_band_position: 0.75,
            reversion_confidence: 0.72,
            reversion_pattern_confidence: 0.78,
            reversion_extreme_rsi_low: 22.0,
            reversion_extreme_rsi_high: 78.0,
            reversion_extreme_band_position: 0.85,
            reversion_extreme_boost: 0.06,
            reversion_momentum_turn: 0.0005,
            reversion_momentum_boost: 0.03,

            momentum_bullish_rsi: Band::new(48.0, 62.0),
            momentum_bearish_rsi: Band::new(38.0, 52.0),
            momentum_threshold: 0.002,
            momentum_confidence: 0.68,
            momentum_strong_trend: 0.75,
            momentum_strong_confidence: 0.73,
            momentum_ema_spread: 0.003,
            momentum_spread_boost: 0.04,

            band_extreme_position: 0.85,
            band_confidence: 0.69,
            band_rsi_low: 35.0,
            band_rsi_high: 65.0,
            band_rsi_boost: 0.05,
            squeeze_width: 0.015,
            squeeze_momentum: 0.003,
            squeeze_confidence: 0.66,

            rsi_oversold_extreme: 25.0,
            rsi_overbought_extreme: 75.0,
            rsi_very_oversold: 18.0,
            rsi_very_overbought: 82.0,
            rsi_confidence: 0.66,
            rsi_very_confidence: 0.71,
            rsi_turn_lookback: 5,
            rsi_turn_boost: 0.04,

            crossover_lookback: 5,
            crossover_extra_samples: 10,
            crossover_confidence: 0.70,
            crossover_rsi_high: 60.0,
            crossover_rsi_low: 40.0,
            crossover_rsi_boost: 0.04,
            crossover_momentum: 0.001,
            crossover_momentum_boost: 0.03,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VolatilityStrategy {
    config: VolatilityConfig,
}

impl Strategy for VolatilityStrategy {
    fn analyze(&self, ctx: &SignalContext<'_>) -> Vec<StrategySignal> {
        if ctx.prices.len() < ctx.indicator_config.rsi_period * self.config.min_rsi_periods {
            return Vec::new();
        }

        let pattern = TickPattern::detect(ctx.prices);

        [
            self.mean_reversion(ctx, pattern),
            self.momentum(ctx.indicators),
            self.bollinger(ctx),
            self.rsi_extreme(ctx),
            self.ema_crossover(ctx),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl VolatilityStrategy {
    pub fn new(config: VolatilityConfig) -> Self {
        Self { config }
    }

    fn mean_reversion(&self, ctx: &SignalContext<'_>, pattern: TickPattern) -> Option<StrategySignal> {
        let config = &self.config;
        let ind = ctx.indicators;

        if ind.rsi < ctx.indicator_config.rsi_oversold && ind.bb_position < -config.reversion_band_position {
            let mut confidence = if pattern == TickPattern::DoubleBottom {
                config.reversion_pattern_confidence
            } else {
                config.reversion_confidence
            };
            if ind.rsi < config.reversion_extreme_rsi_low
                && ind.bb_position < -config.reversion_extreme_band_position
            {
                confidence += config.reversion_extreme_boost;
            }
            if ind.momentum > -config.reversion_momentum_turn {
                confidence += config.reversion_momentum_boost;
            }
            return Some(StrategySignal::new(
                "MeanReversion",
                Direction::Up,
                confidence,
                config.mean_reversion_weight,
                "Strong oversold mean reversion signal",
            ));
        }

        if ind.rsi > ctx.indicator_config.rsi_overbought && ind.bb_position > config.reversion_band_position {
            let mut confidence = if pattern == TickPattern::DoubleTop {
                config.reversion_pattern_confidence
            } else {
                config.reversion_confidence
            };
            if ind.rsi > config.reversion_extreme_rsi_high
                && ind.bb_position > config.reversion_extreme_band_position
            {
                confidence += config.reversion_extreme_boost;
            }
            if ind.momentum < config.reversion_momentum_turn {
                confidence += config.reversion_momentum_boost;
            }
            return Some(StrategySignal::new(
                "MeanReversion",
                Direction::Down,
                confidence,
                config.mean_reversion_weight,
                "Strong overbought mean reversion signal",
            ));
        }

        None
    }

    fn momentum(&self, ind: &Indicators) -> Option<StrategySignal> {
        let config = &self.config;
        let base = if ind.trend_strength > config.momentum_strong_trend {
            config.momentum_strong_confidence
        } else {
            config.momentum_confidence
        };

        if ind.bullish_alignment()
            && config.momentum_bullish_rsi.strictly_contains(ind.rsi)
            && ind.momentum > config.momentum_threshold
        {
            let spread = (ind.ema_fast - ind.ema_trend) / ind.ema_trend;
            let boost = if spread > config.momentum_ema_spread {
                config.momentum_spread_boost
            } else {
                0.0
            };
            return Some(StrategySignal::new(
                "Momentum",
                Direction::Up,
                base + boost,
                config.momentum_weight,
                "Strong bullish momentum alignment",
            ));
        }

        if ind.bearish_alignment()
            && config.momentum_bearish_rsi.strictly_contains(ind.rsi)
            && ind.momentum < -config.momentum_threshold
        {
            let spread = (ind.ema_trend - ind.ema_fast) / ind.ema_trend;
            let boost = if spread > config.momentum_ema_spread {
                config.momentum_spread_boost
            } else {
                0.0
            };
            return Some(StrategySignal::new(
                "Momentum",
                Direction::Down,
                base + boost,
                config.momentum_weight,
                "Strong bearish momentum alignment",
            ));
        }

        None
    }

    fn bollinger(&self, ctx: &SignalContext<'_>) -> Option<StrategySignal> {
        let config = &self.config;
        let ind = ctx.indicators;
        let price = ctx.price();
        let signal = |direction, confidence, reason: &str| {
            Some(StrategySignal::new(
                "BollingerBands",
                direction,
                confidence,
                config.bollinger_weight,
                reason,
            ))
        };

        if ind.bb_position < -config.band_extreme_position && price < ind.bb_lower {
            let boost = if ind.rsi < config.band_rsi_low {
                config.band_rsi_boost
            } else {
                0.0
            };
            return signal(
                Direction::Up,
                config.band_confidence + boost,
                "Price at lower BB band - bounce expected",
            );
        }

        if ind.bb_position > config.band_extreme_position && price > ind.bb_upper {
            let boost = if ind.rsi > config.band_rsi_high {
                config.band_rsi_boost
            } else {
                0.0
            };
            return signal(
                Direction::Down,
                config.band_confidence + boost,
                "Price at upper BB band - pullback expected",
            );
        }

        if ind.bb_middle == 0.0 {
            return None;
        }
        let width = (ind.bb_upper - ind.bb_lower) / ind.bb_middle;
        if width < config.squeeze_width {
            if price > ind.bb_middle && ind.momentum > config.squeeze_momentum {
                return signal(Direction::Up, config.squeeze_confidence, "BB squeeze breakout upward");
            }
            if price < ind.bb_middle && ind.momentum < -config.squeeze_momentum {
                return signal(Direction::Down, config.squeeze_confidence, "BB squeeze breakout downward");
            }
        }

        None
    }

    fn rsi_extreme(&self, ctx: &SignalContext<'_>) -> Option<StrategySignal> {
        let config = &self.config;
        let rsi = ctx.indicators.rsi;

        let turning = ctx.prices.len() > ctx.indicator_config.rsi_period + config.rsi_turn_lookback && {
            let previous = ctx
                .indicators_before(config.rsi_turn_lookback, ctx.indicator_config)
                .rsi;
            (rsi < config.rsi_oversold_extreme && previous < rsi)
                || (rsi > config.rsi_overbought_extreme && previous > rsi)
        };
        let turn_boost = if turning { config.rsi_turn_boost } else { 0.0 };

        if rsi < config.rsi_oversold_extreme {
            let base = if rsi < config.rsi_very_oversold {
                config.rsi_very_confidence
            } else {
                config.rsi_confidence
            };
            return Some(StrategySignal::new(
                "RSI",
                Direction::Up,
                base + turn_boost,
                config.rsi_weight,
                "Extreme RSI oversold with reversal",
            ));
        }

        if rsi > config.rsi_overbought_extreme {
            let base = if rsi > config.rsi_very_overbought {
                config.rsi_very_confidence
            } else {
                config.rsi_confidence
            };
            return Some(StrategySignal::new(
                "RSI",
                Direction::Down,
                base + turn_boost,
                config.rsi_weight,
                "Extreme RSI overbought with reversal",
            ));
        }

        None
    }

    fn ema_crossover(&self, ctx: &SignalContext<'_>) -> Option<StrategySignal> {
        let config = &self.config;
        if ctx.prices.len() < ctx.indicator_config.rsi_period + config.crossover_extra_samples {
            return None;
        }

        let ind = ctx.indicators;
        let previous = ctx.indicators_before(config.crossover_lookback, ctx.indicator_config);

        if ind.ema_fast > ind.ema_slow && previous.ema_fast <= previous.ema_slow {
            let mut confidence = config.crossover_confidence;
            if ind.rsi < config.crossover_rsi_high {
                confidence += config.crossover_rsi_boost;
            }
            if ind.momentum > config.crossover_momentum {
                confidence += config.crossover_momentum_boost;
            }
            return Some(StrategySignal::new(
                "EMACrossover",
                Direction::Up,
                confidence,
                config.crossover_weight,
                "Bullish EMA crossover detected",
            ));
        }

        if ind.ema_fast < ind.ema_slow && previous.ema_fast >= previous.ema_slow {
            let mut confidence = config.crossover_confidence;
            if ind.rsi > config.crossover_rsi_low {
                confidence += config.crossover_rsi_boost;
            }
            if ind.momentum < -config.crossover_momentum {
                confidence += config.crossover_momentum_boost;
            }
            return Some(StrategySignal::new(
                "EMACrossover",
                Direction::Down,
                confidence,
                config.crossover_weight,
                "Bearish EMA crossover detected",
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        candle::TimeframeConfig,
        indicator::IndicatorConfig,
        instrument::MarketCategory,
        model::Tick,
        strategy::test_util,
    };

    fn analyze(prices: &[f64], indicators: Indicators) -> Vec<StrategySignal> {
        let config = IndicatorConfig::default();
        let ticks: Vec<Tick> = test_util::ticks("volatility_75_1s", prices, 10);
        let timeframe = TimeframeConfig::new(5, 15, 40);
        let ctx = SignalContext {
            instrument: "volatility_75_1s",
            category: MarketCategory::Volatility,
            horizon_secs: 60,
            ticks: &ticks,
            prices,
            indicators: &indicators,
            indicator_config: &config,
            timeframe: &timeframe,
        };
        VolatilityStrategy::new(VolatilityConfig::default()).analyze(&ctx)
    }

    fn names(signals: &[StrategySignal]) -> Vec<(&str, Direction)> {
        signals
            .iter()
            .map(|signal| (signal.name.as_str(), signal.direction))
            .collect()
    }

    #[test]
    fn test_too_few_samples() {
        let prices = vec![100.0; 27];
        let indicators = Indicators {
            rsi: 10.0,
            bb_position: -1.0,
            ..Indicators::default()
        };
        assert!(analyze(&prices, indicators).is_empty());
    }

    #[test]
    fn test_oversold_stretch() {
        // Flat history, so previous indicators never show a turn or crossover.
        let prices = vec![100.0; 40];
        let indicators = Indicators {
            rsi: 20.0,
            ema_fast: 100.0,
            ema_slow: 100.0,
            ema_trend: 100.0,
            bb_upper: 102.0,
            bb_middle: 101.0,
            bb_lower: 100.5,
            bb_position: -0.9,
            volatility: 0.5,
            momentum: 0.0,
            trend_strength: 0.3,
        };

        let signals = analyze(&prices, indicators);

        assert_eq!(
            names(&signals),
            vec![
                ("MeanReversion", Direction::Up),
                ("BollingerBands", Direction::Up),
                ("RSI", Direction::Up),
            ]
        );
        // base 0.72, extreme +0.06, momentum turning +0.03
        assert!((signals[0].confidence - 0.81).abs() < 1e-9);
        // base 0.69, RSI confirms +0.05
        assert!((signals[1].confidence - 0.74).abs() < 1e-9);
        // RSI below 25 but not below 18
        assert!((signals[2].confidence - 0.66).abs() < 1e-9);
    }

    #[test]
    fn test_bullish_momentum_and_crossover() {
        // Flat then a gentle rise: EMA fast crosses above slow within the last samples.
        let mut prices = vec![100.0; 40];
        prices.extend((1..=5).map(|i| 100.0 + i as f64 * 0.1));
        let indicators = Indicators {
            rsi: 55.0,
            ema_fast: 101.0,
            ema_slow: 100.5,
            ema_trend: 100.0,
            bb_upper: 102.0,
            bb_middle: 100.0,
            bb_lower: 98.0,
            bb_position: 0.2,
            volatility: 0.2,
            momentum: 0.5,
            trend_strength: 0.8,
        };

        let signals = analyze(&prices, indicators);

        assert_eq!(
            names(&signals),
            vec![("Momentum", Direction::Up), ("EMACrossover", Direction::Up)]
        );
        // strong trend 0.73, spread 1% > 0.3% +0.04
        assert!((signals[0].confidence - 0.77).abs() < 1e-9);
        // 0.70 + RSI below 60 + momentum confirms
        assert!((signals[1].confidence - 0.77).abs() < 1e-9);
    }

    #[test]
    fn test_squeeze_breakout_down() {
        let prices = vec![100.0; 40];
        let indicators = Indicators {
            rsi: 45.0,
            ema_fast: 100.0,
            ema_slow: 100.0,
            ema_trend: 100.0,
            bb_upper: 100.5,
            bb_middle: 100.1,
            bb_lower: 99.7,
            bb_position: -0.25,
            volatility: 0.1,
            momentum: -0.01,
            trend_strength: 0.3,
        };

        let signals = analyze(&prices, indicators);

        assert_eq!(names(&signals), vec![("BollingerBands", Direction::Down)]);
        assert_eq!(signals[0].reason, "BB squeeze breakout downward");
        assert_eq!(signals[0].confidence, 0.66);
    }
}
