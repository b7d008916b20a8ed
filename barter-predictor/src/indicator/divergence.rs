//! RSI divergence detection.
//!
//! Compares the last two swing points of price against the last two swing points
//! of the rolling RSI series:
//! - Bullish: price lower low, RSI higher low (reversal up)
//! - Bearish: price higher high, RSI lower high (reversal down)
//! - Hidden bullish: price higher low, RSI lower low (continuation up)
//! - Hidden bearish: price lower high, RSI higher high (continuation down)

use super::{
    calc,
    pivot::{Extremum, Pivots, find_pivots},
};
use crate::model::Direction;
use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DivergenceConfig {
    /// Samples required beyond the RSI period.
    pub min_extra_samples: usize,
    pub pivot_radius: usize,
    pub min_lookback: usize,
    pub max_lookback: usize,
    /// RSI point difference that maps to full strength (scaled by price move %).
    pub rsi_scale: f64,
    pub base_confidence: f64,
    pub strength_boost: f64,
    pub oversold_zone: f64,
    pub overbought_zone: f64,
    pub zone_boost: f64,
    pub max_confidence: f64,
    pub hidden_strength: f64,
    pub hidden_confidence: f64,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            min_extra_samples: 20,
            pivot_radius: 5,
            min_lookback: 15,
            max_lookback: 40,
            rsi_scale: 15.0,
            base_confidence: 0.72,
            strength_boost: 0.06,
            oversold_zone: 35.0,
            overbought_zone: 65.0,
            zone_boost: 0.04,
            max_confidence: 0.82,
            hidden_strength: 0.7,
            hidden_confidence: 0.68,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    #[display("bullish")]
    Bullish,
    #[display("bearish")]
    Bearish,
    #[display("hidden_bullish")]
    HiddenBullish,
    #[display("hidden_bearish")]
    HiddenBearish,
}

impl DivergenceKind {
    pub fn direction(&self) -> Direction {
        match self {
            DivergenceKind::Bullish | DivergenceKind::HiddenBullish => Direction::Up,
            DivergenceKind::Bearish | DivergenceKind::HiddenBearish => Direction::Down,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Divergence {
    pub kind: DivergenceKind,
    pub confidence: f64,
    /// Pattern quality in [0, 1].
    pub strength: f64,
    /// Distance in samples between the two price pivots.
    pub lookback: usize,
}

/// RSI evaluated over every prefix; entries before `period` are NaN.
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<f64> {
    (0..prices.len())
        .map(|index| {
            if index < period {
                f64::NAN
            } else {
                calc::rsi(&prices[..=index], period)
            }
        })
        .collect()
}

pub fn detect_divergence(
    prices: &[f64],
    rsi_period: usize,
    config: &DivergenceConfig,
) -> Option<Divergence> {
    if prices.len() < rsi_period + config.min_extra_samples {
        return None;
    }

    let rsi = rsi_series(prices, rsi_period);

    let max_lookback = if prices.len() < config.max_lookback + rsi_period {
        prices.len() - rsi_period
    } else {
        config.max_lookback
    };

    let price_pivots = pivots(prices, max_lookback, config);
    let rsi_pivots = pivots(&rsi, max_lookback, config);

    let lows = price_pivots.last_two_lows().zip(rsi_pivots.last_two_lows());
    let highs = price_pivots.last_two_highs().zip(rsi_pivots.last_two_highs());

    if let Some(((prev_price, price), (prev_rsi, rsi))) = lows {
        if price.value < prev_price.value && rsi.value > prev_rsi.value {
            let strength = regular_strength(rsi.value - prev_rsi.value, prev_price.value, price.value, config);
            let zone_boost = if rsi.value < config.oversold_zone {
                config.zone_boost
            } else {
                0.0
            };
            return Some(Divergence {
                kind: DivergenceKind::Bullish,
                confidence: (config.base_confidence + strength * config.strength_boost + zone_boost)
                    .min(config.max_confidence),
                strength,
                lookback: price.index - prev_price.index,
            });
        }
    }

    if let Some(((prev_price, price), (prev_rsi, rsi))) = highs {
        if price.value > prev_price.value && rsi.value < prev_rsi.value {
            let strength = regular_strength(prev_rsi.value - rsi.value, prev_price.value, price.value, config);
            let zone_boost = if rsi.value > config.overbought_zone {
                config.zone_boost
            } else {
                0.0
            };
            return Some(Divergence {
                kind: DivergenceKind::Bearish,
                confidence: (config.base_confidence + strength * config.strength_boost + zone_boost)
                    .min(config.max_confidence),
                strength,
                lookback: price.index - prev_price.index,
            });
        }
    }

    if let Some(((prev_price, price), (prev_rsi, rsi))) = lows {
        if price.value > prev_price.value && rsi.value < prev_rsi.value {
            return Some(hidden(DivergenceKind::HiddenBullish, price.index - prev_price.index, config));
        }
    }

    if let Some(((prev_price, price), (prev_rsi, rsi))) = highs {
        if price.value < prev_price.value && rsi.value > prev_rsi.value {
            return Some(hidden(DivergenceKind::HiddenBearish, price.index - prev_price.index, config));
        }
    }

    None
}

fn pivots(values: &[f64], max_lookback: usize, config: &DivergenceConfig) -> Pivots {
    if values.len() < config.min_lookback + config.pivot_radius {
        return Pivots::default();
    }
    find_pivots(values, max_lookback, config.pivot_radius, Extremum::Strict)
}

/// Larger RSI improvement against a larger opposing price move is a stronger signal.
fn regular_strength(rsi_diff: f64, prev_price: f64, price: f64, config: &DivergenceConfig) -> f64 {
    if prev_price == 0.0 {
        return 0.0;
    }
    let price_move_pct = ((price - prev_price) / prev_price).abs() * 100.0;
    ((rsi_diff / config.rsi_scale) * price_move_pct).min(1.0)
}

fn hidden(kind: DivergenceKind, lookback: usize, config: &DivergenceConfig) -> Divergence {
    Divergence {
        kind,
        confidence: config.hidden_confidence,
        strength: config.hidden_strength,
        lookback,
    }
}
