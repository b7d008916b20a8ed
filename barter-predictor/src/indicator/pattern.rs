//! Classical chart pattern recognition over swing points.
//!
//! Detectors run in reliability order and the first match wins:
//! head & shoulders, inverse head & shoulders, double top/bottom, triple top/bottom,
//! ascending/descending triangle.

use super::pivot::{Extremum, Pivot, find_pivots, highest_between, lowest_between};
use crate::model::Direction;
use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PatternConfig {
    pub min_samples: usize,
    pub pivot_radius: usize,

    pub head_shoulders_lookback: usize,
    /// Maximum relative difference between the two shoulders.
    pub shoulder_tolerance: f64,
    /// Maximum relative distance of the last price from the neckline.
    pub neckline_proximity: f64,
    pub head_height_scale: f64,
    pub head_shoulders_confidence: f64,
    pub head_shoulders_boost: f64,

    pub double_min_samples: usize,
    pub double_lookback: usize,
    pub double_tolerance: f64,
    pub double_top_break: f64,
    pub double_bottom_break: f64,
    pub double_confidence: f64,
    pub double_max_bonus: f64,
    pub double_bonus_scale: f64,
    pub double_strength_scale: f64,

    pub triple_lookback: usize,
    pub triple_tolerance: f64,
    pub triple_top_break: f64,
    pub triple_bottom_break: f64,
    pub triple_confidence: f64,
    pub triple_strength: f64,

    pub triangle_lookback: usize,
    pub triangle_flat_tolerance: f64,
    pub triangle_slope: f64,
    pub triangle_confidence: f64,
    pub triangle_strength: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,
            pivot_radius: 3,

            head_shoulders_lookback: 40,
            shoulder_tolerance: 0.015,
            neckline_proximity: 0.015,
            head_height_scale: 50.0,
            head_shoulders_confidence: 0.74,
            head_shoulders_boost: 0.06,

            double_min_samples: 30,
            double_lookback: 30,
            double_tolerance: 0.008,
            double_top_break: 0.997,
            double_bottom_break: 1.003,
            double_confidence: 0.70,
            double_max_bonus: 0.08,
            double_bonus_scale: 30.0,
            double_strength_scale: 40.0,

            triple_lookback: 40,
            triple_tolerance: 0.01,
            triple_top_break: 0.995,
            triple_bottom_break: 1.005,
            triple_confidence: 0.76,
            triple_strength: 0.85,

            triangle_lookback: 40,
            triangle_flat_tolerance: 0.01,
            triangle_slope: 0.005,
            triangle_confidence: 0.68,
            triangle_strength: 0.75,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ChartPatternKind {
    #[display("Head & Shoulders")]
    HeadAndShoulders,
    #[display("Inverse H&S")]
    InverseHeadAndShoulders,
    #[display("Double Top")]
    DoubleTop,
    #[display("Double Bottom")]
    DoubleBottom,
    #[display("Triple Top")]
    TripleTop,
    #[display("Triple Bottom")]
    TripleBottom,
    #[display("Ascending Triangle")]
    AscendingTriangle,
    #[display("Descending Triangle")]
    DescendingTriangle,
}

impl ChartPatternKind {
    /// Expected breakout direction.
    pub fn direction(&self) -> Direction {
        match self {
            ChartPatternKind::InverseHeadAndShoulders
            | ChartPatternKind::DoubleBottom
            | ChartPatternKind::TripleBottom
            | ChartPatternKind::AscendingTriangle => Direction::Up,
            ChartPatternKind::HeadAndShoulders
            | ChartPatternKind::DoubleTop
            | ChartPatternKind::TripleTop
            | ChartPatternKind::DescendingTriangle => Direction::Down,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChartPattern {
    pub kind: ChartPatternKind,
    pub confidence: f64,
    /// Pattern quality in [0, 1].
    pub strength: f64,
}

pub fn detect_pattern(prices: &[f64], config: &PatternConfig) -> Option<ChartPattern> {
    if prices.len() < config.min_samples {
        return None;
    }

    head_and_shoulders(prices, config)
        .or_else(|| inverse_head_and_shoulders(prices, config))
        .or_else(|| double_top_bottom(prices, config))
        .or_else(|| triple_top_bottom(prices, config))
        .or_else(|| triangle(prices, config))
}

fn swing_highs(prices: &[f64], lookback: usize, config: &PatternConfig) -> Vec<Pivot> {
    find_pivots(prices, lookback, config.pivot_radius, Extremum::Strict).highs
}

fn swing_lows(prices: &[f64], lookback: usize, config: &PatternConfig) -> Vec<Pivot> {
    find_pivots(prices, lookback, config.pivot_radius, Extremum::Strict).lows
}

fn last_three(pivots: &[Pivot]) -> Option<(Pivot, Pivot, Pivot)> {
    match pivots {
        [.., first, second, third] => Some((*first, *second, *third)),
        _ => None,
    }
}

fn last_two(pivots: &[Pivot]) -> Option<(Pivot, Pivot)> {
    match pivots {
        [.., previous, last] => Some((*previous, *last)),
        _ => None,
    }
}

fn last_price(prices: &[f64]) -> f64 {
    prices.last().copied().unwrap_or_default()
}

fn head_and_shoulders(prices: &[f64], config: &PatternConfig) -> Option<ChartPattern> {
    let peaks = swing_highs(prices, config.head_shoulders_lookback, config);
    let (left, head, right) = last_three(&peaks)?;

    if head.value <= left.value || head.value <= right.value {
        return None;
    }
    if (left.value - right.value).abs() / left.value > config.shoulder_tolerance {
        return None;
    }

    let neckline = lowest_between(prices, left.index, right.index);
    if (last_price(prices) - neckline) / neckline >= config.neckline_proximity {
        return None;
    }

    let strength = ((head.value - neckline) / neckline * config.head_height_scale).min(1.0);
    Some(ChartPattern {
        kind: ChartPatternKind::HeadAndShoulders,
        confidence: config.head_shoulders_confidence + strength * config.head_shoulders_boost,
        strength,
    })
}

fn inverse_head_and_shoulders(prices: &[f64], config: &PatternConfig) -> Option<ChartPattern> {
    let troughs = swing_lows(prices, config.head_shoulders_lookback, config);
    let (left, head, right) = last_three(&troughs)?;

    if head.value >= left.value || head.value >= right.value {
        return None;
    }
    if (left.value - right.value).abs() / left.value > config.shoulder_tolerance {
        return None;
    }

    let neckline = highest_between(prices, left.index, right.index);
    if (neckline - last_price(prices)) / neckline >= config.neckline_proximity {
        return None;
    }

    let strength = ((neckline - head.value) / head.value * config.head_height_scale).min(1.0);
    Some(ChartPattern {
        kind: ChartPatternKind::InverseHeadAndShoulders,
        confidence: config.head_shoulders_confidence + strength * config.head_shoulders_boost,
        strength,
    })
}

fn double_top_bottom(prices: &[f64], config: &PatternConfig) -> Option<ChartPattern> {
    if prices.len() < config.double_min_samples {
        return None;
    }
    let current = last_price(prices);

    let double = |kind, depth: f64| ChartPattern {
        kind,
        confidence: config.double_confidence
            + (depth * config.double_bonus_scale).min(config.double_max_bonus),
        strength: (depth * config.double_strength_scale).min(1.0),
    };

    let peaks = swing_highs(prices, config.double_lookback, config);
    if let Some((previous, last)) = last_two(&peaks) {
        if (last.value - previous.value).abs() / previous.value < config.double_tolerance {
            let valley = lowest_between(prices, previous.index, last.index);
            if current < last.value * config.double_top_break {
                return Some(double(ChartPatternKind::DoubleTop, (last.value - valley) / valley));
            }
        }
    }

    let troughs = swing_lows(prices, config.double_lookback, config);
    if let Some((previous, last)) = last_two(&troughs) {
        if (last.value - previous.value).abs() / previous.value < config.double_tolerance {
            let peak = highest_between(prices, previous.index, last.index);
            if current > last.value * config.double_bottom_break {
                return Some(double(ChartPatternKind::DoubleBottom, (peak - last.value) / last.value));
            }
        }
    }

    None
}

fn within_average(pivots: (Pivot, Pivot, Pivot), tolerance: f64) -> bool {
    let (first, second, third) = pivots;
    let average = (first.value + second.value + third.value) / 3.0;
    [first, second, third]
        .iter()
        .all(|pivot| (pivot.value - average).abs() / average < tolerance)
}

fn triple_top_bottom(prices: &[f64], config: &PatternConfig) -> Option<ChartPattern> {
    let current = last_price(prices);
    let triple = |kind| ChartPattern {
        kind,
        confidence: config.triple_confidence,
        strength: config.triple_strength,
    };

    let peaks = swing_highs(prices, config.triple_lookback, config);
    if let Some(tops) = last_three(&peaks) {
        if within_average(tops, config.triple_tolerance) && current < tops.2.value * config.triple_top_break {
            return Some(triple(ChartPatternKind::TripleTop));
        }
    }

    let troughs = swing_lows(prices, config.triple_lookback, config);
    if let Some(bottoms) = last_three(&troughs) {
        if within_average(bottoms, config.triple_tolerance)
            && current > bottoms.2.value * config.triple_bottom_break
        {
            return Some(triple(ChartPatternKind::TripleBottom));
        }
    }

    None
}

fn triangle(prices: &[f64], config: &PatternConfig) -> Option<ChartPattern> {
    let (previous_high, last_high) = last_two(&swing_highs(prices, config.triangle_lookback, config))?;
    let (previous_low, last_low) = last_two(&swing_lows(prices, config.triangle_lookback, config))?;

    let triangle = |kind| ChartPattern {
        kind,
        confidence: config.triangle_confidence,
        strength: config.triangle_strength,
    };

    let highs_flat = (previous_high.value - last_high.value).abs() / previous_high.value
        < config.triangle_flat_tolerance;
    let lows_rising = last_low.value > previous_low.value * (1.0 + config.triangle_slope);
    if highs_flat && lows_rising {
        return Some(triangle(ChartPatternKind::AscendingTriangle));
    }

    let lows_flat = (previous_low.value - last_low.value).abs() / previous_low.value
        < config.triangle_flat_tolerance;
    let highs_falling = last_high.value < previous_high.value * (1.0 - config.triangle_slope);
    if lows_flat && highs_falling {
        return Some(triangle(ChartPatternKind::DescendingTriangle));
    }

    None
}
