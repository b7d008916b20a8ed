//! Spike-cyclical generators for crash/boom indices.
//!
//! A crash index drifts up between sudden downward spikes, a boom index drifts down
//! between upward spikes. Spike timing is estimated from the spacing of the spikes
//! visible in the analysed window.

use super::{SignalContext, Strategy, capped};
use crate::{
    config::Band,
    indicator::{Indicators, calc},
    instrument::{MarketCategory, SpikeSide},
    model::{Direction, StrategySignal},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrashBoomConfig {
    pub min_samples: usize,

    /// Samples at either end of the window never scanned for spikes.
    pub spike_scan_margin: usize,
    /// Samples averaged either side of a spike candidate.
    pub spike_window: usize,
    /// Relative move against the surrounding averages that qualifies a spike.
    pub spike_change: f64,
    /// Relative move from the previous sample that qualifies a spike.
    pub spike_immediate_change: f64,

    /// Progress through the average interval (ticks since / interval) at which a
    /// spike is due.
    pub due_progress: Band,
    pub due_base_confidence: f64,
    pub due_confidence_slope: f64,
    pub due_max_confidence: f64,
    /// Interval assumed when only one spike is visible.
    pub single_spike_interval: f64,
    pub single_spike_due_ticks: usize,
    pub single_spike_confidence: f64,

    pub detection_weight: f64,
    pub detection_recent_window: usize,
    pub detection_baseline_window: usize,
    pub detection_volatility_ratio: f64,
    pub detection_volatility_boost: f64,
    pub detection_late_progress: f64,
    pub detection_late_boost: f64,
    pub detection_max_confidence: f64,

    pub drift_weight: f64,
    pub drift_progress: Band,
    pub drift_mid_progress: Band,
    /// Crash drift requires RSI below this level.
    pub drift_crash_rsi_max: f64,
    /// Boom drift requires RSI above this level.
    pub drift_boom_rsi_min: f64,
    pub drift_momentum_tolerance: f64,
    pub drift_confidence: f64,
    pub drift_mid_confidence: f64,
    pub drift_ema_boost: f64,

    pub surge_weight: f64,
    pub surge_progress: Band,
    pub surge_recent_window: usize,
    pub surge_baseline_window: usize,
    pub surge_ratio: f64,
    pub surge_strong_ratio: f64,
    pub surge_confidence: f64,
    pub surge_strong_confidence: f64,

    pub recovery_weight: f64,
    pub recovery_min_ticks: usize,
    pub recovery_max_ticks: usize,
    /// Maximum adverse move since the spike that still counts as recovery.
    pub recovery_tolerance: f64,
    pub recovery_confidence: f64,
}

impl Default for CrashBoomConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,

            spike_scan_margin: 10,
            spike_window: 5,
            spike_change: 0.022,
            spike_immediate_change: 0.013,

            due_progress: Band::new(0.80, 1.15),
            due_base_confidence: 0.50,
            due_confidence_slope: 0.57,
            due_max_confidence: 0.70,
            single_spike_interval: 70.0,
            single_spike_due_ticks: 55,
            single_spike_confidence: 0.58,

            detection_weight: 0.50,
            detection_recent_window: 10,
            detection_baseline_window: 30,
            detection_volatility_ratio: 1.12,
            detection_volatility_boost: 0.05,
            detection_late_progress: 0.92,
            detection_late_boost: 0.04,
            detection_max_confidence: 0.74,

            drift_weight: 0.30,
            drift_progress: Band::new(0.15, 0.80),
            drift_mid_progress: Band::new(0.30, 0.65),
            drift_crash_rsi_max: 68.0,
            drift_boom_rsi_min: 32.0,
            drift_momentum_tolerance: 0.0015,
            drift_confidence: 0.62,
            drift_mid_confidence: 0.66,
            drift_ema_boost: 0.04,

            surge_weight: 0.25,
            surge_progress: Band::new(0.75, 1.10),
            surge_recent_window: 15,
            surge_baseline_window: 50,
            surge_ratio: 1.20,
            surge_strong_ratio: 1.4,
            surge_confidence: 0.64,
            surge_strong_confidence: 0.68,

            recovery_weight: 0.20,
            recovery_min_ticks: 1,
            recovery_max_ticks: 12,
            recovery_tolerance: 0.008,
            recovery_confidence: 0.65,
        }
    }
}

/// Spike history of the analysed window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpikeStats {
    /// Indices of detected spikes, oldest first.
    pub spikes: Vec<usize>,
    pub ticks_since_spike: usize,
    pub avg_interval: f64,
    pub due: bool,
    pub due_confidence: f64,
}

impl SpikeStats {
    pub fn last_spike(&self) -> Option<usize> {
        self.spikes.last().copied()
    }

    /// Fraction of the average interval elapsed since the last spike.
    pub fn progress(&self) -> Option<f64> {
        match self.last_spike() {
            Some(_) if self.avg_interval > 0.0 => {
                Some(self.ticks_since_spike as f64 / self.avg_interval)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrashBoomStrategy {
    config: CrashBoomConfig,
}

impl Strategy for CrashBoomStrategy {
    fn analyze(&self, ctx: &SignalContext<'_>) -> Vec<StrategySignal> {
        let MarketCategory::CrashBoom(side) = ctx.category else {
            return Vec::new();
        };
        if ctx.prices.len() < self.config.min_samples {
            return Vec::new();
        }

        let stats = self.spike_stats(ctx.prices);

        [
            self.spike_detection(ctx.prices, &stats, side),
            self.between_spike_drift(ctx.indicators, &stats, side),
            self.pre_spike_surge(ctx.prices, &stats, side),
            self.post_spike_recovery(ctx.prices, &stats, side),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl CrashBoomStrategy {
    pub fn new(config: CrashBoomConfig) -> Self {
        Self { config }
    }

    pub fn spike_stats(&self, prices: &[f64]) -> SpikeStats {
        let margin = self.config.spike_scan_margin;
        let spikes = (margin..prices.len().saturating_sub(margin))
            .filter(|&index| self.is_spike(prices, index))
            .collect::<Vec<_>>();

        let Some(&last) = spikes.last() else {
            return SpikeStats::default();
        };
        let ticks_since_spike = prices.len() - last - 1;

        let (avg_interval, due_confidence) = if let [first, .., latest] = spikes[..] {
            let avg_interval = (latest - first) as f64 / (spikes.len() - 1) as f64;
            let progress = ticks_since_spike as f64 / avg_interval;
            let confidence = self.config.due_progress.contains(progress).then(|| {
                (self.config.due_base_confidence
                    + (progress - self.config.due_progress.low) * self.config.due_confidence_slope)
                    .min(self.config.due_max_confidence)
            });
            (avg_interval, confidence)
        } else {
            let confidence = (ticks_since_spike >= self.config.single_spike_due_ticks)
                .then_some(self.config.single_spike_confidence);
            (self.config.single_spike_interval, confidence)
        };

        SpikeStats {
            spikes,
            ticks_since_spike,
            avg_interval,
            due: due_confidence.is_some(),
            due_confidence: due_confidence.unwrap_or_default(),
        }
    }

    fn is_spike(&self, prices: &[f64], index: usize) -> bool {
        let window = self.config.spike_window;
        if index < window || index + window >= prices.len() {
            return false;
        }

        let price = prices[index];
        let before = calc::mean(&prices[index - window..index]);
        let after = calc::mean(&prices[index + 1..=index + window]);
        let previous = prices[index - 1];
        if before == 0.0 || price == 0.0 || previous == 0.0 {
            return false;
        }

        let change_from_before = ((price - before) / before).abs();
        let change_to_after = ((after - price) / price).abs();
        let immediate = ((price - previous) / previous).abs();

        (change_from_before > self.config.spike_change || change_to_after > self.config.spike_change)
            && immediate > self.config.spike_immediate_change
    }

    fn spike_detection(&self, prices: &[f64], stats: &SpikeStats, side: SpikeSide) -> Option<StrategySignal> {
        if !stats.due {
            return None;
        }
        let config = &self.config;

        let recent = calc::returns_volatility(prices, config.detection_recent_window);
        let baseline = calc::returns_volatility(prices, config.detection_baseline_window);

        let mut confidence = stats.due_confidence;
        if recent > baseline * config.detection_volatility_ratio {
            confidence += config.detection_volatility_boost;
        }
        if stats.ticks_since_spike >= (stats.avg_interval * config.detection_late_progress) as usize {
            confidence += config.detection_late_boost;
        }

        let (direction, reason) = match side {
            SpikeSide::Crash => (Direction::Down, "Crash spike imminent (pattern-based)"),
            SpikeSide::Boom => (Direction::Up, "Boom spike imminent (pattern-based)"),
        };
        Some(capped(
            "SpikeDetection",
            direction,
            confidence,
            config.detection_max_confidence,
            config.detection_weight,
            reason,
        ))
    }

    fn between_spike_drift(&self, ind: &Indicators, stats: &SpikeStats, side: SpikeSide) -> Option<StrategySignal> {
        let config = &self.config;
        let progress = stats.progress()?;
        if !config.drift_progress.contains(progress) {
            return None;
        }

        let base = if config.drift_mid_progress.contains(progress) {
            config.drift_mid_confidence
        } else {
            config.drift_confidence
        };

        let (direction, confirmed, reason) = match side {
            SpikeSide::Crash
                if ind.rsi < config.drift_crash_rsi_max
                    && ind.momentum >= -config.drift_momentum_tolerance =>
            {
                (Direction::Up, ind.ema_fast > ind.ema_slow, "Between-crash upward drift")
            }
            SpikeSide::Boom
                if ind.rsi > config.drift_boom_rsi_min
                    && ind.momentum <= config.drift_momentum_tolerance =>
            {
                (Direction::Down, ind.ema_fast < ind.ema_slow, "Between-boom downward drift")
            }
            _ => return None,
        };

        let boost = if confirmed { config.drift_ema_boost } else { 0.0 };
        Some(StrategySignal::new(
            "BetweenSpikeTrend",
            direction,
            base + boost,
            config.drift_weight,
            reason,
        ))
    }

    fn pre_spike_surge(&self, prices: &[f64], stats: &SpikeStats, side: SpikeSide) -> Option<StrategySignal> {
        let config = &self.config;
        let progress = stats.progress()?;
        if !config.surge_progress.contains(progress) {
            return None;
        }

        let recent = calc::returns_volatility(prices, config.surge_recent_window);
        let baseline = calc::returns_volatility(prices, config.surge_baseline_window);
        if recent <= baseline * config.surge_ratio {
            return None;
        }

        let confidence = if recent > baseline * config.surge_strong_ratio {
            config.surge_strong_confidence
        } else {
            config.surge_confidence
        };
        let (direction, reason) = match side {
            SpikeSide::Crash => (Direction::Down, "Pre-crash volatility surge"),
            SpikeSide::Boom => (Direction::Up, "Pre-boom volatility surge"),
        };
        Some(StrategySignal::new(
            "PreSpikeVolatility",
            direction,
            confidence,
            config.surge_weight,
            reason,
        ))
    }

    fn post_spike_recovery(&self, prices: &[f64], stats: &SpikeStats, side: SpikeSide) -> Option<StrategySignal> {
        let config = &self.config;
        let last_spike = stats.last_spike()?;
        if stats.ticks_since_spike < config.recovery_min_ticks
            || stats.ticks_since_spike > config.recovery_max_ticks
            || last_spike + 1 >= prices.len()
        {
            return None;
        }

        let spike_price = prices[last_spike];
        let price = *prices.last()?;
        if spike_price == 0.0 {
            return None;
        }

        let (direction, retrace, reason) = match side {
            SpikeSide::Crash => (Direction::Up, (price - spike_price) / spike_price, "Post-crash recovery phase"),
            SpikeSide::Boom => (Direction::Down, (spike_price - price) / spike_price, "Post-boom correction phase"),
        };
        (retrace > -config.recovery_tolerance).then(|| {
            StrategySignal::new(
                "PostSpikeRecovery",
                direction,
                config.recovery_confidence,
                config.recovery_weight,
                reason,
            )
        })
    }
}
