//! Predictor configuration.
//!
//! Every threshold used by the pipeline is a named field with a canonical default.
//! All sections are `#[serde(default)]`, so any external loader may supply a partial
//! document and inherit the remaining defaults.

use crate::{
    candle::TimeframeTable,
    consensus::ConsensusConfig,
    error::PredictorError,
    indicator::IndicatorConfig,
    instrument::MarketCategory,
    ranking::RankingConfig,
    strategy::{
        CrossSignalConfig, crash_boom::CrashBoomConfig, forex::ForexConfig,
        volatility::VolatilityConfig,
    },
};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub indicators: IndicatorConfig,
    pub timeframes: TimeframeTable,
    pub volatility: VolatilityConfig,
    pub crash_boom: CrashBoomConfig,
    pub forex: ForexConfig,
    pub cross_signals: CrossSignalConfig,
    pub consensus: ConsensusConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub tracking: TrackingConfig,
    pub ranking: RankingConfig,
    /// Explicit category tags, taking precedence over identifier classification.
    pub instruments: FnvHashMap<SmolStr, MarketCategory>,
}

impl PredictorConfig {
    /// Check every field that would otherwise produce meaningless output.
    pub fn validate(&self) -> Result<(), PredictorError> {
        let invalid = |msg: &str| Err(PredictorError::InvalidConfig(msg.to_string()));

        let periods = [
            self.indicators.rsi_period,
            self.indicators.ema_fast,
            self.indicators.ema_slow,
            self.indicators.ema_trend,
            self.indicators.bb_period,
            self.indicators.volatility_period,
            self.indicators.momentum_period,
        ];
        if periods.contains(&0) {
            return invalid("indicator periods must be > 0");
        }
        if !(0.0..=100.0).contains(&self.indicators.rsi_oversold)
            || !(0.0..=100.0).contains(&self.indicators.rsi_overbought)
            || self.indicators.rsi_oversold >= self.indicators.rsi_overbought
        {
            return invalid("rsi_oversold must be below rsi_overbought, both in [0, 100]");
        }

        for thresholds in [
            &self.consensus.volatility,
            &self.consensus.crash_boom,
            &self.consensus.forex,
        ] {
            if !(0.0..=1.0).contains(&thresholds.min_confidence) {
                return invalid("consensus min_confidence must be in [0, 1]");
            }
            if thresholds.agreement <= 0.0 || thresholds.agreement > 1.0 {
                return invalid("consensus agreement must be in (0, 1]");
            }
        }

        if !(0.0..=1.0).contains(&self.ranking.min_confidence) {
            return invalid("ranking min_confidence must be in [0, 1]");
        }
        if self.rate_limit.synthetics_per_minute == 0 || self.rate_limit.forex_per_minute == 0 {
            return invalid("rate limits must be > 0");
        }
        if self.rate_limit.window_secs == 0 {
            return invalid("rate limit window must be > 0");
        }
        if self.storage.max_ticks == 0 {
            return invalid("storage max_ticks must be > 0");
        }
        if self.tracking.stake <= 0.0 || self.tracking.payout_ratio <= 0.0 {
            return invalid("tracking stake and payout_ratio must be > 0");
        }

        Ok(())
    }
}

/// Open or closed numeric interval used for threshold zones.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// `low < value < high`
    pub fn strictly_contains(&self, value: f64) -> bool {
        value > self.low && value < self.high
    }

    /// `low <= value <= high`
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// One step of a horizon-keyed lookup table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tier<T> {
    pub max_horizon_secs: u32,
    pub value: T,
}

/// Horizon-keyed lookup: first tier whose `max_horizon_secs` covers the horizon,
/// otherwise the fallback.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonTiers<T> {
    pub tiers: Vec<Tier<T>>,
    pub fallback: T,
}

impl<T> HorizonTiers<T> {
    pub fn new(tiers: impl IntoIterator<Item = (u32, T)>, fallback: T) -> Self {
        Self {
            tiers: tiers
                .into_iter()
                .map(|(max_horizon_secs, value)| Tier {
                    max_horizon_secs,
                    value,
                })
                .collect(),
            fallback,
        }
    }

    pub fn select(&self, horizon_secs: u32) -> &T {
        self.tiers
            .iter()
            .find(|tier| horizon_secs <= tier.max_horizon_secs)
            .map(|tier| &tier.value)
            .unwrap_or(&self.fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub synthetics_per_minute: u32,
    pub forex_per_minute: u32,
    pub window_secs: u64,
    pub prune_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn limit_for(&self, category: MarketCategory) -> u32 {
        if category.is_forex() {
            self.forex_per_minute
        } else {
            self.synthetics_per_minute
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            synthetics_per_minute: 30,
            forex_per_minute: 20,
            window_secs: 60,
            prune_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds, keyed by prediction horizon.
    pub ttl_secs: HorizonTiers<u64>,
    pub max_age_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self, horizon_secs: u32) -> Duration {
        Duration::from_secs(*self.ttl_secs.select(horizon_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: HorizonTiers::new([(60, 5), (300, 10), (900, 20)], 30),
            max_age_secs: 60,
            cleanup_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub max_ticks: usize,
    pub prediction_retention_hours: i64,
    pub cleanup_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_ticks: 500,
            prediction_retention_hours: 12,
            cleanup_interval_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub stake: f64,
    /// Fraction of the stake paid out on a win.
    pub payout_ratio: f64,
    pub stats_interval_secs: u64,
    pub summary_interval_secs: u64,
    pub min_trades_for_stats: usize,
    pub recent_trades: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            stake: 10.0,
            payout_ratio: 0.85,
            stats_interval_secs: 60,
            summary_interval_secs: 300,
            min_trades_for_stats: 5,
            recent_trades: 20,
        }
    }
}
