//! Instrument category tags.
//!
//! Every instrument is tagged exactly once, when it is first registered with the
//! [`TickStore`](crate::store::TickStore). The tag selects the strategy set, the
//! candle timeframes and the category thresholds used for every later request.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// ISO currency codes recognised in forex instrument identifiers.
const CURRENCY_CODES: [&str; 8] = ["AUD", "EUR", "GBP", "USD", "JPY", "CHF", "CAD", "NZD"];

/// Direction of the periodic spike produced by a spike-cyclical index.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SpikeSide {
    /// Drifts up, spikes down.
    #[display("crash")]
    Crash,
    /// Drifts down, spikes up.
    #[display("boom")]
    Boom,
}

/// Market category driving strategy selection.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum MarketCategory {
    /// Range-bound, mean-reverting synthetic indices.
    #[display("volatility")]
    Volatility,
    /// Spike-cyclical synthetic indices.
    #[display("crash_boom")]
    CrashBoom(SpikeSide),
    /// Trending currency pairs.
    #[display("forex")]
    Forex,
}

impl MarketCategory {
    /// Classify an instrument identifier.
    ///
    /// Used only when no explicit tag is configured for the instrument.
    pub fn classify(instrument: &str) -> Self {
        let lower = instrument.to_lowercase();

        if lower.starts_with("frx") || currency_code_count(instrument) >= 2 {
            return MarketCategory::Forex;
        }
        if lower.contains("crash") {
            return MarketCategory::CrashBoom(SpikeSide::Crash);
        }
        if lower.contains("boom") {
            return MarketCategory::CrashBoom(SpikeSide::Boom);
        }

        MarketCategory::Volatility
    }

    pub fn is_forex(&self) -> bool {
        matches!(self, MarketCategory::Forex)
    }

    pub fn is_synthetic(&self) -> bool {
        !self.is_forex()
    }

    /// Typical tick arrival rate used to estimate remaining warm-up time.
    pub fn ticks_per_minute(&self) -> usize {
        match self {
            MarketCategory::Forex => 2,
            MarketCategory::Volatility => 60,
            MarketCategory::CrashBoom(_) => 30,
        }
    }
}

fn currency_code_count(instrument: &str) -> usize {
    let upper = instrument.to_uppercase();
    CURRENCY_CODES
        .iter()
        .filter(|code| upper.contains(*code))
        .count()
}

/// Instrument universe filter used by bulk queries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum MarketMode {
    #[display("synthetics")]
    Synthetics,
    #[display("forex")]
    Forex,
    #[default]
    #[display("both")]
    Both,
}

impl MarketMode {
    pub fn includes(&self, category: MarketCategory) -> bool {
        match self {
            MarketMode::Synthetics => category.is_synthetic(),
            MarketMode::Forex => category.is_forex(),
            MarketMode::Both => true,
        }
    }
}
