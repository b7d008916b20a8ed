//! Core data model shared by every stage of the prediction pipeline.

use crate::{indicator::Indicators, instrument::MarketCategory};
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A single price observation for one instrument.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tick {
    pub instrument: SmolStr,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(instrument: impl Into<SmolStr>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.into(),
            price,
            timestamp,
        }
    }
}

/// OHLC aggregate over one fixed time bucket. `tick_count` is the candle volume.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Candle {
    pub instrument: SmolStr,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_count: usize,
    pub period_start: DateTime<Utc>,
}

/// Predicted price direction over the horizon.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Deserialize, Serialize, Display)]
pub enum Direction {
    #[serde(rename = "UP")]
    #[display("UP")]
    Up,
    #[serde(rename = "DOWN")]
    #[display("DOWN")]
    Down,
    #[default]
    #[serde(rename = "NONE")]
    #[display("NONE")]
    Neutral,
}

impl Direction {
    pub fn is_directional(&self) -> bool {
        !matches!(self, Direction::Neutral)
    }
}

/// Output of one signal generator for one prediction cycle.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StrategySignal {
    pub name: SmolStr,
    pub direction: Direction,
    pub confidence: f64,
    pub weight: f64,
    pub reason: String,
}

impl StrategySignal {
    pub fn new(
        name: &'static str,
        direction: Direction,
        confidence: f64,
        weight: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: SmolStr::new_static(name),
            direction,
            confidence,
            weight,
            reason: reason.into(),
        }
    }
}

/// Terminal state reached by a single prediction request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    #[display("insufficient_data")]
    InsufficientData,
    #[display("unfavorable_conditions")]
    UnfavorableConditions,
    #[display("no_signals")]
    NoSignals,
    #[display("weak_consensus")]
    WeakConsensus,
    #[display("filtered_out")]
    FilteredOut,
    #[display("accepted")]
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Prediction {
    pub id: String,
    pub instrument: SmolStr,
    pub category: MarketCategory,
    pub direction: Direction,
    pub confidence: f64,
    pub reason: String,
    pub current_price: f64,
    pub horizon_secs: u32,
    pub indicators: Indicators,
    pub data_points: usize,
    pub outcome: DecisionOutcome,
    pub timestamp: DateTime<Utc>,
}

impl Prediction {
    /// Neutral prediction with no indicator context, used before any analysis ran.
    pub fn neutral(
        instrument: SmolStr,
        category: MarketCategory,
        horizon_secs: u32,
        data_points: usize,
        outcome: DecisionOutcome,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instrument,
            category,
            direction: Direction::Neutral,
            confidence: 0.0,
            reason: reason.into(),
            current_price: 0.0,
            horizon_secs,
            indicators: Indicators::default(),
            data_points,
            outcome,
            timestamp: Utc::now(),
        }
    }

    /// Degrade to a neutral prediction, keeping the computed context.
    pub fn reject(mut self, outcome: DecisionOutcome, reason: impl Into<String>) -> Self {
        self.direction = Direction::Neutral;
        self.confidence = 0.0;
        self.outcome = outcome;
        self.reason = reason.into();
        self
    }

    pub fn is_directional(&self) -> bool {
        self.direction.is_directional()
    }
}

/// Accepted directional prediction awaiting settlement.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PendingPrediction {
    pub id: String,
    pub instrument: SmolStr,
    pub category: MarketCategory,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub horizon_secs: u32,
    pub confidence: f64,
    pub expiry_time: DateTime<Utc>,
}

/// Settled outcome of a [`PendingPrediction`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeResult {
    pub prediction_id: String,
    pub instrument: SmolStr,
    pub category: MarketCategory,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub horizon_secs: u32,
    pub confidence: f64,
    pub won: bool,
    pub profit_loss: f64,
    pub price_change: f64,
}

/// Rolling per-instrument performance, always recomputed from the full result history.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Stats {
    pub instrument: SmolStr,
    pub category: Option<MarketCategory>,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percentage in [0, 100].
    pub win_rate: f64,
    pub total_profit_loss: f64,
    pub avg_confidence: f64,
    pub current_streak: usize,
    pub best_streak: usize,
    pub last_updated: DateTime<Utc>,
    pub recent_trades: Vec<TradeResult>,
}

impl Stats {
    pub fn empty(instrument: SmolStr) -> Self {
        Self {
            instrument,
            category: None,
            total_trades: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            total_profit_loss: 0.0,
            avg_confidence: 0.0,
            current_streak: 0,
            best_streak: 0,
            last_updated: Utc::now(),
            recent_trades: Vec::new(),
        }
    }
}
