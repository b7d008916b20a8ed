//! Quality ranking of current directional predictions.

use crate::{
    instrument::MarketCategory,
    model::{Prediction, Stats},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Predictions below this confidence are never ranked.
    pub min_confidence: f64,
    /// Confidence at which the confidence component saturates.
    pub confidence_ceiling: f64,
    pub confidence_points: f64,
    pub neutral_win_rate: f64,
    /// Win rate points above neutral per full win-rate component.
    pub win_rate_span: f64,
    pub win_rate_points: f64,
    pub unproven_points: f64,
    /// Tick counts for 20/15/10 data points, else `data_floor_points`.
    pub forex_data_tiers: [usize; 3],
    pub synthetic_data_tiers: [usize; 3],
    pub data_points: [f64; 3],
    pub data_floor_points: f64,
    pub streak_points: f64,
    pub no_streak_points: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.58,
            confidence_ceiling: 0.82,
            confidence_points: 40.0,
            neutral_win_rate: 50.0,
            win_rate_span: 20.0,
            win_rate_points: 30.0,
            unproven_points: 15.0,
            forex_data_tiers: [120, 80, 60],
            synthetic_data_tiers: [100, 60, 40],
            data_points: [20.0, 15.0, 10.0],
            data_floor_points: 5.0,
            streak_points: 10.0,
            no_streak_points: 5.0,
        }
    }
}

impl RankingConfig {
    /// Quality score in [0, 100], or `None` for neutral or low confidence predictions.
    ///
    /// Win rate only counts once `stats` covers `min_trades` settled trades.
    pub fn quality_score(
        &self,
        prediction: &Prediction,
        stats: &Stats,
        tick_count: usize,
        min_trades: usize,
    ) -> Option<f64> {
        if !prediction.is_directional() || prediction.confidence < self.min_confidence {
            return None;
        }

        let confidence = ((prediction.confidence - self.min_confidence)
            / (self.confidence_ceiling - self.min_confidence)
            * self.confidence_points)
            .max(0.0);

        let win_rate = if stats.total_trades >= min_trades {
            ((stats.win_rate - self.neutral_win_rate) / self.win_rate_span * self.win_rate_points)
                .clamp(0.0, self.win_rate_points)
        } else {
            self.unproven_points
        };

        let tiers = match prediction.category {
            MarketCategory::Forex => &self.forex_data_tiers,
            _ => &self.synthetic_data_tiers,
        };
        let data = tiers
            .iter()
            .zip(self.data_points)
            .find(|(min_ticks, _)| tick_count >= **min_ticks)
            .map_or(self.data_floor_points, |(_, points)| points);

        let streak = if stats.current_streak > 0 {
            self.streak_points
        } else {
            self.no_streak_points
        };

        Some(confidence + win_rate + data + streak)
    }
}

/// A ranked directional prediction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Opportunity {
    pub prediction: Prediction,
    pub quality_score: f64,
    pub tick_count: usize,
    pub win_rate: f64,
    pub total_trades: usize,
}
