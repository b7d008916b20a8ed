use crate::model::{Direction, Stats, TradeResult};
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// Win/loss of a settled prediction. Unchanged prices lose.
pub fn is_win(direction: Direction, entry_price: f64, exit_price: f64) -> bool {
    match direction {
        Direction::Up => exit_price > entry_price,
        Direction::Down => exit_price < entry_price,
        Direction::Neutral => false,
    }
}

/// Profit of a win is `stake * payout_ratio`; a loss forfeits the stake.
pub fn profit_loss(won: bool, stake: f64, payout_ratio: f64) -> f64 {
    if won { stake * payout_ratio } else { -stake }
}

/// Recompute statistics from the full, chronologically ordered result history.
pub fn compute_stats(instrument: &SmolStr, results: &[TradeResult], recent_trades: usize) -> Stats {
    let mut stats = Stats::empty(instrument.clone());
    if results.is_empty() {
        return stats;
    }

    let (mut run, mut best_streak) = (0, 0);
    for result in results {
        if result.won {
            run += 1;
            best_streak = best_streak.max(run);
        } else {
            run = 0;
        }
    }

    let total_trades = results.len();
    let wins = results.iter().filter(|result| result.won).count();

    stats.category = results.last().map(|result| result.category);
    stats.total_trades = total_trades;
    stats.wins = wins;
    stats.losses = total_trades - wins;
    stats.win_rate = wins as f64 / total_trades as f64 * 100.0;
    stats.total_profit_loss = results.iter().map(|result| result.profit_loss).sum();
    stats.avg_confidence =
        results.iter().map(|result| result.confidence).sum::<f64>() / total_trades as f64;
    stats.current_streak = run;
    stats.best_streak = best_streak;
    stats.last_updated = Utc::now();
    stats.recent_trades = results[total_trades.saturating_sub(recent_trades)..].to_vec();
    stats
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SummaryRow {
    pub instrument: SmolStr,
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_profit_loss: f64,
    pub current_streak: usize,
}

/// Per-instrument performance table with an overall line.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PerformanceSummary {
    pub rows: Vec<SummaryRow>,
    pub total_trades: usize,
    pub total_wins: usize,
    pub total_profit_loss: f64,
}

impl PerformanceSummary {
    pub fn new<'a>(stats: impl IntoIterator<Item = &'a Stats>) -> Self {
        let mut summary = Self::default();

        for stats in stats
            .into_iter()
            .filter(|stats| stats.total_trades > 0)
            .sorted_by(|a, b| a.instrument.cmp(&b.instrument))
        {
            summary.total_trades += stats.total_trades;
            summary.total_wins += stats.wins;
            summary.total_profit_loss += stats.total_profit_loss;
            summary.rows.push(SummaryRow {
                instrument: stats.instrument.clone(),
                total_trades: stats.total_trades,
                win_rate: stats.win_rate,
                total_profit_loss: stats.total_profit_loss,
                current_streak: stats.current_streak,
            });
        }

        summary
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.total_wins as f64 / self.total_trades as f64 * 100.0
        }
    }
}

impl Display for PerformanceSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.rows.is_empty() {
            return write!(f, "No trades yet");
        }

        let heavy = "=".repeat(60);
        writeln!(f, "{heavy}")?;
        writeln!(f, "PERFORMANCE SUMMARY")?;
        writeln!(f, "{heavy}")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<20} | Trades: {:>3} | Win Rate: {:>5.1}% | P/L: ${:>7.2} | Streak: {}",
                row.instrument, row.total_trades, row.win_rate, row.total_profit_loss, row.current_streak
            )?;
        }
        writeln!(f, "{}", "-".repeat(60))?;
        writeln!(
            f,
            "{:<20} | Trades: {:>3} | Win Rate: {:>5.1}% | P/L: ${:>7.2}",
            "OVERALL",
            self.total_trades,
            self.win_rate(),
            self.total_profit_loss
        )?;
        write!(f, "{heavy}")
    }
}
