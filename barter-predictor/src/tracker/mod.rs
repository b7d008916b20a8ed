//! Deferred settlement of accepted predictions.
//!
//! Every directional prediction becomes a [`PendingPrediction`] and a `(deadline, id)`
//! entry on the [`SettlementScheduler`]'s min-heap. A single scheduler task sleeps
//! until the earliest deadline and settles every entry that is due. Settlement
//! removes the pending entry first, so each id settles at most once.

use crate::{
    config::TrackingConfig,
    model::{PendingPrediction, Prediction, Stats, TradeResult},
    store::TickStore,
};
use chrono::Utc;
use fnv::FnvHashMap;
use smol_str::SmolStr;
use std::{cmp::Reverse, collections::BinaryHeap, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};

/// Pending, result and statistics tables.
pub mod ledger;

/// Win/loss rules, statistics and the performance summary.
pub mod stats;

pub use ledger::Ledger;
pub use stats::{PerformanceSummary, compute_stats};

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
struct Scheduled {
    deadline: Instant,
    id: String,
}

#[derive(Debug, Clone)]
pub struct OutcomeTracker {
    store: Arc<TickStore>,
    ledger: Arc<Ledger>,
    config: TrackingConfig,
    schedule_tx: mpsc::UnboundedSender<Scheduled>,
}

impl OutcomeTracker {
    /// Construct a tracker and the scheduler that settles its predictions. Nothing
    /// settles until [`SettlementScheduler::run`] is polled; deadlines are fixed when
    /// a prediction is tracked.
    pub fn new(store: Arc<TickStore>, config: TrackingConfig) -> (Self, SettlementScheduler) {
        let (schedule_tx, schedule_rx) = mpsc::unbounded_channel();
        let tracker = Self {
            store,
            ledger: Arc::new(Ledger::default()),
            config,
            schedule_tx,
        };
        let scheduler = SettlementScheduler {
            tracker: tracker.clone(),
            schedule_rx,
        };
        (tracker, scheduler)
    }

    /// Register a directional prediction for settlement after its horizon.
    ///
    /// Neutral predictions are ignored.
    pub fn track(&self, prediction: &Prediction, entry_price: f64) -> Option<PendingPrediction> {
        if !prediction.is_directional() {
            return None;
        }

        let horizon = Duration::from_secs(u64::from(prediction.horizon_secs));
        let pending = PendingPrediction {
            id: prediction.id.clone(),
            instrument: prediction.instrument.clone(),
            category: prediction.category,
            direction: prediction.direction,
            entry_price,
            entry_time: prediction.timestamp,
            horizon_secs: prediction.horizon_secs,
            confidence: prediction.confidence,
            expiry_time: prediction.timestamp
                + chrono::Duration::seconds(i64::from(prediction.horizon_secs)),
        };
        self.ledger.insert_pending(pending.clone());

        let scheduled = Scheduled {
            deadline: Instant::now() + horizon,
            id: pending.id.clone(),
        };
        if self.schedule_tx.send(scheduled).is_err() {
            warn!(id = %pending.id, "settlement scheduler stopped, prediction will not settle");
        }

        debug!(
            id = %pending.id,
            instrument = %pending.instrument,
            direction = %pending.direction,
            entry_price,
            horizon_secs = pending.horizon_secs,
            "tracking prediction"
        );
        Some(pending)
    }

    /// Settle a pending prediction against the instrument's latest price.
    ///
    /// Returns `None` if the id was already settled, or if no price is available, in
    /// which case the pending entry is discarded.
    pub fn settle(&self, id: &str) -> Option<TradeResult> {
        let pending = self.ledger.take_pending(id)?;

        let Some(exit_price) = self.store.latest_price(&pending.instrument) else {
            warn!(
                id,
                instrument = %pending.instrument,
                "no price available at expiry, dropping prediction"
            );
            return None;
        };

        let won = stats::is_win(pending.direction, pending.entry_price, exit_price);
        let result = TradeResult {
            prediction_id: pending.id,
            instrument: pending.instrument,
            category: pending.category,
            direction: pending.direction,
            entry_price: pending.entry_price,
            exit_price,
            entry_time: pending.entry_time,
            exit_time: Utc::now(),
            horizon_secs: pending.horizon_secs,
            confidence: pending.confidence,
            won,
            profit_loss: stats::profit_loss(won, self.config.stake, self.config.payout_ratio),
            price_change: exit_price - pending.entry_price,
        };

        info!(
            instrument = %result.instrument,
            direction = %result.direction,
            won,
            entry_price = result.entry_price,
            exit_price,
            confidence = result.confidence,
            profit_loss = result.profit_loss,
            "prediction settled"
        );

        self.ledger.push_result(result.clone());
        self.update_stats(&result.instrument);
        Some(result)
    }

    /// Recompute one instrument's statistics from its full history.
    pub fn update_stats(&self, instrument: &SmolStr) -> Stats {
        self.ledger.refresh_stats(instrument, |results| {
            compute_stats(instrument, results, self.config.recent_trades)
        })
    }

    /// Recompute statistics for every instrument with results.
    pub fn update_all_stats(&self) {
        for instrument in self.ledger.instruments_with_results() {
            self.update_stats(&instrument);
        }
    }

    pub fn stats(&self, instrument: &str) -> Stats {
        self.ledger
            .stats(instrument)
            .unwrap_or_else(|| Stats::empty(SmolStr::new(instrument)))
    }

    pub fn all_stats(&self) -> FnvHashMap<SmolStr, Stats> {
        self.ledger.all_stats()
    }

    pub fn results(&self, instrument: &str) -> Vec<TradeResult> {
        self.ledger.results(instrument)
    }

    pub fn all_results(&self) -> FnvHashMap<SmolStr, Vec<TradeResult>> {
        self.ledger.all_results()
    }

    pub fn pending(&self, instrument: &str) -> Vec<PendingPrediction> {
        self.ledger.pending(instrument)
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.pending_count()
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        let stats = self.ledger.all_stats();
        PerformanceSummary::new(stats.values())
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }
}

/// Owns the expiry heap. Run it on a single task.
#[derive(Debug)]
pub struct SettlementScheduler {
    tracker: OutcomeTracker,
    schedule_rx: mpsc::UnboundedReceiver<Scheduled>,
}

impl SettlementScheduler {
    pub async fn run(mut self) {
        let mut queue = BinaryHeap::<Reverse<Scheduled>>::new();
        let mut open = true;

        loop {
            let next_deadline = queue.peek().map(|Reverse(next)| next.deadline);

            tokio::select! {
                scheduled = self.schedule_rx.recv(), if open => match scheduled {
                    Some(scheduled) => queue.push(Reverse(scheduled)),
                    None => open = false,
                },
                _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                    Self::settle_due(&self.tracker, &mut queue, Instant::now());
                }
                else => break,
            }
        }

        debug!("settlement scheduler stopped");
    }

    fn settle_due(tracker: &OutcomeTracker, queue: &mut BinaryHeap<Reverse<Scheduled>>, now: Instant) {
        while let Some(Reverse(next)) = queue.peek() {
            if next.deadline > now {
                break;
            }
            if let Some(Reverse(due)) = queue.pop() {
                tracker.settle(&due.id);
            }
        }
    }
}
