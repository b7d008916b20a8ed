use crate::model::{PendingPrediction, Stats, TradeResult};
use fnv::FnvHashMap;
use itertools::Itertools;
use parking_lot::RwLock;
use smol_str::SmolStr;

/// Pending predictions, settled results and the latest statistics, each behind its
/// own lock.
#[derive(Debug, Default)]
pub struct Ledger {
    pending: RwLock<FnvHashMap<String, PendingPrediction>>,
    results: RwLock<FnvHashMap<SmolStr, Vec<TradeResult>>>,
    stats: RwLock<FnvHashMap<SmolStr, Stats>>,
}

impl Ledger {
    pub fn insert_pending(&self, pending: PendingPrediction) {
        self.pending.write().insert(pending.id.clone(), pending);
    }

    /// Remove and return a pending prediction. Only the first caller for an id
    /// receives it.
    pub fn take_pending(&self, id: &str) -> Option<PendingPrediction> {
        self.pending.write().remove(id)
    }

    /// Outstanding predictions for an instrument, ordered by expiry.
    pub fn pending(&self, instrument: &str) -> Vec<PendingPrediction> {
        self.pending
            .read()
            .values()
            .filter(|pending| pending.instrument == instrument)
            .cloned()
            .sorted_by_key(|pending| pending.expiry_time)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    pub fn push_result(&self, result: TradeResult) {
        self.results
            .write()
            .entry(result.instrument.clone())
            .or_default()
            .push(result);
    }

    pub fn results(&self, instrument: &str) -> Vec<TradeResult> {
        self.results
            .read()
            .get(instrument)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_results(&self) -> FnvHashMap<SmolStr, Vec<TradeResult>> {
        self.results.read().clone()
    }

    pub fn instruments_with_results(&self) -> Vec<SmolStr> {
        self.results.read().keys().cloned().sorted().collect()
    }

    /// Recompute and store an instrument's statistics while holding the results
    /// lock, so no result can be pushed between the read and the write.
    pub fn refresh_stats<F>(&self, instrument: &SmolStr, compute: F) -> Stats
    where
        F: FnOnce(&[TradeResult]) -> Stats,
    {
        let results = self.results.read();
        let stats = compute(results.get(instrument).map(Vec::as_slice).unwrap_or_default());
        self.stats.write().insert(instrument.clone(), stats.clone());
        stats
    }

    pub fn stats(&self, instrument: &str) -> Option<Stats> {
        self.stats.read().get(instrument).cloned()
    }

    pub fn all_stats(&self) -> FnvHashMap<SmolStr, Stats> {
        self.stats.read().clone()
    }
}
