//! # Solve History
//!
//! Append-only record of per-epoch snapshots: epoch index, elapsed wall
//! time and objective value. The scheduler decides the cadence
//! (`record_every`, plus epoch 0 and the terminal epoch); this module only
//! stores and serves the records.

use serde::{Deserialize, Serialize};

/// One recorded snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Epoch index (0 is the starting point, before any update).
    pub epoch: usize,
    /// Wall time elapsed since the solve started, in seconds.
    pub elapsed_secs: f64,
    /// Objective value: model loss plus prox penalty.
    pub objective: f64,
}

/// Append-only sequence of solve snapshots.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct History {
    records: Vec<HistoryRecord>,
}

impl History {
    pub fn new() -> Self {
        History::default()
    }

    pub(crate) fn push(&mut self, epoch: usize, elapsed_secs: f64, objective: f64) {
        self.records.push(HistoryRecord {
            epoch,
            elapsed_secs,
            objective,
        });
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn last_objective(&self) -> Option<f64> {
        self.records.last().map(|r| r.objective)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_append_in_order() {
        let mut history = History::new();
        history.push(0, 0.0, 10.0);
        history.push(1, 0.5, 4.0);
        assert_eq!(history.records().len(), 2);
        assert_eq!(history.records()[1].epoch, 1);
        assert_eq!(history.last_objective(), Some(4.0));
    }

    #[test]
    fn records_serialize() {
        let mut history = History::new();
        history.push(0, 0.0, 1.5);
        let json = serde_json::to_string(&history).unwrap();
        let back: History = serde_json::from_str(&json).unwrap();
        assert_eq!(back.records(), history.records());
    }
}
