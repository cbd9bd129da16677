// =============================================================================
// Decision Journal — bounded in-memory audit trail
// =============================================================================
//
// Keeps the most recent decisions (oldest evicted first) together with
// running per-provenance counters.  Superseded cycles never reach it.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::orchestrator::Decision;
use crate::types::Provenance;

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalStats {
    pub remote: u64,
    pub quant: u64,
    pub minimal: u64,
    pub rejected: u64,
}

#[derive(Debug)]
pub struct DecisionJournal {
    capacity: usize,
    entries: RwLock<VecDeque<Decision>>,
    remote: AtomicU64,
    quant: AtomicU64,
    minimal: AtomicU64,
    rejected: AtomicU64,
}

impl DecisionJournal {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            remote: AtomicU64::new(0),
            quant: AtomicU64::new(0),
            minimal: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn record(&self, decision: Decision) {
        let counter = match decision.provenance {
            Provenance::Remote => &self.remote,
            Provenance::Quant => &self.quant,
            Provenance::Minimal => &self.minimal,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if decision.is_rejected() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }

        let mut entries = self.entries.write();
        entries.push_back(decision);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Up to `count` most recent decisions, newest first.
    pub fn recent(&self, count: usize) -> Vec<Decision> {
        self.entries.read().iter().rev().take(count).cloned().collect()
    }

    /// Most recent decision for `asset`.
    pub fn latest_for(&self, asset: &str) -> Option<Decision> {
        self.entries.read().iter().rev().find(|d| d.asset == asset).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Counters over every decision ever recorded, evicted ones included.
    pub fn stats(&self) -> JournalStats {
        JournalStats {
            remote: self.remote.load(Ordering::Relaxed),
            quant: self.quant.load(Ordering::Relaxed),
            minimal: self.minimal.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for DecisionJournal {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
