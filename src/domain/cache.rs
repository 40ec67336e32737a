//! Memoization of the price-fetch + annotation step.
//!
//! Entries are keyed by experiment identity, a fingerprint of its transaction
//! log, and the price request and gap limit that fed them. Re-importing an
//! experiment under the same name with a different log is a different key.
//! Nothing expires on time.

use chrono::NaiveDateTime;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::annotate::{AnnotateOptions, AnnotatedFrame};
use super::experiment::Experiment;
use super::ohlcv::Granularity;
use super::transaction::TransactionLog;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    pub experiment: String,
    pub transactions: u64,
    pub instrument: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub granularity: Granularity,
    pub max_gap: usize,
}

impl AnalysisKey {
    pub fn for_experiment(experiment: &Experiment, options: AnnotateOptions) -> Self {
        Self {
            experiment: experiment.name.clone(),
            transactions: log_fingerprint(&experiment.transactions),
            instrument: experiment.execution.instrument.clone(),
            start: experiment.start,
            end: experiment.end,
            granularity: options.granularity,
            max_gap: options.max_gap,
        }
    }
}

/// Hash over every field of every logged transaction, in key order.
pub fn log_fingerprint(log: &TransactionLog) -> u64 {
    let mut hasher = DefaultHasher::new();
    log.len().hash(&mut hasher);
    for (key, transaction) in log.iter() {
        key.hash(&mut hasher);
        transaction.action.hash(&mut hasher);
        transaction.price.to_bits().hash(&mut hasher);
        transaction.volume.to_bits().hash(&mut hasher);
        transaction.reasons.hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug, Default)]
pub struct AnalysisCache {
    frames: HashMap<AnalysisKey, Arc<AnnotatedFrame>>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AnalysisKey) -> Option<Arc<AnnotatedFrame>> {
        self.frames.get(key).cloned()
    }

    pub fn insert(&mut self, key: AnalysisKey, frame: AnnotatedFrame) -> Arc<AnnotatedFrame> {
        let frame = Arc::new(frame);
        self.frames.insert(key, Arc::clone(&frame));
        frame
    }

    /// Returns the cached frame, or runs `compute` and caches its result.
    /// A failed computation caches nothing.
    pub fn get_or_try_compute<E, F>(&mut self, key: AnalysisKey, compute: F) -> Result<Arc<AnnotatedFrame>, E>
    where
        F: FnOnce() -> Result<AnnotatedFrame, E>,
    {
        match self.frames.entry(key) {
            Entry::Occupied(entry) => {
                tracing::debug!(experiment = %entry.key().experiment, "analysis cache hit");
                Ok(Arc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                let frame = Arc::new(compute()?);
                Ok(Arc::clone(entry.insert(frame)))
            }
        }
    }

    /// Drops every entry computed for `experiment`.
    pub fn invalidate_experiment(&mut self, experiment: &str) -> usize {
        let before = self.frames.len();
        self.frames.retain(|key, _| key.experiment != experiment);
        before - self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
