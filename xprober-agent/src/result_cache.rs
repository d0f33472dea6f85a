//! Latest result batch per worker
//!
//! Each worker overwrites its own entry on every successful cycle; the pusher
//! flattens the whole map into one upload. Writers never wait on the pusher:
//! DashMap shards keep a read of one entry from blocking writes to another.

use dashmap::DashMap;
use std::sync::Arc;
use xprober_common::{ProbeResult, WorkerIdentity};

/// Thread-safe cache mapping worker identities to their latest batch
#[derive(Clone, Default)]
pub struct ResultCache {
    inner: Arc<DashMap<WorkerIdentity, Vec<ProbeResult>>>,
}

impl ResultCache {
    /// Create a new empty result cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the batch held for a worker
    pub fn insert(&self, identity: WorkerIdentity, batch: Vec<ProbeResult>) {
        self.inner.insert(identity, batch);
    }

    /// Look up the batch held for a worker
    pub fn get(&self, identity: &WorkerIdentity) -> Option<Vec<ProbeResult>> {
        self.inner.get(identity).map(|r| r.clone())
    }

    /// Drop the batch of a worker that is no longer running
    pub fn remove(&self, identity: &WorkerIdentity) -> Option<Vec<ProbeResult>> {
        self.inner.remove(identity).map(|(_, v)| v)
    }

    /// Number of workers with a cached batch
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Every cached result as one sequence, ordered by worker identity
    pub fn flatten(&self) -> Vec<ProbeResult> {
        let mut batches: Vec<(WorkerIdentity, Vec<ProbeResult>)> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        batches.sort_by(|a, b| a.0.cmp(&b.0));

        batches.into_iter().flat_map(|(_, batch)| batch).collect()
    }
}
