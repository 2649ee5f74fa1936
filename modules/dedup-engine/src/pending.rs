//! Pending/Pair Registry (§4.5 "Pending/Pair Registry", §4.10): tracks which
//! `tmpId`s are currently awaiting an LLM verdict for a job. The ingestion
//! controller consults [`PendingRegistry::is_settled`] before marking a job
//! `completed`, satisfying the per-job state machine's rule that every
//! pending item must reach a terminal state first (§4.10).

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct PendingRegistry {
    outstanding: HashSet<String>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `tmp_id` now awaits an LLM verdict (a `pending` event was
    /// just emitted for it).
    pub fn mark_pending(&mut self, tmp_id: impl Into<String>) {
        self.outstanding.insert(tmp_id.into());
    }

    /// Record that `tmp_id` reached a terminal state (`confirm` or `drop`).
    /// Returns `true` if it had in fact been outstanding.
    pub fn resolve(&mut self, tmp_id: &str) -> bool {
        self.outstanding.remove(tmp_id)
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// No pending items left unresolved — a job may transition to
    /// `completed` (§4.10: "Pending must reach a terminal state before the
    /// job is marked completed").
    pub fn is_settled(&self) -> bool {
        self.outstanding.is_empty()
    }
}
