//! Progress registry
//!
//! Process-local memory of the runs already promoted into the working set.
//! Admission is idempotent: marking is a set union, querying is a
//! membership test. Never persisted; a restart re-discovers progress from
//! the filesystem.

use std::collections::HashSet;
use std::sync::Mutex;

/// Set of run identifiers promoted during this process lifetime.
pub struct ProgressRegistry {
    promoted_runs: Mutex<HashSet<String>>,
}

impl ProgressRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            promoted_runs: Mutex::new(HashSet::new()),
        }
    }

    /// Record a run as promoted. Returns `true` when the run was not
    /// already marked.
    pub fn mark_promoted(&self, run_id: &str) -> bool {
        match self.promoted_runs.lock() {
            Ok(mut guard) => guard.insert(run_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(run_id.to_string()),
        }
    }

    /// Whether a run has been promoted in this process lifetime.
    pub fn was_promoted(&self, run_id: &str) -> bool {
        match self.promoted_runs.lock() {
            Ok(guard) => guard.contains(run_id),
            Err(poisoned) => poisoned.into_inner().contains(run_id),
        }
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_query() {
        let registry = ProgressRegistry::new();
        assert!(!registry.was_promoted("RUN1"));
        assert!(registry.mark_promoted("RUN1"));
        assert!(registry.was_promoted("RUN1"));
    }

    #[test]
    fn test_marking_is_idempotent() {
        let registry = ProgressRegistry::new();
        assert!(registry.mark_promoted("RUN1"));
        assert!(!registry.mark_promoted("RUN1"));
        assert!(registry.was_promoted("RUN1"));
    }
}
