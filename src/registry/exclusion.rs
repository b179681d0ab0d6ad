//! Exclusion registry
//!
//! Holds the sets of run and library identifiers barred from promotion and
//! materialization. Each set is the union over a configured list of
//! plain-text files, one identifier per line; missing files are silently
//! skipped. Reloads rebuild each set from scratch and replace it whole, so
//! readers never observe a partially updated set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use crate::config::{self, SharedConfig};

/// Reloadable sets of excluded run and library identifiers.
pub struct ExclusionRegistry {
    excluded_run_ids: RwLock<HashSet<String>>,
    excluded_library_ids: RwLock<HashSet<String>>,
}

fn read_id_file(path: &Path) -> HashSet<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
        Err(e) => {
            debug!("Skipping exclude file {}: {}", path.display(), e);
            HashSet::new()
        }
    }
}

fn union_of_files(paths: &[PathBuf]) -> HashSet<String> {
    let mut ids = HashSet::new();
    for path in paths {
        ids.extend(read_id_file(path));
    }
    ids
}

impl ExclusionRegistry {
    /// Create a registry with empty sets.
    pub fn new() -> Self {
        Self {
            excluded_run_ids: RwLock::new(HashSet::new()),
            excluded_library_ids: RwLock::new(HashSet::new()),
        }
    }

    /// Rebuild both sets from the given file lists, replacing each whole.
    pub fn reload(&self, run_exclude_files: &[PathBuf], library_exclude_files: &[PathBuf]) {
        let runs = union_of_files(run_exclude_files);
        let libraries = union_of_files(library_exclude_files);

        match self.excluded_run_ids.write() {
            Ok(mut guard) => *guard = runs,
            Err(poisoned) => *poisoned.into_inner() = runs,
        }
        match self.excluded_library_ids.write() {
            Ok(mut guard) => *guard = libraries,
            Err(poisoned) => *poisoned.into_inner() = libraries,
        }
    }

    /// Whether a run identifier is currently excluded.
    pub fn is_run_excluded(&self, run_id: &str) -> bool {
        match self.excluded_run_ids.read() {
            Ok(guard) => guard.contains(run_id),
            Err(poisoned) => poisoned.into_inner().contains(run_id),
        }
    }

    /// Whether a library identifier is currently excluded.
    pub fn is_library_excluded(&self, library_id: &str) -> bool {
        match self.excluded_library_ids.read() {
            Ok(guard) => guard.contains(library_id),
            Err(poisoned) => poisoned.into_inner().contains(library_id),
        }
    }

    /// A point-in-time copy of the excluded library identifiers.
    pub fn excluded_libraries_snapshot(&self) -> HashSet<String> {
        match self.excluded_library_ids.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for ExclusionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically rebuild the exclusion sets on the configured cadence.
/// Exits on a stop-channel value.
pub async fn run_exclusion_reloader(
    registry: Arc<ExclusionRegistry>,
    config: SharedConfig,
    mut stop_rx: mpsc::Receiver<()>,
) {
    loop {
        let cfg = config::snapshot(&config);
        let interval = Duration::from_millis(cfg.exclude_files_reload_interval_ms);
        tokio::select! {
            _ = sleep(interval) => {
                let cfg = config::snapshot(&config);
                registry.reload(&cfg.run_exclude_files, &cfg.library_exclude_files);
            }
            _ = stop_rx.recv() => {
                info!("Exclusion reloader stopping");
                break;
            }
        }
    }
}
