//! Run discoverer
//!
//! Periodic scan over the configured root directories producing at most one
//! `run-directory-found` event per tick. Emitting only the first eligible
//! run keeps promotion a steady trickle; a burst of new runs serialises
//! across ticks. Eligibility is evaluated against the current exclusion and
//! progress snapshots on every tick.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use crate::bus::{Event, MessageBus, RunDirectoryFound, Topic};
use crate::config::{self, SharedConfig};
use crate::fs_utils::{self, remove_from_end};
use crate::model;
use crate::registry::{ExclusionRegistry, ProgressRegistry};

/// First run directory passing every eligibility check, or `None`.
///
/// A run is eligible when it is a directory whose basename is a run-id,
/// carries the upload-complete marker, is not excluded, and has not been
/// promoted in this process lifetime.
pub fn scan_runs(
    run_dirs: &[PathBuf],
    exclusions: &ExclusionRegistry,
    progress: &ProgressRegistry,
) -> Option<PathBuf> {
    for root in run_dirs {
        let root_str = root.to_string_lossy();
        let root = Path::new(remove_from_end(&root_str, "/"));
        for candidate in fs_utils::list_directory(root) {
            if !candidate.is_dir() {
                continue;
            }
            let run_id = match model::run_id_of(&candidate) {
                Some(run_id) => run_id,
                None => continue,
            };
            if !model::is_run_id(&run_id) {
                continue;
            }
            if !model::is_upload_complete(&candidate) {
                continue;
            }
            if exclusions.is_run_excluded(&run_id) {
                debug!("Run {} is excluded", run_id);
                continue;
            }
            if progress.was_promoted(&run_id) {
                continue;
            }
            return Some(candidate);
        }
    }
    None
}

/// Scanner loop: between ticks, wait on either the configured interval or a
/// value on the stop channel, whichever arrives first.
pub async fn run_discoverer(
    bus: Arc<MessageBus>,
    config: SharedConfig,
    exclusions: Arc<ExclusionRegistry>,
    progress: Arc<ProgressRegistry>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    info!("Run discoverer started");
    loop {
        let interval =
            Duration::from_millis(config::snapshot(&config).symlinking_scanning_interval_ms);
        tokio::select! {
            _ = sleep(interval) => {
                let cfg = config::snapshot(&config);
                if let Some(run_dir) = scan_runs(&cfg.run_dirs, &exclusions, &progress) {
                    info!("Found eligible run: {}", run_dir.display());
                    let event = Event::RunDirectoryFound(RunDirectoryFound::new(run_dir));
                    if let Err(e) = bus
                        .publish_to_topics(&[Topic::Symlinking, Topic::Logging], event)
                        .await
                    {
                        error!("Failed to publish run-directory-found: {}", e);
                    }
                }
            }
            _ = stop_rx.recv() => {
                info!("Run discoverer stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::run::UPLOAD_COMPLETE_MARKER;

    const RUN_ID: &str = "220207_M00123_0123_000000000-A7TRG";

    fn make_run(root: &Path, run_id: &str, uploaded: bool) -> PathBuf {
        let run_dir = root.join(run_id);
        std::fs::create_dir_all(&run_dir).unwrap();
        if uploaded {
            std::fs::write(run_dir.join(UPLOAD_COMPLETE_MARKER), "{}").unwrap();
        }
        run_dir
    }

    #[test]
    fn test_scan_finds_uploadable_run() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = make_run(dir.path(), RUN_ID, true);

        let exclusions = ExclusionRegistry::new();
        let progress = ProgressRegistry::new();
        assert_eq!(
            scan_runs(&[dir.path().to_path_buf()], &exclusions, &progress),
            Some(run_dir)
        );
    }

    #[test]
    fn test_scan_skips_incomplete_and_misnamed_runs() {
        let dir = tempfile::tempdir().unwrap();
        make_run(dir.path(), RUN_ID, false);
        make_run(dir.path(), "not-a-run", true);

        let exclusions = ExclusionRegistry::new();
        let progress = ProgressRegistry::new();
        assert_eq!(
            scan_runs(&[dir.path().to_path_buf()], &exclusions, &progress),
            None
        );
    }

    #[test]
    fn test_scan_honours_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        make_run(dir.path(), RUN_ID, true);

        let exclude = dir.path().join("excluded_runs.txt");
        std::fs::write(&exclude, format!("{}\n", RUN_ID)).unwrap();

        let exclusions = ExclusionRegistry::new();
        exclusions.reload(std::slice::from_ref(&exclude), &[]);
        let progress = ProgressRegistry::new();
        assert_eq!(
            scan_runs(&[dir.path().to_path_buf()], &exclusions, &progress),
            None
        );
    }

    #[test]
    fn test_scan_skips_promoted_runs() {
        let dir = tempfile::tempdir().unwrap();
        make_run(dir.path(), RUN_ID, true);

        let exclusions = ExclusionRegistry::new();
        let progress = ProgressRegistry::new();
        progress.mark_promoted(RUN_ID);
        assert_eq!(
            scan_runs(&[dir.path().to_path_buf()], &exclusions, &progress),
            None
        );
    }

    #[test]
    fn test_scan_emits_first_eligible_run_only() {
        let dir = tempfile::tempdir().unwrap();
        let first = make_run(dir.path(), "220101_M00123_0001_000000000-AAAAA", true);
        make_run(dir.path(), "220102_M00123_0002_000000000-BBBBB", true);

        let exclusions = ExclusionRegistry::new();
        let progress = ProgressRegistry::new();
        assert_eq!(
            scan_runs(&[dir.path().to_path_buf()], &exclusions, &progress),
            Some(first)
        );
    }
}
