//! Link materializer
//!
//! Consumes `run-directory-found` events and promotes each run into the
//! working set: resolves the libraries of interest from the sample sheet,
//! creates per-library read-pair symlinks under the year-partitioned tree,
//! publishes `symlinks-created` for every fully linked library, and marks
//! the run promoted. Re-running over the same run is safe: existing
//! destinations short-circuit and no duplicate events are published.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::json;
use thiserror::Error;

use crate::bus::{Consumer, Event, LogRecord, MessageBus, SymlinksCreated, Topic};
use crate::config::{self, AppConfig, SharedConfig};
use crate::fs_utils;
use crate::model::{self, InstrumentClass};
use crate::registry::{ExclusionRegistry, ProgressRegistry};
use crate::samplesheet;

/// Errors that fail a whole run; the run is logged and skipped, other runs
/// are unaffected.
#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("No sample sheet found in {run_dir}")]
    MissingSampleSheet { run_dir: PathBuf },

    #[error("Unknown instrument class for run {run_id}")]
    UnknownInstrumentClass { run_id: String },

    #[error("No fastq directory found under {run_dir}")]
    MissingFastqDirectory { run_dir: PathBuf },

    #[error("Failed to read sample sheet {path}: {source}")]
    SampleSheetRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Locate the fastq directory of a run by instrument class.
///
/// MiSeq runs keep demultiplexed reads under `Data/Intensities/BaseCalls`;
/// NextSeq runs keep one `Analysis/<n>/Data/fastq` tree per demultiplex,
/// of which the lexically last is the most recent.
pub fn fastq_directory(
    run_dir: &Path,
    class: InstrumentClass,
) -> Result<PathBuf, MaterializeError> {
    match class {
        InstrumentClass::Miseq => Ok(run_dir.join("Data").join("Intensities").join("BaseCalls")),
        InstrumentClass::Nextseq => fs_utils::list_directory(&run_dir.join("Analysis"))
            .into_iter()
            .filter(|entry| entry.is_dir())
            .next_back()
            .map(|entry| entry.join("Data").join("fastq"))
            .ok_or_else(|| MaterializeError::MissingFastqDirectory {
                run_dir: run_dir.to_path_buf(),
            }),
        InstrumentClass::Unknown => Err(MaterializeError::UnknownInstrumentClass {
            run_id: model::run_id_of(run_dir).unwrap_or_default(),
        }),
    }
}

fn link_pair_exists(r1: &Path, r2: &Path) -> bool {
    r1.symlink_metadata().is_ok() && r2.symlink_metadata().is_ok()
}

/// Promote one run: create links for its libraries of interest and publish
/// a `symlinks-created` event per fully linked library. Returns the number
/// of events published.
pub async fn materialize_run(
    run_dir: &Path,
    bus: &MessageBus,
    cfg: &AppConfig,
    exclusions: &ExclusionRegistry,
    progress: &ProgressRegistry,
) -> Result<usize, MaterializeError> {
    let run_id =
        model::run_id_of(run_dir).ok_or_else(|| MaterializeError::UnknownInstrumentClass {
            run_id: run_dir.display().to_string(),
        })?;
    let class = model::instrument_class(&run_id);

    let sheet_path = samplesheet::find_samplesheet(run_dir).ok_or_else(|| {
        MaterializeError::MissingSampleSheet {
            run_dir: run_dir.to_path_buf(),
        }
    })?;
    let sheet_contents = std::fs::read_to_string(&sheet_path).map_err(|source| {
        MaterializeError::SampleSheetRead {
            path: sheet_path.clone(),
            source,
        }
    })?;
    let sheet_lines: Vec<String> = sheet_contents.lines().map(String::from).collect();

    let section = samplesheet::section_for(class).ok_or_else(|| {
        MaterializeError::UnknownInstrumentClass {
            run_id: run_id.clone(),
        }
    })?;
    let libraries =
        samplesheet::libraries_of_interest(&sheet_lines, &section, &cfg.samplesheet_project_id);
    debug!(
        "Run {} has {} libraries of interest for project {}",
        run_id,
        libraries.len(),
        cfg.samplesheet_project_id
    );

    let fastq_dir = fastq_directory(run_dir, class)?;
    let excluded = exclusions.excluded_libraries_snapshot();

    let mut published = 0usize;
    for library_id in libraries {
        if excluded.contains(&library_id) {
            info!("Library {} is excluded, skipping", library_id);
            continue;
        }

        let (dest_r1, dest_r2) =
            model::symlink_destinations(&cfg.fastq_symlinks_dir, &library_id);
        if link_pair_exists(&dest_r1, &dest_r2) {
            debug!("Links for {} already exist, skipping", library_id);
            continue;
        }

        let src_r1 = model::find_read_file(&fastq_dir, &library_id, 1);
        let src_r2 = model::find_read_file(&fastq_dir, &library_id, 2);
        let (src_r1, src_r2) = match (src_r1, src_r2) {
            (Some(r1), Some(r2)) => (r1, r2),
            _ => {
                warn!(
                    "Could not find read pair for {} under {}",
                    library_id,
                    fastq_dir.display()
                );
                continue;
            }
        };

        fs_utils::symlink(Some(&src_r1), Some(&dest_r1));
        fs_utils::symlink(Some(&src_r2), Some(&dest_r2));
        if !link_pair_exists(&dest_r1, &dest_r2) {
            warn!("Partial link pair for {}, withholding event", library_id);
            continue;
        }

        let event = Event::SymlinksCreated(SymlinksCreated::new(
            library_id.clone(),
            dest_r1,
            dest_r2,
        ));
        if let Err(e) = bus
            .publish_to_topics(&[Topic::Symlinking, Topic::Analysis, Topic::Logging], event)
            .await
        {
            error!("Failed to publish symlinks-created for {}: {}", library_id, e);
            continue;
        }
        published += 1;
    }

    progress.mark_promoted(&run_id);
    Ok(published)
}

/// Materializer loop: handle every `run-directory-found` on the symlinking
/// topic until the upstream channel closes.
pub async fn run_materializer(
    bus: Arc<MessageBus>,
    mut consumer: Consumer,
    config: SharedConfig,
    exclusions: Arc<ExclusionRegistry>,
    progress: Arc<ProgressRegistry>,
) {
    info!("Link materializer started");
    while let Some(envelope) = consumer.recv().await {
        let run_dir = match envelope.message {
            Event::RunDirectoryFound(found) => found.run_dir,
            _ => continue,
        };
        let cfg = config::snapshot(&config);
        match materialize_run(&run_dir, &bus, &cfg, &exclusions, &progress).await {
            Ok(published) => {
                info!(
                    "Materialized {} libraries from {}",
                    published,
                    run_dir.display()
                );
            }
            Err(e) => {
                error!("Skipping run {}: {}", run_dir.display(), e);
                // A failed run still counts as seen, so it cannot starve
                // the one-run-per-tick scanner for the rest of the process.
                if let Some(run_id) = model::run_id_of(&run_dir) {
                    progress.mark_promoted(&run_id);
                }
                let record = Event::LogRecord(LogRecord::error(json!({
                    "message": e.to_string(),
                    "run-dir": run_dir.display().to_string(),
                })));
                if let Err(publish_err) = bus.publish(Topic::Logging, record).await {
                    error!("Failed to publish log record: {}", publish_err);
                }
            }
        }
    }
    info!("Symlinking topic closed, materializer exiting");
}
