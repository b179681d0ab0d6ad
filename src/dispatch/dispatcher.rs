//! Stage dispatcher
//!
//! Consumes batches from the stage batcher, groups their messages by event
//! kind and library year, and drives the appropriate external pipeline for
//! each group. Partitions of one batch run concurrently; within a single
//! (kind, year) partition one pipeline invocation executes at a time.
//! Completed libraries are marked with `analysis_complete.json` and their
//! completion events re-enter the bus on the analysis topic.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bus::{
    AnalysisCompleted, AnalysisStarted, AssemblyCompleted, Envelope, Event, LogRecord, MessageBus,
    MlstCompleted, PlasmidScreenCompleted, TaxonAbundanceCompleted, Topic,
};
use crate::config::{self, AppConfig, SharedConfig};
use crate::fs_utils;
use crate::model;

use super::pipelines::{self, LibraryUnit, Pipeline};
use super::runner::{RunnerInvocation, WorkflowRunner};

/// Marker file written into a library's pipeline output directory on
/// successful completion.
pub const ANALYSIS_COMPLETE_MARKER: &str = "analysis_complete.json";

const OUTPUT_DIR_MODE: u32 = 0o750;
const OUTPUT_FILE_MODE: u32 = 0o640;

/// Errors preparing or finalising a pipeline invocation.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to prepare {path} for {pipeline}: {source}")]
    Prepare {
        pipeline: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Group a batch's dispatchable messages by (event kind, library year).
///
/// Arrival order is preserved within each partition; events without a
/// library payload are dropped here and ignored by the dispatcher.
pub fn partition_batch(batch: &[Envelope]) -> BTreeMap<(String, String), Vec<LibraryUnit>> {
    let mut groups: BTreeMap<(String, String), Vec<LibraryUnit>> = BTreeMap::new();
    for envelope in batch {
        let unit = match LibraryUnit::from_event(&envelope.message) {
            Some(unit) => unit,
            None => continue,
        };
        let kind = envelope.message.event_type().to_string();
        let year = model::year_partition(&unit.id);
        groups.entry((kind, year)).or_default().push(unit);
    }
    groups
}

/// Dispatcher loop; exits when the batch channel closes.
pub async fn run_dispatcher(
    bus: Arc<MessageBus>,
    config: SharedConfig,
    runner: Arc<dyn WorkflowRunner>,
    mut batches: mpsc::Receiver<Vec<Envelope>>,
) {
    info!("Stage dispatcher started");
    while let Some(batch) = batches.recv().await {
        debug!("Dispatching batch of {} messages", batch.len());
        let cfg = config::snapshot(&config);

        let mut handles = Vec::new();
        for ((kind, year), units) in partition_batch(&batch) {
            let fan_out = pipelines::fan_out(&kind);
            if fan_out.is_empty() {
                debug!("Ignoring {} {} event(s)", units.len(), kind);
                continue;
            }

            let bus = Arc::clone(&bus);
            let runner = Arc::clone(&runner);
            let cfg = cfg.clone();
            handles.push(tokio::spawn(async move {
                for pipeline in fan_out {
                    invoke_pipeline(&bus, &cfg, runner.as_ref(), *pipeline, &year, &units).await;
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Partition task failed: {}", e);
            }
        }
    }
    info!("Batch channel closed, dispatcher exiting");
}

async fn publish_error_record(bus: &MessageBus, payload: serde_json::Value) {
    let record = Event::LogRecord(LogRecord::error(payload));
    if let Err(e) = bus.publish(Topic::Logging, record).await {
        error!("Failed to publish log record: {}", e);
    }
}

/// Drive one pipeline over one year-partition of libraries.
///
/// The work directory and generated sample sheet are always cleaned up and
/// the output tree re-moded, whether or not the runner succeeded.
/// Completion markers and events are only produced on a zero exit.
async fn invoke_pipeline(
    bus: &MessageBus,
    cfg: &AppConfig,
    runner: &dyn WorkflowRunner,
    pipeline: Pipeline,
    year: &str,
    units: &[LibraryUnit],
) {
    let short = pipeline.short_name();
    match prepare_and_run(bus, cfg, runner, pipeline, year, units).await {
        Ok(exit_code) if exit_code == 0 => {
            let outdir = cfg.analysis_output_dir.join(year);
            for unit in units {
                if let Err(e) = complete_library(bus, cfg, pipeline, &outdir, unit).await {
                    error!("Failed to finalise {} for {}: {}", short, unit.id, e);
                }
            }
        }
        Ok(exit_code) => {
            error!(
                "Pipeline {} exited with status {} for year {}",
                short, exit_code, year
            );
            publish_error_record(
                bus,
                json!({
                    "message": "pipeline invocation failed",
                    "pipeline": pipeline.repo(),
                    "year": year,
                    "exit-status": exit_code,
                }),
            )
            .await;
        }
        Err(e) => {
            error!("Pipeline {} failed for year {}: {}", short, year, e);
            publish_error_record(
                bus,
                json!({
                    "message": e.to_string(),
                    "pipeline": pipeline.repo(),
                    "year": year,
                }),
            )
            .await;
        }
    }
}

async fn prepare_and_run(
    bus: &MessageBus,
    cfg: &AppConfig,
    runner: &dyn WorkflowRunner,
    pipeline: Pipeline,
    year: &str,
    units: &[LibraryUnit],
) -> Result<i32, DispatchError> {
    let short = pipeline.short_name();
    let invocation_id = Uuid::new_v4();
    let work_dir = std::env::temp_dir().join(format!("work-{}-{}", short, invocation_id));
    let sheet_path =
        std::env::temp_dir().join(format!("samplesheet-{}-{}.csv", short, invocation_id));

    let outdir = cfg.analysis_output_dir.join(year);
    fs_utils::make_directory_tree(&outdir).map_err(|source| DispatchError::Prepare {
        pipeline: short,
        path: outdir.clone(),
        source,
    })?;
    if let Err(e) = fs_utils::set_mode(&outdir, OUTPUT_DIR_MODE) {
        warn!("Could not set mode on {}: {}", outdir.display(), e);
    }

    let mut sheet = String::from(pipeline.samplesheet_header());
    sheet.push('\n');
    for unit in units {
        sheet.push_str(&pipeline.samplesheet_row(unit));
        sheet.push('\n');
    }
    std::fs::write(&sheet_path, sheet).map_err(|source| DispatchError::Prepare {
        pipeline: short,
        path: sheet_path.clone(),
        source,
    })?;

    if let Err(e) = fs_utils::make_directory_tree(&cfg.nextflow_logs_dir) {
        warn!(
            "Could not create {}: {}",
            cfg.nextflow_logs_dir.display(),
            e
        );
    }
    let digits: String = Utc::now()
        .to_rfc3339()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let log_file = cfg
        .nextflow_logs_dir
        .join(format!("{}-{}-nextflow.log", digits, short));

    for unit in units {
        let started = Event::AnalysisStarted(AnalysisStarted {
            pipeline_name: pipeline.repo().to_string(),
            id: unit.id.clone(),
        });
        if let Err(e) = bus.publish(Topic::Logging, started).await {
            warn!("Failed to publish analysis-started: {}", e);
        }
    }

    let mut args: Vec<String> = vec![
        "-log".to_string(),
        log_file.display().to_string(),
        "run".to_string(),
        pipeline.repo().to_string(),
        "-profile".to_string(),
        "conda".to_string(),
    ];
    if let Some(cache) = &cfg.conda_cache_dir {
        args.push("--cache".to_string());
        args.push(cache.display().to_string());
    }
    args.extend([
        "-r".to_string(),
        pipeline.version(cfg).to_string(),
        "--samplesheet_input".to_string(),
        sheet_path.display().to_string(),
        "--outdir".to_string(),
        outdir.display().to_string(),
        "-work-dir".to_string(),
        work_dir.display().to_string(),
    ]);
    args.extend(pipeline.extra_args(cfg));

    let invocation = RunnerInvocation {
        pipeline_name: pipeline.repo().to_string(),
        args,
    };
    info!(
        "Invoking {} for year {} over {} libraries",
        short,
        year,
        units.len()
    );
    let outcome = runner.run(&invocation).await;

    // Cleanup runs whether or not the invocation succeeded.
    fs_utils::set_mode_recursive(&outdir, OUTPUT_DIR_MODE, OUTPUT_FILE_MODE);
    if let Err(e) = fs_utils::remove_tree(&work_dir) {
        warn!("Could not remove {}: {}", work_dir.display(), e);
    }
    if let Err(e) = fs_utils::remove_tree(&sheet_path) {
        warn!("Could not remove {}: {}", sheet_path.display(), e);
    }

    match outcome {
        Ok(exit_code) => Ok(exit_code),
        Err(e) => {
            // A runner that could not even start behaves like a failed one.
            error!("Runner did not start for {}: {}", short, e);
            Ok(-1)
        }
    }
}

/// Mark one library's pipeline output complete and publish its completion
/// events.
async fn complete_library(
    bus: &MessageBus,
    cfg: &AppConfig,
    pipeline: Pipeline,
    outdir: &Path,
    unit: &LibraryUnit,
) -> Result<(), DispatchError> {
    let pipeline_outdir = outdir.join(&unit.id).join(pipeline.output_dir_name(cfg));
    fs_utils::make_directory_tree(&pipeline_outdir).map_err(|source| DispatchError::Prepare {
        pipeline: pipeline.short_name(),
        path: pipeline_outdir.clone(),
        source,
    })?;

    let marker = pipeline_outdir.join(ANALYSIS_COMPLETE_MARKER);
    let contents = json!({ "timestamp": Utc::now().to_rfc3339() });
    std::fs::write(&marker, contents.to_string()).map_err(|source| DispatchError::Prepare {
        pipeline: pipeline.short_name(),
        path: marker.clone(),
        source,
    })?;

    let artifact = fs_utils::find_by_glob(
        &pipeline_outdir,
        &pipeline.artifact_glob(cfg, &unit.id),
    )
    .into_iter()
    .next()
    .unwrap_or_else(|| pipeline_outdir.join(pipeline.expected_artifact(cfg, &unit.id)));

    let completion = match pipeline {
        Pipeline::RoutineAssembly => Event::AssemblyCompleted(AssemblyCompleted {
            id: unit.id.clone(),
            r1_path: unit.r1.clone().unwrap_or_default(),
            r2_path: unit.r2.clone().unwrap_or_default(),
            assembly_path: artifact,
            assembly_tool: cfg.routine_assembly_config.assembly_tool.clone(),
            annotation_tool: cfg.routine_assembly_config.annotation_tool.clone(),
        }),
        Pipeline::TaxonAbundance => Event::TaxonAbundanceCompleted(TaxonAbundanceCompleted {
            id: unit.id.clone(),
            taxon_report_path: artifact,
        }),
        Pipeline::Mlst => Event::MlstCompleted(MlstCompleted {
            id: unit.id.clone(),
            mlst_sequence_type_path: artifact,
        }),
        Pipeline::PlasmidScreen => Event::PlasmidScreenCompleted(PlasmidScreenCompleted {
            id: unit.id.clone(),
            resistance_gene_report_path: artifact,
        }),
    };
    if let Err(e) = bus
        .publish_to_topics(&[Topic::Analysis, Topic::Logging], completion)
        .await
    {
        error!(
            "Failed to publish completion for {} {}: {}",
            pipeline.short_name(),
            unit.id,
            e
        );
    }

    let completed = Event::AnalysisCompleted(AnalysisCompleted {
        pipeline_name: pipeline.repo().to_string(),
        pipeline_version: pipeline.version(cfg).to_string(),
        id: unit.id.clone(),
        outdir: pipeline_outdir,
    });
    if let Err(e) = bus.publish(Topic::Logging, completed).await {
        warn!("Failed to publish analysis-completed: {}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SymlinksCreated;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingRunner {
        invocations: Mutex<Vec<RunnerInvocation>>,
        exit_code: i32,
    }

    impl RecordingRunner {
        fn new(exit_code: i32) -> Self {
            Self {
                invocations: Mutex::new(Vec::new()),
                exit_code,
            }
        }

        fn recorded(&self) -> Vec<RunnerInvocation> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkflowRunner for RecordingRunner {
        async fn run(
            &self,
            invocation: &RunnerInvocation,
        ) -> Result<i32, super::super::runner::RunnerError> {
            self.invocations.lock().unwrap().push(invocation.clone());
            Ok(self.exit_code)
        }
    }

    fn test_config(root: &Path) -> AppConfig {
        let toml = format!(
            r#"
                run-dirs = ["{root}/runs"]
                fastq-symlinks-dir = "{root}/sym"
                analysis-output-dir = "{root}/analysis"
                nextflow-logs-dir = "{root}/logs"
                samplesheet-project-id = "cpo"
                routine-assembly-config = {{ version = "v0.4.2" }}
            "#,
            root = root.display()
        );
        toml::from_str(&toml).unwrap()
    }

    fn symlinks_created(id: &str) -> Envelope {
        Envelope::new(
            Topic::Analysis,
            Event::SymlinksCreated(SymlinksCreated::new(
                id,
                format!("/sym/{}_R1.fastq.gz", id),
                format!("/sym/{}_R2.fastq.gz", id),
            )),
        )
    }

    #[test]
    fn test_partition_batch_by_kind_and_year() {
        let batch = vec![
            symlinks_created("BC21A001A"),
            symlinks_created("BC22A002A"),
            symlinks_created("BC21A003A"),
            Envelope::new(
                Topic::Analysis,
                Event::LogRecord(LogRecord::info(json!({}))),
            ),
        ];
        let groups = partition_batch(&batch);
        assert_eq!(groups.len(), 2);

        let year_21 = &groups[&("symlinks-created".to_string(), "21".to_string())];
        assert_eq!(year_21.len(), 2);
        assert_eq!(year_21[0].id, "BC21A001A");
        assert_eq!(year_21[1].id, "BC21A003A");

        let year_22 = &groups[&("symlinks-created".to_string(), "22".to_string())];
        assert_eq!(year_22.len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_pipeline_writes_markers_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let bus = MessageBus::new();
        let mut analysis = bus.subscribe(Topic::Analysis).await;
        let runner = RecordingRunner::new(0);

        let units = vec![LibraryUnit {
            id: "BC21A001A".to_string(),
            r1: Some(PathBuf::from("/sym/21/BC21A001A_R1.fastq.gz")),
            r2: Some(PathBuf::from("/sym/21/BC21A001A_R2.fastq.gz")),
            assembly: None,
        }];
        invoke_pipeline(&bus, &cfg, &runner, Pipeline::RoutineAssembly, "21", &units).await;

        // Runner invoked once with the samplesheet flags.
        let recorded = runner.recorded();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0]
            .args
            .iter()
            .any(|arg| arg == "--samplesheet_input"));
        assert!(recorded[0].args.iter().any(|arg| arg == "-profile"));

        // The marker exists in the per-library output directory.
        let marker = cfg
            .analysis_output_dir
            .join("21")
            .join("BC21A001A")
            .join("routine-assembly-v0.4-output")
            .join(ANALYSIS_COMPLETE_MARKER);
        assert!(marker.is_file());
        let contents: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&marker).unwrap()).unwrap();
        assert!(contents["timestamp"].is_string());

        // An assembly-completed event re-entered the analysis topic.
        let envelope = analysis.recv().await.unwrap();
        match envelope.message {
            Event::AssemblyCompleted(completed) => {
                assert_eq!(completed.id, "BC21A001A");
                assert_eq!(completed.assembly_tool, "unicycler");
                assert!(completed
                    .assembly_path
                    .ends_with("BC21A001A_unicycler.fasta"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_invocation_publishes_no_completion() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let bus = MessageBus::new();
        let mut analysis = bus.subscribe(Topic::Analysis).await;
        let mut logging = bus.subscribe(Topic::Logging).await;
        let runner = RecordingRunner::new(1);

        let units = vec![LibraryUnit {
            id: "BC21A001A".to_string(),
            r1: Some(PathBuf::from("/r1")),
            r2: Some(PathBuf::from("/r2")),
            assembly: None,
        }];
        invoke_pipeline(&bus, &cfg, &runner, Pipeline::RoutineAssembly, "21", &units).await;

        // No completion event, no marker.
        assert!(analysis.try_recv().is_err());
        let marker = cfg
            .analysis_output_dir
            .join("21")
            .join("BC21A001A")
            .join("routine-assembly-v0.4-output")
            .join(ANALYSIS_COMPLETE_MARKER);
        assert!(!marker.exists());

        // The failure is visible on the logging topic with its exit status.
        let mut saw_failure = false;
        while let Ok(envelope) = logging.try_recv() {
            if let Event::LogRecord(record) = envelope.message {
                if record.payload["exit-status"] == json!(1) {
                    saw_failure = true;
                }
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_cleanup_removes_work_dir_and_samplesheet() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let bus = MessageBus::new();
        let runner = RecordingRunner::new(0);

        let units = vec![LibraryUnit {
            id: "BC21A001A".to_string(),
            r1: None,
            r2: None,
            assembly: None,
        }];
        invoke_pipeline(&bus, &cfg, &runner, Pipeline::Mlst, "21", &units).await;

        let recorded = runner.recorded();
        let args = &recorded[0].args;
        let sheet = args
            .iter()
            .position(|arg| arg == "--samplesheet_input")
            .map(|i| PathBuf::from(&args[i + 1]))
            .unwrap();
        let work = args
            .iter()
            .position(|arg| arg == "-work-dir")
            .map(|i| PathBuf::from(&args[i + 1]))
            .unwrap();
        assert!(!sheet.exists());
        assert!(!work.exists());
    }
}
