//! Stage fan-out scenarios: batches trigger per-year pipeline invocations
//! and completion events re-enter the bus to drive the next stage.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use autoseq::bus::{Event, MessageBus, SymlinksCreated, Topic};
use autoseq::config::AppConfig;
use autoseq::dispatch::{
    run_batcher, run_dispatcher, RunnerError, RunnerInvocation, WorkflowRunner,
    ANALYSIS_COMPLETE_MARKER,
};

struct RecordingRunner {
    invocations: Mutex<Vec<RunnerInvocation>>,
}

impl RecordingRunner {
    fn new() -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    fn count_for(&self, repo: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|invocation| invocation.pipeline_name == repo)
            .count()
    }
}

#[async_trait]
impl WorkflowRunner for RecordingRunner {
    async fn run(&self, invocation: &RunnerInvocation) -> Result<i32, RunnerError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        Ok(0)
    }
}

fn test_config(root: &Path) -> AppConfig {
    let raw = format!(
        r#"
            run-dirs = ["{root}/runs"]
            fastq-symlinks-dir = "{root}/sym"
            analysis-output-dir = "{root}/analysis"
            nextflow-logs-dir = "{root}/logs"
            samplesheet-project-id = "cpo"
            analysis-batch-timeout-ms = 200
            routine-assembly-config = {{ version = "v0.4.2" }}
        "#,
        root = root.display()
    );
    toml::from_str(&raw).unwrap()
}

async fn wait_for_invocations(runner: &RecordingRunner, expected: usize) {
    for _ in 0..100 {
        if runner.count() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "expected {} invocations, saw {}",
        expected,
        runner.count()
    );
}

// S6 and the staged chain: symlinks-created for years 21 and 22 triggers
// four first-stage invocations; the resulting assembly-completed events
// re-enter the bus and trigger four second-stage invocations.
#[tokio::test]
async fn stage_fan_out_by_year_and_kind() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let batch_timeout = Duration::from_millis(cfg.analysis_batch_timeout_ms);

    let bus = Arc::new(MessageBus::new());
    let config = Arc::new(RwLock::new(cfg.clone()));
    let runner = Arc::new(RecordingRunner::new());

    let analysis = bus.subscribe(Topic::Analysis).await;
    let (batch_tx, batch_rx) = tokio::sync::mpsc::channel(1);
    let batcher = tokio::spawn(run_batcher(
        analysis,
        cfg.analysis_batch_max_size,
        batch_timeout,
        batch_tx,
    ));
    let dispatcher = tokio::spawn(run_dispatcher(
        Arc::clone(&bus),
        config,
        Arc::clone(&runner) as Arc<dyn WorkflowRunner>,
        batch_rx,
    ));

    for library_id in ["BC21A001A", "BC22A002A"] {
        let event = Event::SymlinksCreated(SymlinksCreated::new(
            library_id,
            format!("/sym/{}_R1.fastq.gz", library_id),
            format!("/sym/{}_R2.fastq.gz", library_id),
        ));
        bus.publish(Topic::Analysis, event).await.unwrap();
    }

    // First stage: routine-assembly and taxon-abundance per year.
    wait_for_invocations(&runner, 4).await;
    assert_eq!(runner.count_for("BCCDC-PHL/routine-assembly"), 2);
    assert_eq!(runner.count_for("BCCDC-PHL/taxon-abundance"), 2);

    // Second stage, driven by the assembly-completed events the dispatcher
    // itself published: mlst and plasmid-screen per year.
    wait_for_invocations(&runner, 8).await;
    assert_eq!(runner.count_for("BCCDC-PHL/mlst-nf"), 2);
    assert_eq!(runner.count_for("BCCDC-PHL/plasmid-screen"), 2);

    // Completion markers exist for both stages of the year-21 library.
    let lib_root = cfg.analysis_output_dir.join("21").join("BC21A001A");
    for stage_dir in [
        "routine-assembly-v0.4-output",
        "taxon-abundance-main-output",
        "mlst-main-output",
        "plasmid-screen-main-output",
    ] {
        let marker = lib_root.join(stage_dir).join(ANALYSIS_COMPLETE_MARKER);
        assert!(marker.is_file(), "missing marker {}", marker.display());
    }

    bus.close().await;
    batcher.await.unwrap();
    dispatcher.await.unwrap();
}

// Events with no fan-out are ignored by the dispatcher.
#[tokio::test]
async fn terminal_events_do_not_trigger_pipelines() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());

    let bus = Arc::new(MessageBus::new());
    let config = Arc::new(RwLock::new(cfg.clone()));
    let runner = Arc::new(RecordingRunner::new());

    let analysis = bus.subscribe(Topic::Analysis).await;
    let (batch_tx, batch_rx) = tokio::sync::mpsc::channel(1);
    let batcher = tokio::spawn(run_batcher(
        analysis,
        cfg.analysis_batch_max_size,
        Duration::from_millis(cfg.analysis_batch_timeout_ms),
        batch_tx,
    ));
    let dispatcher = tokio::spawn(run_dispatcher(
        Arc::clone(&bus),
        config,
        Arc::clone(&runner) as Arc<dyn WorkflowRunner>,
        batch_rx,
    ));

    bus.publish(
        Topic::Analysis,
        Event::MlstCompleted(autoseq::bus::MlstCompleted {
            id: "BC21A001A".to_string(),
            mlst_sequence_type_path: "/analysis/21/BC21A001A/st.tsv".into(),
        }),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(runner.count(), 0);

    bus.close().await;
    batcher.await.unwrap();
    dispatcher.await.unwrap();
}
