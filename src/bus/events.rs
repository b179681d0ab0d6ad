//! Event type definitions and the unified Event enum
//!
//! Every message admitted to the bus is an [`Envelope`]: a topic, an
//! ISO-8601 UTC timestamp stamped at publish time, and an [`Event`] payload.
//! The payload is an internally tagged union keyed by the `event` tag;
//! downstream dispatch is by tag.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topics keying the publish/subscribe fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Symlinking,
    Analysis,
    Logging,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::Symlinking => write!(f, "symlinking"),
            Topic::Analysis => write!(f, "analysis"),
            Topic::Logging => write!(f, "logging"),
        }
    }
}

/// A published message: topic, publish-time timestamp, and tagged payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub topic: Topic,
    pub timestamp: DateTime<Utc>,
    pub message: Event,
}

impl Envelope {
    /// Wrap an event for the given topic, stamping the current UTC time.
    pub fn new(topic: Topic, message: Event) -> Self {
        Self {
            topic,
            timestamp: Utc::now(),
            message,
        }
    }
}

/// Unified event enumeration covering every message kind on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    RunDirectoryFound(RunDirectoryFound),
    SymlinksCreated(SymlinksCreated),
    AnalysisStarted(AnalysisStarted),
    AnalysisCompleted(AnalysisCompleted),
    AssemblyCompleted(AssemblyCompleted),
    TaxonAbundanceCompleted(TaxonAbundanceCompleted),
    MlstCompleted(MlstCompleted),
    PlasmidScreenCompleted(PlasmidScreenCompleted),
    LogRecord(LogRecord),
}

impl Event {
    /// Get the event kind as its wire tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::RunDirectoryFound(_) => "run-directory-found",
            Event::SymlinksCreated(_) => "symlinks-created",
            Event::AnalysisStarted(_) => "analysis-started",
            Event::AnalysisCompleted(_) => "analysis-completed",
            Event::AssemblyCompleted(_) => "assembly-completed",
            Event::TaxonAbundanceCompleted(_) => "taxon-abundance-completed",
            Event::MlstCompleted(_) => "mlst-completed",
            Event::PlasmidScreenCompleted(_) => "plasmid-screen-completed",
            Event::LogRecord(_) => "log-record",
        }
    }

    /// Canonical library identifier of the event, when it carries one.
    ///
    /// Year-partition grouping reads the library id through this single
    /// accessor rather than per-variant field names.
    pub fn library_id(&self) -> Option<&str> {
        match self {
            Event::SymlinksCreated(e) => Some(&e.id),
            Event::AnalysisStarted(e) => Some(&e.id),
            Event::AnalysisCompleted(e) => Some(&e.id),
            Event::AssemblyCompleted(e) => Some(&e.id),
            Event::TaxonAbundanceCompleted(e) => Some(&e.id),
            Event::MlstCompleted(e) => Some(&e.id),
            Event::PlasmidScreenCompleted(e) => Some(&e.id),
            Event::RunDirectoryFound(_) | Event::LogRecord(_) => None,
        }
    }
}

/// A candidate run directory passed eligibility checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RunDirectoryFound {
    pub run_dir: PathBuf,
}

impl RunDirectoryFound {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }
}

/// Destination paths of one library's read-pair links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SymlinkPaths {
    pub r1: PathBuf,
    pub r2: PathBuf,
}

/// Both links for a library were created under the year-partitioned tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SymlinksCreated {
    pub id: String,
    pub symlink_paths: SymlinkPaths,
}

impl SymlinksCreated {
    pub fn new(id: impl Into<String>, r1: impl Into<PathBuf>, r2: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            symlink_paths: SymlinkPaths {
                r1: r1.into(),
                r2: r2.into(),
            },
        }
    }
}

/// An external pipeline invocation is about to start for a library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct AnalysisStarted {
    pub pipeline_name: String,
    pub id: String,
}

/// An external pipeline invocation finished for a library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct AnalysisCompleted {
    pub pipeline_name: String,
    pub pipeline_version: String,
    pub id: String,
    pub outdir: PathBuf,
}

/// Terminal event of the routine-assembly stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct AssemblyCompleted {
    pub id: String,
    pub r1_path: PathBuf,
    pub r2_path: PathBuf,
    pub assembly_path: PathBuf,
    pub assembly_tool: String,
    pub annotation_tool: String,
}

/// Terminal event of the taxon-abundance stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct TaxonAbundanceCompleted {
    pub id: String,
    pub taxon_report_path: PathBuf,
}

/// Terminal event of the mlst stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct MlstCompleted {
    pub id: String,
    pub mlst_sequence_type_path: PathBuf,
}

/// Terminal event of the plasmid-screen stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct PlasmidScreenCompleted {
    pub id: String,
    pub resistance_gene_report_path: PathBuf,
}

/// Severity carried by a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map to the `log` facade's level.
    pub fn to_level(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// A free-form record destined for the logging topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct LogRecord {
    pub level: LogLevel,
    pub payload: Value,
}

impl LogRecord {
    pub fn new(level: LogLevel, payload: Value) -> Self {
        Self { level, payload }
    }

    pub fn error(payload: Value) -> Self {
        Self::new(LogLevel::Error, payload)
    }

    pub fn info(payload: Value) -> Self {
        Self::new(LogLevel::Info, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_tags() {
        let event = Event::RunDirectoryFound(RunDirectoryFound::new("/runs/x"));
        assert_eq!(event.event_type(), "run-directory-found");

        let event = Event::SymlinksCreated(SymlinksCreated::new("BC21A001A", "/a", "/b"));
        assert_eq!(event.event_type(), "symlinks-created");
    }

    #[test]
    fn test_event_serialization_uses_event_tag() {
        let event = Event::SymlinksCreated(SymlinksCreated::new(
            "BC21A001A",
            "/sym/21/BC21A001A_R1.fastq.gz",
            "/sym/21/BC21A001A_R2.fastq.gz",
        ));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], json!("symlinks-created"));
        assert_eq!(value["id"], json!("BC21A001A"));
        assert_eq!(
            value["symlink-paths"]["r1"],
            json!("/sym/21/BC21A001A_R1.fastq.gz")
        );

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_library_id_is_canonical() {
        let event = Event::AssemblyCompleted(AssemblyCompleted {
            id: "BC22A002A".to_string(),
            r1_path: PathBuf::from("/r1"),
            r2_path: PathBuf::from("/r2"),
            assembly_path: PathBuf::from("/asm"),
            assembly_tool: "unicycler".to_string(),
            annotation_tool: "prokka".to_string(),
        });
        assert_eq!(event.library_id(), Some("BC22A002A"));

        let event = Event::RunDirectoryFound(RunDirectoryFound::new("/runs/x"));
        assert_eq!(event.library_id(), None);
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(LogLevel::Error.to_level(), log::Level::Error);
        assert_eq!(LogLevel::Trace.to_level(), log::Level::Trace);
    }

    #[test]
    fn test_envelope_carries_topic_and_timestamp() {
        let before = Utc::now();
        let envelope = Envelope::new(
            Topic::Analysis,
            Event::LogRecord(LogRecord::info(json!({"msg": "hello"}))),
        );
        assert_eq!(envelope.topic, Topic::Analysis);
        assert!(envelope.timestamp >= before);
    }
}
