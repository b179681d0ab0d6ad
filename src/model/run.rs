//! Sequencing run identification
//!
//! A run is a directory whose basename encodes date, instrument, run number
//! and flowcell. The instrument prefix determines the instrument class,
//! which in turn selects sample-sheet layout and fastq directory
//! conventions downstream.

use std::path::Path;

use log::error;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fs_utils;

/// MiSeq run basenames: `220207_M00123_0123_000000000-A7TRG`.
pub const MISEQ_RUN_ID_PATTERN: &str = r"^\d{6}_M\d{5}_\d+_\d{9}-[A-Z0-9]{5}$";

/// NextSeq run basenames: `220207_VH00123_23_A7TY6AG73`.
pub const NEXTSEQ_RUN_ID_PATTERN: &str = r"^\d{6}_VH\d{5}_\d+_[A-Z0-9]{9}$";

/// Marker file whose presence at the run root makes the run uploadable.
pub const UPLOAD_COMPLETE_MARKER: &str = "upload_complete.json";

/// Instrument class derived from the run-id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentClass {
    Miseq,
    Nextseq,
    Unknown,
}

impl std::fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentClass::Miseq => write!(f, "miseq"),
            InstrumentClass::Nextseq => write!(f, "nextseq"),
            InstrumentClass::Unknown => write!(f, "unknown"),
        }
    }
}

fn compile_with_context(pattern: &str, context: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            error!("Regex compilation failed in {}: {}", context, e);
            None
        }
    }
}

fn matches_pattern(pattern: &str, context: &str, candidate: &str) -> bool {
    compile_with_context(pattern, context)
        .map(|re| re.is_match(candidate))
        .unwrap_or(false)
}

/// Whether a basename is a valid run identifier for any supported instrument.
pub fn is_run_id(name: &str) -> bool {
    matches_pattern(MISEQ_RUN_ID_PATTERN, "miseq run-id", name)
        || matches_pattern(NEXTSEQ_RUN_ID_PATTERN, "nextseq run-id", name)
}

/// Classify a run identifier by its instrument prefix.
pub fn instrument_class(run_id: &str) -> InstrumentClass {
    if matches_pattern(MISEQ_RUN_ID_PATTERN, "miseq run-id", run_id) {
        InstrumentClass::Miseq
    } else if matches_pattern(NEXTSEQ_RUN_ID_PATTERN, "nextseq run-id", run_id) {
        InstrumentClass::Nextseq
    } else {
        InstrumentClass::Unknown
    }
}

/// Basename of a run directory, when it has one.
pub fn run_id_of(run_dir: &Path) -> Option<String> {
    run_dir
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
}

/// A run is uploadable once the instrument has deposited its marker file.
pub fn is_upload_complete(run_dir: &Path) -> bool {
    fs_utils::exists(&run_dir.join(UPLOAD_COMPLETE_MARKER))
}
