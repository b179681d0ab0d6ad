//! Sample-sheet reading
//!
//! Locates a run's `SampleSheet*.csv` and extracts the libraries of
//! interest: rows of the instrument-specific data section whose project
//! column matches the configured project identifier. MiSeq sheets keep
//! their rows under `[Data]` (library id in column 1, project in column 9);
//! NextSeq sheets use `[Cloud_Data]` (library id in column 0, project in
//! column 1). Rows that are too short are treated as having empty cells.

use std::path::{Path, PathBuf};

use log::error;
use regex::Regex;

use crate::fs_utils;
use crate::model::InstrumentClass;

/// Sample-sheet basenames accepted at the run root.
pub const SAMPLESHEET_FILENAME_PATTERN: &str = r"^SampleSheet[a-zA-Z0-9\-_]*\.csv$";

/// Lines skipped immediately after a section header (column names plus the
/// blank or secondary line the instruments emit).
const HEADER_SKIP_LINES: usize = 2;

/// Section and column layout of one instrument class's sample sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    pub header: &'static str,
    pub project_column: usize,
    pub library_column: usize,
}

/// Section layout for an instrument class; `None` for unknown instruments.
pub fn section_for(class: InstrumentClass) -> Option<SectionSpec> {
    match class {
        InstrumentClass::Miseq => Some(SectionSpec {
            header: "[Data]",
            project_column: 9,
            library_column: 1,
        }),
        InstrumentClass::Nextseq => Some(SectionSpec {
            header: "[Cloud_Data]",
            project_column: 1,
            library_column: 0,
        }),
        InstrumentClass::Unknown => None,
    }
}

/// Locate the sample sheet at the root of a run directory.
pub fn find_samplesheet(run_dir: &Path) -> Option<PathBuf> {
    let re = match Regex::new(SAMPLESHEET_FILENAME_PATTERN) {
        Ok(re) => re,
        Err(e) => {
            error!("Regex compilation failed in samplesheet-name: {}", e);
            return None;
        }
    };
    fs_utils::list_directory(run_dir).into_iter().find(|path| {
        path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| re.is_match(name))
                .unwrap_or(false)
    })
}

fn cell(row: &[&str], index: usize) -> String {
    row.get(index).map(|value| value.trim()).unwrap_or("").to_string()
}

/// Library identifiers of the rows whose project column matches
/// `project_id`, projected to the library column.
///
/// Rows before the section header are ignored; the two lines immediately
/// after the header are skipped; reading stops at the next section header.
pub fn libraries_of_interest(
    lines: &[String],
    section: &SectionSpec,
    project_id: &str,
) -> Vec<String> {
    let mut libraries = Vec::new();
    let mut in_section = false;
    let mut skip_remaining = 0usize;

    for line in lines {
        let trimmed = line.trim();
        if !in_section {
            if trimmed.starts_with(section.header) {
                in_section = true;
                skip_remaining = HEADER_SKIP_LINES;
            }
            continue;
        }
        if skip_remaining > 0 {
            skip_remaining -= 1;
            continue;
        }
        if trimmed.starts_with('[') {
            break;
        }

        let row: Vec<&str> = trimmed.split(',').collect();
        if cell(&row, section.project_column) == project_id {
            let library_id = cell(&row, section.library_column);
            if !library_id.is_empty() {
                libraries.push(library_id);
            }
        }
    }

    libraries
}
