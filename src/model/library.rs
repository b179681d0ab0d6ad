//! Library identifiers and year partitioning
//!
//! Libraries carry their collection year as the two digits between a `BC`
//! prefix and the next uppercase letter. Both the symlink tree and the
//! analysis output tree are sharded by that two-digit year; identifiers
//! without a parseable year fall back to the current year.

use std::path::{Path, PathBuf};

use chrono::Utc;
use log::error;
use regex::Regex;

use crate::fs_utils;

/// Collection-year capture within a library identifier.
pub const LIBRARY_YEAR_PATTERN: &str = r"BC(\d{2})[A-Z]";

/// Two-digit year encoded in a library id, if present.
pub fn library_year(library_id: &str) -> Option<String> {
    let re = match Regex::new(LIBRARY_YEAR_PATTERN) {
        Ok(re) => re,
        Err(e) => {
            error!("Regex compilation failed in library-year: {}", e);
            return None;
        }
    };
    re.captures(library_id)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Current two-digit UTC year.
pub fn current_two_digit_year() -> String {
    Utc::now().format("%y").to_string()
}

/// Year partition of a library: encoded year, else the current year.
pub fn year_partition(library_id: &str) -> String {
    library_year(library_id).unwrap_or_else(current_two_digit_year)
}

/// Anchored filename pattern of one read of a library's pair.
pub fn fastq_read_pattern(library_id: &str, read: u8) -> String {
    format!(
        r"^{}_S\d+_L\d+_R{}_\d+\.fastq\.gz$",
        regex::escape(library_id),
        read
    )
}

/// Locate the R1 or R2 fastq of a library within a fastq directory.
pub fn find_read_file(fastq_dir: &Path, library_id: &str, read: u8) -> Option<PathBuf> {
    let pattern = fastq_read_pattern(library_id, read);
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            error!("Regex compilation failed in fastq-read: {}", e);
            return None;
        }
    };
    fs_utils::list_directory(fastq_dir).into_iter().find(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| re.is_match(name))
            .unwrap_or(false)
    })
}

/// Destination link names for a library under a year partition.
pub fn symlink_destinations(symlinks_root: &Path, library_id: &str) -> (PathBuf, PathBuf) {
    let partition = symlinks_root.join(year_partition(library_id));
    (
        partition.join(format!("{}_R1.fastq.gz", library_id)),
        partition.join(format!("{}_R2.fastq.gz", library_id)),
    )
}
