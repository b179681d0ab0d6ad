//! Filesystem probes
//!
//! Thin helpers over the operating-system filesystem. Probes fail soft:
//! listing a missing directory yields an empty result, and link creation
//! swallows conflicts so that re-running an operation over an already
//! materialized tree is idempotent.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;

/// Absolute child paths of a directory, lexically sorted.
///
/// Missing or unreadable directories yield an empty listing.
pub fn list_directory(path: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Could not list {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    paths
}

/// Whether a path exists (follows symlinks).
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Create a directory and all missing parents.
pub fn make_directory_tree(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Set the unix mode bits of a single path.
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Recursively set mode bits under `root`: `dir_mode` on directories,
/// `file_mode` on regular files. Failures are logged per entry.
pub fn set_mode_recursive(root: &Path, dir_mode: u32, file_mode: u32) {
    if root.is_dir() {
        if let Err(e) = set_mode(root, dir_mode) {
            warn!("Could not set mode on {}: {}", root.display(), e);
        }
        for child in list_directory(root) {
            set_mode_recursive(&child, dir_mode, file_mode);
        }
    } else if root.is_file() {
        if let Err(e) = set_mode(root, file_mode) {
            warn!("Could not set mode on {}: {}", root.display(), e);
        }
    }
}

/// Remove a directory tree or file.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        Ok(())
    }
}

/// Create a symbolic link from `src` to `dest`.
///
/// Ensures the destination's parent exists and removes any pre-existing
/// file at the destination first. A `None` source or destination is a
/// no-op, and all I/O failures are swallowed after a debug log: an existing
/// link is as good as a created one.
pub fn symlink(src: Option<&Path>, dest: Option<&Path>) {
    let (src, dest) = match (src, dest) {
        (Some(src), Some(dest)) => (src, dest),
        _ => return,
    };

    if let Some(parent) = dest.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            debug!("Could not create {}: {}", parent.display(), e);
            return;
        }
    }

    if dest.symlink_metadata().is_ok() {
        if let Err(e) = fs::remove_file(dest) {
            debug!("Could not replace {}: {}", dest.display(), e);
            return;
        }
    }

    if let Err(e) = std::os::unix::fs::symlink(src, dest) {
        debug!(
            "Could not link {} -> {}: {}",
            dest.display(),
            src.display(),
            e
        );
    }
}

/// Translate a `*`/`?` glob into an anchored regular expression.
fn glob_to_regex(glob: &str) -> String {
    let mut pattern = String::with_capacity(glob.len() + 2);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    pattern
}

/// Children of `dir` whose basenames match a `*`/`?` glob, lexically sorted.
pub fn find_by_glob(dir: &Path, glob: &str) -> Vec<PathBuf> {
    let re = match Regex::new(&glob_to_regex(glob)) {
        Ok(re) => re,
        Err(e) => {
            warn!("Invalid glob {:?}: {}", glob, e);
            return Vec::new();
        }
    };
    list_directory(dir)
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| re.is_match(name))
                .unwrap_or(false)
        })
        .collect()
}

/// Strip every trailing occurrence of `suffix` from `s`.
///
/// Idempotent: the result never ends with `suffix`, so a second application
/// changes nothing. An empty suffix leaves `s` unchanged.
pub fn remove_from_end<'a>(s: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() {
        return s;
    }
    let mut out = s;
    while out.ends_with(suffix) {
        out = &out[..out.len() - suffix.len()];
    }
    out
}
