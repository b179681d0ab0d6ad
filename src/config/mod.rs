//! Configuration loading and snapshots
//!
//! The daemon is configured from a single TOML or JSON file (selected by
//! extension) with kebab-case keys. Parsed configuration is held behind an
//! `RwLock` and replaced whole on reload so readers always see a consistent
//! snapshot and never a torn update.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Settings of the taxon-abundance pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TaxonAbundanceConfig {
    #[serde(default = "default_pipeline_version")]
    pub version: String,
    #[serde(default)]
    pub kraken_db: Option<PathBuf>,
    #[serde(default)]
    pub bracken_db: Option<PathBuf>,
}

impl Default for TaxonAbundanceConfig {
    fn default() -> Self {
        Self {
            version: default_pipeline_version(),
            kraken_db: None,
            bracken_db: None,
        }
    }
}

/// Settings of the routine-assembly pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoutineAssemblyConfig {
    #[serde(default = "default_pipeline_version")]
    pub version: String,
    #[serde(default = "default_assembly_tool")]
    pub assembly_tool: String,
    #[serde(default = "default_annotation_tool")]
    pub annotation_tool: String,
}

impl Default for RoutineAssemblyConfig {
    fn default() -> Self {
        Self {
            version: default_pipeline_version(),
            assembly_tool: default_assembly_tool(),
            annotation_tool: default_annotation_tool(),
        }
    }
}

/// Settings of the mlst pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MlstNfConfig {
    #[serde(default = "default_pipeline_version")]
    pub version: String,
}

impl Default for MlstNfConfig {
    fn default() -> Self {
        Self {
            version: default_pipeline_version(),
        }
    }
}

/// Settings of the plasmid-screen pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlasmidScreenConfig {
    #[serde(default = "default_pipeline_version")]
    pub version: String,
    #[serde(default)]
    pub mob_suite_db: Option<PathBuf>,
}

impl Default for PlasmidScreenConfig {
    fn default() -> Self {
        Self {
            version: default_pipeline_version(),
            mob_suite_db: None,
        }
    }
}

/// Full daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
    /// Directories scanned for run folders
    pub run_dirs: Vec<PathBuf>,
    /// Plain-text files, one run-id per line, blocking promotion
    #[serde(default)]
    pub run_exclude_files: Vec<PathBuf>,
    /// Plain-text files, one library-id per line, blocking materialization
    #[serde(default)]
    pub library_exclude_files: Vec<PathBuf>,
    /// Root under which per-year read-pair links are created
    pub fastq_symlinks_dir: PathBuf,
    /// Root under which per-year analysis output trees live
    pub analysis_output_dir: PathBuf,
    /// Directory receiving per-invocation runner log files
    pub nextflow_logs_dir: PathBuf,
    /// Project identifier matched against the sample sheet's project column
    pub samplesheet_project_id: String,
    /// Conda environment cache handed to the workflow runner
    #[serde(default)]
    pub conda_cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub taxon_abundance_config: TaxonAbundanceConfig,
    #[serde(default)]
    pub routine_assembly_config: RoutineAssemblyConfig,
    #[serde(default)]
    pub mlst_nf_config: MlstNfConfig,
    #[serde(default)]
    pub plasmid_screen_config: PlasmidScreenConfig,
    #[serde(default = "default_symlinking_scanning_interval_ms")]
    pub symlinking_scanning_interval_ms: u64,
    #[serde(default = "default_analysis_scanning_interval_ms")]
    pub analysis_scanning_interval_ms: u64,
    #[serde(default = "default_config_reload_interval_ms")]
    pub config_reload_interval_ms: u64,
    #[serde(default = "default_exclude_files_reload_interval_ms")]
    pub exclude_files_reload_interval_ms: u64,
    #[serde(default = "default_analysis_batch_max_size")]
    pub analysis_batch_max_size: usize,
    #[serde(default = "default_analysis_batch_timeout_ms")]
    pub analysis_batch_timeout_ms: u64,
    /// Operator REPL toggle; accepted but inert in this build
    #[serde(default)]
    pub repl: bool,
}

fn default_pipeline_version() -> String {
    "main".to_string()
}

fn default_assembly_tool() -> String {
    "unicycler".to_string()
}

fn default_annotation_tool() -> String {
    "prokka".to_string()
}

fn default_symlinking_scanning_interval_ms() -> u64 {
    2000
}

fn default_analysis_scanning_interval_ms() -> u64 {
    2000
}

fn default_config_reload_interval_ms() -> u64 {
    60_000
}

fn default_exclude_files_reload_interval_ms() -> u64 {
    60_000
}

fn default_analysis_batch_max_size() -> usize {
    10
}

fn default_analysis_batch_timeout_ms() -> u64 {
    5000
}

impl AppConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run_dirs.is_empty() {
            return Err(ConfigError::Invalid {
                message: "run-dirs must list at least one directory".to_string(),
            });
        }
        if self.samplesheet_project_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "samplesheet-project-id must not be empty".to_string(),
            });
        }
        if self.analysis_batch_max_size == 0 {
            return Err(ConfigError::Invalid {
                message: "analysis-batch-max-size must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Shared, reloadable configuration snapshot.
pub type SharedConfig = Arc<RwLock<AppConfig>>;

/// Read a consistent copy of the current configuration.
pub fn snapshot(config: &SharedConfig) -> AppConfig {
    match config.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Load and validate a configuration file, TOML or JSON by extension.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: AppConfig = if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    config.validate()?;
    Ok(config)
}

/// Periodically re-read the configuration file, replacing the shared
/// snapshot whole. A failed reload keeps the previous snapshot. Exits on a
/// stop-channel value.
pub async fn run_config_reloader(
    config_path: PathBuf,
    config: SharedConfig,
    mut stop_rx: mpsc::Receiver<()>,
) {
    loop {
        let interval = Duration::from_millis(snapshot(&config).config_reload_interval_ms);
        tokio::select! {
            _ = sleep(interval) => {
                match load_config(&config_path) {
                    Ok(new_config) => {
                        match config.write() {
                            Ok(mut guard) => *guard = new_config,
                            Err(poisoned) => *poisoned.into_inner() = new_config,
                        }
                    }
                    Err(e) => {
                        warn!("Config reload failed, keeping previous snapshot: {}", e);
                    }
                }
            }
            _ = stop_rx.recv() => {
                info!("Config reloader stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            run-dirs = ["/runs"]
            fastq-symlinks-dir = "/sym"
            analysis-output-dir = "/analysis"
            nextflow-logs-dir = "/logs"
            samplesheet-project-id = "cpo"
        "#
    }

    #[test]
    fn test_load_minimal_toml_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoseq.toml");
        std::fs::write(&path, minimal_toml()).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.run_dirs, vec![PathBuf::from("/runs")]);
        assert_eq!(config.symlinking_scanning_interval_ms, 2000);
        assert_eq!(config.config_reload_interval_ms, 60_000);
        assert_eq!(config.analysis_batch_max_size, 10);
        assert_eq!(config.analysis_batch_timeout_ms, 5000);
        assert_eq!(config.routine_assembly_config.assembly_tool, "unicycler");
        assert_eq!(config.routine_assembly_config.annotation_tool, "prokka");
        assert!(!config.repl);
        assert!(config.conda_cache_dir.is_none());
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoseq.json");
        std::fs::write(
            &path,
            r#"{
                "run-dirs": ["/runs"],
                "fastq-symlinks-dir": "/sym",
                "analysis-output-dir": "/analysis",
                "nextflow-logs-dir": "/logs",
                "samplesheet-project-id": "cpo",
                "analysis-batch-max-size": 3,
                "routine-assembly-config": {"version": "v0.4.2"}
            }"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.analysis_batch_max_size, 3);
        assert_eq!(config.routine_assembly_config.version, "v0.4.2");
        // Unspecified sub-keys still default.
        assert_eq!(config.routine_assembly_config.assembly_tool, "unicycler");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config(Path::new("/no/such/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_empty_run_dirs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoseq.toml");
        std::fs::write(
            &path,
            r#"
                run-dirs = []
                fastq-symlinks-dir = "/sym"
                analysis-output-dir = "/analysis"
                nextflow-logs-dir = "/logs"
                samplesheet-project-id = "cpo"
            "#,
        )
        .unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoseq.toml");
        std::fs::write(&path, minimal_toml()).unwrap();

        let shared: SharedConfig = Arc::new(RwLock::new(load_config(&path).unwrap()));
        let before = snapshot(&shared);
        shared.write().unwrap().analysis_batch_max_size = 99;
        assert_eq!(before.analysis_batch_max_size, 10);
        assert_eq!(snapshot(&shared).analysis_batch_max_size, 99);
    }
}
