//! Pipeline catalogue
//!
//! The four external pipelines the dispatcher can drive, their repositories,
//! sample-sheet shapes, configuration-derived flags, and expected output
//! artifacts. Incoming event kinds fan out to fixed pipeline pairs:
//! `symlinks-created` feeds assembly and taxon profiling, and
//! `assembly-completed` feeds typing and plasmid screening.

use std::path::PathBuf;

use crate::bus::Event;
use crate::config::AppConfig;

/// External pipelines driven by the stage dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    RoutineAssembly,
    TaxonAbundance,
    Mlst,
    PlasmidScreen,
}

const SYMLINKS_CREATED_FAN_OUT: [Pipeline; 2] = [Pipeline::RoutineAssembly, Pipeline::TaxonAbundance];
const ASSEMBLY_COMPLETED_FAN_OUT: [Pipeline; 2] = [Pipeline::Mlst, Pipeline::PlasmidScreen];

/// Pipelines triggered by an event kind; empty for kinds the dispatcher
/// ignores.
pub fn fan_out(event_kind: &str) -> &'static [Pipeline] {
    match event_kind {
        "symlinks-created" => &SYMLINKS_CREATED_FAN_OUT,
        "assembly-completed" => &ASSEMBLY_COMPLETED_FAN_OUT,
        _ => &[],
    }
}

/// `major.minor` prefix of a version tag (`v0.4.2` -> `v0.4`).
pub fn short_version(tag: &str) -> String {
    let mut parts = tag.splitn(3, '.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("{}.{}", major, minor),
        _ => tag.to_string(),
    }
}

impl Pipeline {
    /// Short name used for work directories, log files and output trees.
    pub fn short_name(self) -> &'static str {
        match self {
            Pipeline::RoutineAssembly => "routine-assembly",
            Pipeline::TaxonAbundance => "taxon-abundance",
            Pipeline::Mlst => "mlst",
            Pipeline::PlasmidScreen => "plasmid-screen",
        }
    }

    /// Workflow repository handed to the runner.
    pub fn repo(self) -> &'static str {
        match self {
            Pipeline::RoutineAssembly => "BCCDC-PHL/routine-assembly",
            Pipeline::TaxonAbundance => "BCCDC-PHL/taxon-abundance",
            Pipeline::Mlst => "BCCDC-PHL/mlst-nf",
            Pipeline::PlasmidScreen => "BCCDC-PHL/plasmid-screen",
        }
    }

    /// Configured version tag of this pipeline.
    pub fn version(self, cfg: &AppConfig) -> &str {
        match self {
            Pipeline::RoutineAssembly => &cfg.routine_assembly_config.version,
            Pipeline::TaxonAbundance => &cfg.taxon_abundance_config.version,
            Pipeline::Mlst => &cfg.mlst_nf_config.version,
            Pipeline::PlasmidScreen => &cfg.plasmid_screen_config.version,
        }
    }

    /// Pipeline-specific runner flags from configuration.
    pub fn extra_args(self, cfg: &AppConfig) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            Pipeline::RoutineAssembly => {
                args.push("--assembly_tool".to_string());
                args.push(cfg.routine_assembly_config.assembly_tool.clone());
                args.push("--annotation_tool".to_string());
                args.push(cfg.routine_assembly_config.annotation_tool.clone());
            }
            Pipeline::TaxonAbundance => {
                if let Some(kraken_db) = &cfg.taxon_abundance_config.kraken_db {
                    args.push("--kraken_db".to_string());
                    args.push(kraken_db.display().to_string());
                }
                if let Some(bracken_db) = &cfg.taxon_abundance_config.bracken_db {
                    args.push("--bracken_db".to_string());
                    args.push(bracken_db.display().to_string());
                }
            }
            Pipeline::Mlst => {}
            Pipeline::PlasmidScreen => {
                if let Some(mob_suite_db) = &cfg.plasmid_screen_config.mob_suite_db {
                    args.push("--mob_suite_db".to_string());
                    args.push(mob_suite_db.display().to_string());
                }
            }
        }
        args
    }

    /// Column header of this pipeline's input sample sheet.
    pub fn samplesheet_header(self) -> &'static str {
        match self {
            Pipeline::RoutineAssembly | Pipeline::TaxonAbundance => "ID,R1,R2",
            Pipeline::Mlst => "ID,ASSEMBLY",
            Pipeline::PlasmidScreen => "ID,R1,R2,ASSEMBLY",
        }
    }

    /// One sample-sheet row for a library; absent fields become empty cells.
    pub fn samplesheet_row(self, unit: &LibraryUnit) -> String {
        let path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        match self {
            Pipeline::RoutineAssembly | Pipeline::TaxonAbundance => {
                format!("{},{},{}", unit.id, path(&unit.r1), path(&unit.r2))
            }
            Pipeline::Mlst => format!("{},{}", unit.id, path(&unit.assembly)),
            Pipeline::PlasmidScreen => format!(
                "{},{},{},{}",
                unit.id,
                path(&unit.r1),
                path(&unit.r2),
                path(&unit.assembly)
            ),
        }
    }

    /// Per-library output directory name: `<short>-<major.minor>-output`.
    pub fn output_dir_name(self, cfg: &AppConfig) -> String {
        format!(
            "{}-{}-output",
            self.short_name(),
            short_version(self.version(cfg))
        )
    }

    /// Expected basename of this pipeline's primary artifact for a library.
    pub fn expected_artifact(self, cfg: &AppConfig, library_id: &str) -> String {
        match self {
            Pipeline::RoutineAssembly => format!(
                "{}_{}.fasta",
                library_id, cfg.routine_assembly_config.assembly_tool
            ),
            Pipeline::TaxonAbundance => format!("{}_abundances.tsv", library_id),
            Pipeline::Mlst => format!("{}_sequence_type.tsv", library_id),
            Pipeline::PlasmidScreen => format!("{}_resistance_gene_report.tsv", library_id),
        }
    }

    /// Glob locating this pipeline's primary artifact for a library.
    pub fn artifact_glob(self, cfg: &AppConfig, library_id: &str) -> String {
        match self {
            Pipeline::RoutineAssembly => format!(
                "{}_{}*.fasta",
                library_id, cfg.routine_assembly_config.assembly_tool
            ),
            Pipeline::TaxonAbundance => format!("{}*abundances*.tsv", library_id),
            Pipeline::Mlst => format!("{}*sequence_type*.tsv", library_id),
            Pipeline::PlasmidScreen => format!("{}*resistance_gene_report*.tsv", library_id),
        }
    }
}

/// One library's inputs within a batch partition.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryUnit {
    pub id: String,
    pub r1: Option<PathBuf>,
    pub r2: Option<PathBuf>,
    pub assembly: Option<PathBuf>,
}

impl LibraryUnit {
    /// Extract the library inputs carried by a dispatchable event.
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::SymlinksCreated(e) => Some(Self {
                id: e.id.clone(),
                r1: Some(e.symlink_paths.r1.clone()),
                r2: Some(e.symlink_paths.r2.clone()),
                assembly: None,
            }),
            Event::AssemblyCompleted(e) => Some(Self {
                id: e.id.clone(),
                r1: Some(e.r1_path.clone()),
                r2: Some(e.r2_path.clone()),
                assembly: Some(e.assembly_path.clone()),
            }),
            _ => None,
        }
    }
}
