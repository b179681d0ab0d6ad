//! Main entry point for the autoseq daemon.
//!
//! Parses the command line, loads and validates the configuration file, and
//! runs the supervisor until interrupted. The only fatal path is
//! configuration failure: every later error is converted into a log record
//! or a skipped unit of work.

use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use log::{error, warn};

use autoseq::config;
use autoseq::dispatch::NextflowRunner;
use autoseq::supervisor;

#[derive(Parser, Debug)]
#[command(name = "autoseq", version, about = "Sequencing-run watcher and analysis pipeline driver")]
struct Cli {
    /// Path to the configuration file (TOML or JSON)
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", e);
            exit(0);
        }
        Err(e) => {
            eprint!("{}", e);
            exit(1);
        }
    };

    if !cli.config.is_file() {
        eprintln!("Configuration file not found: {}", cli.config.display());
        exit(1);
    }

    let app_config = match config::load_config(&cli.config) {
        Ok(app_config) => app_config,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    if app_config.repl {
        warn!("repl is enabled in configuration but not supported by this build");
    }

    let runner = Arc::new(NextflowRunner::default());
    if let Err(e) = supervisor::run(app_config, cli.config, runner).await {
        error!("Daemon failed: {}", e);
        exit(1);
    }
}
