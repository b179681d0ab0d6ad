//! External workflow runner seam
//!
//! The dispatcher drives pipelines through the [`WorkflowRunner`] trait so
//! tests can substitute a recording or scripted runner. The production
//! implementation shells out to `nextflow` and reports the exit code;
//! invocations are not cancellable once started.

use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use tokio::process::Command;

/// Errors from launching the external runner process.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// A fully assembled runner command line for one pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerInvocation {
    /// Workflow repository being run (for logs and events)
    pub pipeline_name: String,
    /// Complete argument list handed to the runner executable
    pub args: Vec<String>,
}

/// Interface to the external workflow runner.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    /// Run one invocation to completion and return its exit code.
    async fn run(&self, invocation: &RunnerInvocation) -> Result<i32, RunnerError>;
}

/// Production runner: invokes the `nextflow` executable.
pub struct NextflowRunner {
    program: String,
}

impl NextflowRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NextflowRunner {
    fn default() -> Self {
        Self::new("nextflow")
    }
}

#[async_trait]
impl WorkflowRunner for NextflowRunner {
    async fn run(&self, invocation: &RunnerInvocation) -> Result<i32, RunnerError> {
        debug!(
            "Running {} {}",
            self.program,
            invocation.args.join(" ")
        );
        let status = Command::new(&self.program)
            .args(&invocation.args)
            .status()
            .await
            .map_err(|source| RunnerError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        // A signal-terminated runner reports no code; treat it as failure.
        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = NextflowRunner::new("/no/such/program");
        let invocation = RunnerInvocation {
            pipeline_name: "BCCDC-PHL/routine-assembly".to_string(),
            args: vec!["run".to_string()],
        };
        assert!(matches!(
            runner.run(&invocation).await,
            Err(RunnerError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let runner = NextflowRunner::new("false");
        let invocation = RunnerInvocation {
            pipeline_name: "test".to_string(),
            args: Vec::new(),
        };
        assert_eq!(runner.run(&invocation).await.unwrap(), 1);

        let runner = NextflowRunner::new("true");
        assert_eq!(runner.run(&invocation).await.unwrap(), 0);
    }
}
