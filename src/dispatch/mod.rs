//! Stage batching and dispatch.
//!
//! The batcher bounds how often external pipelines launch; the dispatcher
//! fans each batch out by event kind and library year and drives one
//! pipeline invocation per (kind, year, pipeline) combination.

pub mod batcher;
pub mod dispatcher;
pub mod pipelines;
pub mod runner;

pub use batcher::run_batcher;
pub use dispatcher::{partition_batch, run_dispatcher, DispatchError, ANALYSIS_COMPLETE_MARKER};
pub use pipelines::{fan_out, short_version, LibraryUnit, Pipeline};
pub use runner::{NextflowRunner, RunnerError, RunnerInvocation, WorkflowRunner};
