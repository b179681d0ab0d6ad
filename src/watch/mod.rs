//! Run discovery and link materialization.

pub mod discoverer;
pub mod materializer;

pub use discoverer::{run_discoverer, scan_runs};
pub use materializer::{materialize_run, run_materializer, MaterializeError};
