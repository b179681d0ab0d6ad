//! Shared mutable state: exclusion sets and promotion progress.
//!
//! Both registries confine their state behind locks and expose snapshot or
//! membership reads; updates replace whole values so readers never observe
//! tearing.

pub mod exclusion;
pub mod progress;

pub use exclusion::{run_exclusion_reloader, ExclusionRegistry};
pub use progress::ProgressRegistry;
