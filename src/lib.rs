//! # autoseq
//!
//! A long-running daemon that watches filesystem locations where sequencing
//! instruments deposit run output directories and drives a staged pipeline
//! of external analysis jobs over the libraries it finds.
//!
//! ## Architecture
//!
//! Components communicate exclusively through the topic-routed [`bus`]:
//!
//! - [`watch::discoverer`] periodically scans the configured run roots and
//!   publishes `run-directory-found` for at most one eligible run per tick.
//! - [`watch::materializer`] resolves each found run's libraries of
//!   interest, links their read pairs into the year-partitioned symlink
//!   tree, and publishes `symlinks-created`.
//! - [`dispatch::batcher`] collects analysis-topic events into size- and
//!   timeout-bounded batches.
//! - [`dispatch::dispatcher`] fans each batch out by event kind and library
//!   year, drives the external workflow runner per group, and publishes the
//!   stage completion events that feed the next stage.
//! - [`logging`] drains the logging topic into the `log` facade.
//! - [`supervisor`] wires everything together and owns shutdown.
//!
//! Durable state lives only in the filesystem (symlinks, output trees, and
//! marker files); a restart re-discovers work from scratch and converges.

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod fs_utils;
pub mod logging;
pub mod model;
pub mod registry;
pub mod samplesheet;
pub mod supervisor;
pub mod watch;
