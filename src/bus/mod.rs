//! # Topic-routed event bus
//!
//! In-process publish/subscribe messaging between the engine's components.
//! Components communicate exclusively through this bus; there is no other
//! cross-component channel.
//!
//! ## Contract
//! - Every message carries a topic; the bus dispatches to all subscribers of
//!   that topic.
//! - Delivery to a single subscriber is ordered (FIFO).
//! - Channels are bounded: publishers block when a subscriber's channel is
//!   full, making back-pressure visible.
//!
//! ## Topics in use
//! - `symlinking` - run discovery and link materialization
//! - `analysis` - stage completion events feeding the batcher/dispatcher
//! - `logging` - records drained by the logging consumer

pub use error_handling::{MessageBusError, MessageBusResult, RecvTimeoutError, TryRecvError};
pub use events::{
    AnalysisCompleted, AnalysisStarted, AssemblyCompleted, Envelope, Event, LogLevel, LogRecord,
    MlstCompleted, PlasmidScreenCompleted, RunDirectoryFound, SymlinkPaths, SymlinksCreated,
    TaxonAbundanceCompleted, Topic,
};
pub use message_bus::{Consumer, MessageBus, DEFAULT_CHANNEL_CAPACITY};

mod error_handling;
mod events;
mod message_bus;
