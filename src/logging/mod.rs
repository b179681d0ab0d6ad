//! Logging consumer
//!
//! Drains the `logging` topic. `log-record` payloads are re-emitted through
//! the `log` facade at their carried level; any other event on the topic is
//! emitted at info level as its JSON serialisation. The consumer's only
//! buffering is its subscription channel, so it never back-pressures the
//! bus for long.

use log::{info, log, warn};

use crate::bus::{Consumer, Event};

/// Target under which bus traffic is logged.
pub const EVENTS_LOG_TARGET: &str = "autoseq::events";

/// Consumer loop; exits when the logging topic closes.
pub async fn run_log_consumer(mut consumer: Consumer) {
    info!("Logging consumer started");
    while let Some(envelope) = consumer.recv().await {
        match envelope.message {
            Event::LogRecord(record) => {
                log!(target: EVENTS_LOG_TARGET, record.level.to_level(), "{}", record.payload);
            }
            other => match serde_json::to_string(&other) {
                Ok(serialised) => info!(target: EVENTS_LOG_TARGET, "{}", serialised),
                Err(e) => warn!("Could not serialise {} event: {}", other.event_type(), e),
            },
        }
    }
    info!("Logging topic closed, logging consumer exiting");
}
