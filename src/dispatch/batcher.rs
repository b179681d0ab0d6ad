//! Stage batcher
//!
//! Transforms the `analysis` subscription into a channel of batches. A
//! batch is emitted when either the configured number of messages has
//! accumulated or the configured timeout has elapsed since the batch's
//! first message, whichever comes first. Empty batches are never emitted;
//! when the upstream channel closes, any partial batch is flushed before
//! the downstream channel is closed.

use std::collections::VecDeque;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};

use crate::bus::{Consumer, Envelope};

/// Batcher loop; exits when the upstream consumer or the downstream
/// receiver is dropped.
pub async fn run_batcher(
    mut upstream: Consumer,
    batch_size: usize,
    batch_timeout: Duration,
    downstream: mpsc::Sender<Vec<Envelope>>,
) {
    let batch_size = batch_size.max(1);
    info!(
        "Stage batcher started (size {}, timeout {:?})",
        batch_size, batch_timeout
    );

    let mut buffered: VecDeque<Envelope> = VecDeque::new();
    let mut upstream_closed = false;

    'outer: while !(upstream_closed && buffered.is_empty()) {
        // First message of the next batch: overflow buffer first, then wait
        // on the live channel. The timeout only starts counting once a
        // batch has begun.
        let first = match buffered.pop_front() {
            Some(envelope) => envelope,
            None => match upstream.recv().await {
                Some(envelope) => envelope,
                None => break,
            },
        };
        let deadline = Instant::now() + batch_timeout;
        let mut batch = vec![first];

        while batch.len() < batch_size {
            if let Some(envelope) = buffered.pop_front() {
                batch.push(envelope);
                continue;
            }
            if upstream_closed {
                break;
            }
            tokio::select! {
                _ = sleep_until(deadline) => break,
                maybe = upstream.recv() => match maybe {
                    Some(envelope) => batch.push(envelope),
                    None => {
                        upstream_closed = true;
                        break;
                    }
                }
            }
        }

        // Hand the batch off without stalling intake. The dispatcher
        // publishes completion events back onto the analysis topic, so the
        // batcher must keep draining its subscription while it waits or
        // that cycle could wedge both sides.
        loop {
            tokio::select! {
                permit = downstream.reserve() => {
                    match permit {
                        Ok(permit) => permit.send(batch),
                        Err(_) => {
                            debug!("Batch receiver dropped, batcher exiting");
                            break 'outer;
                        }
                    }
                    break;
                }
                maybe = upstream.recv(), if !upstream_closed => match maybe {
                    Some(envelope) => buffered.push_back(envelope),
                    None => upstream_closed = true,
                }
            }
        }
    }

    info!("Stage batcher exiting");
}
