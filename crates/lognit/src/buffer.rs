//! Fan-in of per-node query results into one ordered, bounded output.
//!
//! A query against a cluster fans out to every node, and each node answers
//! with its own historic batch. The buffer holds those batches until every
//! node has answered (or the wait times out), merges them in message order,
//! caps them, and prints them once. Live batches that show up meanwhile are
//! parked and only printed after [`ClusterBuffer::release_all`], from which
//! point everything passes straight through.

use crate::listener::RestListener;
use crate::model::{Message, MessageBatch};
use crate::permits::Permits;
use crate::printer::MessagePrinter;
use crate::{debug, warn};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const NO_CLUSTER_INFO: &str =
    "WARN: seems there is a bug in server response, no cluster info";
pub const MISSING_NODES_RESPONSE: &str =
    "WARN: missing some cluster responses, check nodes status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Collecting historic batches and parking live ones.
    Buffering,
    /// Historic flush done; live batches are still parked.
    Released,
    /// Every batch is printed as soon as it arrives.
    Streaming,
}

#[derive(Debug)]
struct BufferState {
    mode: BufferMode,
    historic: VecDeque<MessageBatch>,
    pending: VecDeque<MessageBatch>,
}

pub struct ClusterBuffer {
    printer: Arc<dyn MessagePrinter>,
    state: Mutex<BufferState>,
    arrivals: Permits,
}

impl std::fmt::Debug for ClusterBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterBuffer")
            .field("state", &self.state)
            .field("arrivals", &self.arrivals)
            .finish_non_exhaustive()
    }
}

impl ClusterBuffer {
    pub fn new(printer: Arc<dyn MessagePrinter>) -> Self {
        Self {
            printer,
            state: Mutex::new(BufferState {
                mode: BufferMode::Buffering,
                historic: VecDeque::new(),
                pending: VecDeque::new(),
            }),
            arrivals: Permits::new(),
        }
    }

    pub fn mode(&self) -> BufferMode {
        self.state.lock().mode
    }

    /// Admit one batch from any node or from the push channel.
    pub fn receive(&self, batch: MessageBatch) {
        let mut state = self.state.lock();
        match state.mode {
            BufferMode::Streaming => self.print_batch(&batch),
            BufferMode::Buffering if batch.is_historic() => {
                state.historic.push_back(batch);
                self.arrivals.release(1);
            }
            BufferMode::Released if batch.is_historic() => {
                warn!(
                    "Dropping historic batch of {} messages received after the historic flush",
                    batch.items.len()
                );
            }
            BufferMode::Buffering | BufferMode::Released => state.pending.push_back(batch),
        }
    }

    /// Block until every node answered or `timeout` elapsed, then print the
    /// merged historic results exactly once.
    ///
    /// Returns whether the full quorum answered. A `false` result is not an
    /// error: whatever did arrive has still been printed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn wait_historic(&self, timeout: Duration, release_max: usize) -> bool {
        let success = self.await_quorum(timeout).await;
        self.release_historic(release_max);
        success
    }

    async fn await_quorum(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        if !self.arrivals.acquire(1, timeout).await {
            warn!("No historic response within {}ms", timeout.as_millis());
            self.printer.print_status(MISSING_NODES_RESPONSE);
            return false;
        }

        // The first batch already counts toward the total.
        let total_nodes = self
            .state
            .lock()
            .historic
            .front()
            .map(|batch| batch.total_nodes)
            .unwrap_or_default();
        let Some(waiting) = total_nodes
            .checked_sub(1)
            .and_then(|waiting| usize::try_from(waiting).ok())
        else {
            warn!("Historic response carried invalid cluster size {total_nodes}");
            self.printer.print_status(NO_CLUSTER_INFO);
            tokio::time::sleep(timeout).await;
            return false;
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        debug!("Waiting up to {}ms for {waiting} more node(s)", remaining.as_millis());

        if !self.arrivals.acquire(waiting, remaining).await {
            warn!("Cluster quorum of {total_nodes} node(s) not reached in time");
            self.printer.print_status(MISSING_NODES_RESPONSE);
            return false;
        }

        debug!("All {total_nodes} node(s) answered");
        true
    }

    fn release_historic(&self, release_max: usize) {
        let mut state = self.state.lock();
        if state.mode == BufferMode::Buffering {
            state.mode = BufferMode::Released;
        }

        let batches: Vec<MessageBatch> = state.historic.drain(..).collect();
        for message in pick_valid_history(batches, release_max) {
            self.printer.print_message(&message);
        }
    }

    /// Print every parked live batch in arrival order and switch to
    /// pass-through streaming.
    pub fn release_all(&self) {
        let mut state = self.state.lock();
        state.mode = BufferMode::Streaming;

        while let Some(batch) = state.pending.pop_front() {
            self.print_batch(&batch);
        }
    }

    fn print_batch(&self, batch: &MessageBatch) {
        for message in batch.items.iter().rev() {
            self.printer.print_message(message);
        }
    }
}

impl RestListener<MessageBatch> for ClusterBuffer {
    fn receive(&self, event: MessageBatch) {
        ClusterBuffer::receive(self, event);
    }
}

/// Merge all batches, keep the `release_max` smallest messages in order and
/// return them reversed.
fn pick_valid_history(batches: Vec<MessageBatch>, release_max: usize) -> Vec<Message> {
    let mut heap: BinaryHeap<Reverse<Message>> = batches
        .into_iter()
        .flat_map(|batch| batch.items)
        .map(Reverse)
        .collect();

    let mut picked = Vec::with_capacity(release_max.min(heap.len()));
    while picked.len() < release_max {
        match heap.pop() {
            Some(Reverse(message)) => picked.push(message),
            None => break,
        }
    }

    picked.reverse();
    picked
}
