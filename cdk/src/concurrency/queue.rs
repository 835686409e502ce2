//! The two bounded queues all cross-task communication flows through.
//!
//! The work queue carries discovered partitions from generation workers to the
//! orchestrator's submission path; the output queue carries records, completion
//! sentinels, and worker errors back to the single consumer loop. Both carry
//! tagged sum types so consumers pattern-match exhaustively.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::StreamWorkerError;
use crate::stream::ConfiguredStream;
use crate::types::{
    Partition, PartitionCompletedSentinel, PartitionGenerationCompletedSentinel, Record,
};

/// Items traveling on the partition work queue.
#[derive(Debug)]
pub enum WorkItem {
    /// A partition ready to be read, paired with the stream it belongs to.
    Partition {
        partition: Arc<Partition>,
        stream: Arc<ConfiguredStream>,
    },
    /// A stream finished generating partitions.
    GenerationCompleted(PartitionGenerationCompletedSentinel),
}

/// Items traveling on the output queue toward the single consumer loop.
#[derive(Debug)]
pub enum QueueItem {
    /// A row read from some partition.
    Record(Record),
    /// A partition's read finished, successfully or not.
    PartitionCompleted(PartitionCompletedSentinel),
    /// An error raised inside a worker task, surfaced as data.
    WorkerError(StreamWorkerError),
}

/// Transmitter side of the work queue.
pub type WorkQueueTx = mpsc::Sender<WorkItem>;

/// Receiver side of the work queue.
pub type WorkQueueRx = mpsc::Receiver<WorkItem>;

/// Transmitter side of the output queue.
pub type OutputQueueTx = mpsc::Sender<QueueItem>;

/// Receiver side of the output queue.
pub type OutputQueueRx = mpsc::Receiver<QueueItem>;

/// Creates the bounded work queue with the given capacity.
pub fn create_work_queue(capacity: usize) -> (WorkQueueTx, WorkQueueRx) {
    mpsc::channel(capacity)
}

/// Creates the bounded output queue with the given capacity.
pub fn create_output_queue(capacity: usize) -> (OutputQueueTx, OutputQueueRx) {
    mpsc::channel(capacity)
}
