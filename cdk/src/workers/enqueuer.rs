use std::sync::Arc;

use futures::StreamExt;
use metrics::counter;
use tracing::{debug, warn};

use crate::concurrency::queue::{OutputQueueTx, QueueItem, WorkItem, WorkQueueTx};
use crate::error::{CdkResult, ErrorKind, StreamWorkerError};
use crate::metrics::{CDK_PARTITIONS_GENERATED_TOTAL, STREAM_NAME_LABEL};
use crate::stream::ConfiguredStream;
use crate::types::{Partition, PartitionGenerationCompletedSentinel};
use crate::{bail, cdk_error};

/// Lifecycle of a partition generation worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationState {
    NotStarted,
    Generating,
    Done,
}

/// Discovers one stream's partitions and feeds them to the work queue.
///
/// One enqueuer handles exactly one stream. Partitions are pushed as they are
/// produced so readers can start before generation finishes; generation always
/// ends with either the sentinel or a worker error, so the orchestrator's
/// accounting can never stall waiting for this stream.
#[derive(Debug)]
pub struct PartitionEnqueuer {
    stream: Arc<ConfiguredStream>,
    work_queue_tx: WorkQueueTx,
    output_queue_tx: OutputQueueTx,
    state: GenerationState,
}

impl PartitionEnqueuer {
    /// Creates the generation worker for `stream`.
    pub fn new(
        stream: Arc<ConfiguredStream>,
        work_queue_tx: WorkQueueTx,
        output_queue_tx: OutputQueueTx,
    ) -> Self {
        Self {
            stream,
            work_queue_tx,
            output_queue_tx,
            state: GenerationState::NotStarted,
        }
    }

    /// Runs generation for the stream to completion.
    ///
    /// Never propagates errors upward. On success the generation sentinel is
    /// enqueued behind the last partition; on failure a [`StreamWorkerError`]
    /// classified as [`ErrorKind::PartitionGenerationFailed`] is forwarded
    /// through the output queue instead, and the orchestrator treats it as the
    /// end of this stream's generation. Either way the orchestrator's
    /// accounting can never stall waiting for this stream.
    pub async fn run(mut self) {
        self.set_state(GenerationState::Generating);

        let mut generated = Vec::new();
        match self.enqueue_partitions(&mut generated).await {
            Ok(()) => {
                let sentinel = PartitionGenerationCompletedSentinel::new(
                    self.stream.name(),
                    !generated.is_empty(),
                );
                if self
                    .work_queue_tx
                    .send(WorkItem::GenerationCompleted(sentinel))
                    .await
                    .is_err()
                {
                    warn!(
                        stream = self.stream.name(),
                        "work queue closed before the generation sentinel could be enqueued",
                    );
                }
            }
            Err(err) => {
                warn!(
                    stream = self.stream.name(),
                    error = %err,
                    "partition generation failed",
                );

                let err = cdk_error!(
                    ErrorKind::PartitionGenerationFailed,
                    "Partition generation failed",
                    source: err
                );
                let worker_error = StreamWorkerError::new(self.stream.name(), err);
                if self
                    .output_queue_tx
                    .send(QueueItem::WorkerError(worker_error))
                    .await
                    .is_err()
                {
                    warn!(
                        stream = self.stream.name(),
                        "output queue closed before the generation error could be surfaced",
                    );
                }
            }
        }

        debug!(
            stream = self.stream.name(),
            partitions = generated.len(),
            "partition generation finished",
        );
        self.set_state(GenerationState::Done);
    }

    /// Runs the partition generator for the stream, pushing each discovered
    /// partition onto the work queue as it is produced.
    ///
    /// Returns the full list of generated partitions for bookkeeping. Errors
    /// propagate to the caller, which is responsible for forwarding them
    /// through the queue machinery.
    pub async fn generate_partitions_for_stream(&self) -> CdkResult<Vec<Partition>> {
        let mut generated = Vec::new();
        self.enqueue_partitions(&mut generated).await?;
        Ok(generated)
    }

    async fn enqueue_partitions(&self, generated: &mut Vec<Partition>) -> CdkResult<()> {
        let mut partitions = self.stream.stream().generate_partitions();

        while let Some(partition) = partitions.next().await {
            let partition = partition?;

            debug!(
                stream = self.stream.name(),
                slice = ?partition.to_slice(),
                "discovered partition",
            );
            counter!(
                CDK_PARTITIONS_GENERATED_TOTAL,
                STREAM_NAME_LABEL => self.stream.name().to_string()
            )
            .increment(1);

            let work_item = WorkItem::Partition {
                partition: Arc::new(partition.clone()),
                stream: self.stream.clone(),
            };
            if self.work_queue_tx.send(work_item).await.is_err() {
                bail!(
                    ErrorKind::QueueClosed,
                    "Work queue closed during partition generation"
                );
            }

            generated.push(partition);
        }

        Ok(())
    }

    fn set_state(&mut self, next: GenerationState) {
        debug!(
            stream = self.stream.name(),
            from = ?self.state,
            to = ?next,
            "generation state changing",
        );

        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::queue::{create_output_queue, create_work_queue};
    use crate::stream::SyncMode;
    use crate::test_utils::stream::{InMemoryStream, PartitionSpec};

    fn configured(stream: InMemoryStream) -> Arc<ConfiguredStream> {
        Arc::new(ConfiguredStream::new(
            Arc::new(stream),
            SyncMode::FullRefresh,
        ))
    }

    #[tokio::test]
    async fn partitions_are_enqueued_and_followed_by_a_sentinel() {
        let (work_tx, mut work_rx) = create_work_queue(16);
        let (output_tx, _output_rx) = create_output_queue(16);

        let stream = InMemoryStream::new("orders")
            .with_partition(PartitionSpec::with_records(2))
            .with_partition(PartitionSpec::with_records(1));
        let enqueuer = PartitionEnqueuer::new(configured(stream), work_tx, output_tx);

        enqueuer.run().await;

        let mut partition_count = 0;
        loop {
            match work_rx.recv().await.unwrap() {
                WorkItem::Partition { partition, stream } => {
                    assert_eq!(partition.stream_name(), "orders");
                    assert_eq!(stream.name(), "orders");
                    partition_count += 1;
                }
                WorkItem::GenerationCompleted(sentinel) => {
                    assert_eq!(sentinel.stream_name(), "orders");
                    assert!(sentinel.has_generated_partition());
                    break;
                }
            }
        }
        assert_eq!(partition_count, 2);
    }

    #[tokio::test]
    async fn empty_streams_report_no_generated_partitions() {
        let (work_tx, mut work_rx) = create_work_queue(16);
        let (output_tx, _output_rx) = create_output_queue(16);

        let enqueuer =
            PartitionEnqueuer::new(configured(InMemoryStream::new("empty")), work_tx, output_tx);

        enqueuer.run().await;

        match work_rx.recv().await.unwrap() {
            WorkItem::GenerationCompleted(sentinel) => {
                assert!(!sentinel.has_generated_partition());
            }
            other => panic!("expected a generation sentinel, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generation_failures_are_forwarded_in_place_of_the_sentinel() {
        let (work_tx, mut work_rx) = create_work_queue(16);
        let (output_tx, mut output_rx) = create_output_queue(16);

        let stream = InMemoryStream::new("orders")
            .with_partition(PartitionSpec::with_records(1))
            .with_generation_failure("listing date ranges failed");
        let enqueuer = PartitionEnqueuer::new(configured(stream), work_tx, output_tx);

        enqueuer.run().await;

        // The partition produced before the failure still made it through, but
        // no sentinel follows: the worker error is the generation-end signal.
        assert!(matches!(
            work_rx.recv().await.unwrap(),
            WorkItem::Partition { .. }
        ));
        assert!(work_rx.try_recv().is_err());

        match output_rx.recv().await.unwrap() {
            QueueItem::WorkerError(worker_error) => {
                assert_eq!(worker_error.stream_name(), "orders");
                assert_eq!(
                    worker_error.error().kind(),
                    ErrorKind::PartitionGenerationFailed
                );
            }
            other => panic!("expected a worker error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generate_partitions_for_stream_returns_the_full_list() {
        let (work_tx, mut work_rx) = create_work_queue(16);
        let (output_tx, _output_rx) = create_output_queue(16);

        let stream = InMemoryStream::new("orders")
            .with_partition(PartitionSpec::with_records(1))
            .with_partition(PartitionSpec::with_records(1))
            .with_partition(PartitionSpec::with_records(1));
        let enqueuer = PartitionEnqueuer::new(configured(stream), work_tx, output_tx);

        let generated = enqueuer.generate_partitions_for_stream().await.unwrap();
        assert_eq!(generated.len(), 3);

        // Every returned partition was also pushed onto the work queue.
        for expected in &generated {
            match work_rx.recv().await.unwrap() {
                WorkItem::Partition { partition, .. } => assert_eq!(partition.as_ref(), expected),
                other => panic!("expected a partition, got {other:?}"),
            }
        }
    }
}
