use std::sync::Arc;

use futures::StreamExt;
use metrics::counter;
use tracing::{debug, warn};

use crate::cdk_error;
use crate::concurrency::queue::{OutputQueueTx, QueueItem};
use crate::error::{CdkResult, ErrorKind, StreamWorkerError};
use crate::metrics::{CDK_RECORDS_READ_TOTAL, STREAM_NAME_LABEL};
use crate::stream::ConfiguredStream;
use crate::types::{Partition, PartitionCompletedSentinel, Record};

/// Reads one partition's records and feeds them to the output queue.
///
/// This is the failure-isolation boundary of the subsystem: errors never
/// escape a reader. They are wrapped with the stream name and pushed through
/// the queue as data, and a completion sentinel follows in every case, so one
/// partition's failure can neither stall the orchestrator's accounting nor
/// halt processing of unrelated partitions and streams.
#[derive(Debug, Clone)]
pub struct PartitionReader {
    output_queue_tx: OutputQueueTx,
}

impl PartitionReader {
    /// Creates a reader pushing onto the given output queue.
    pub fn new(output_queue_tx: OutputQueueTx) -> Self {
        Self { output_queue_tx }
    }

    /// Processes one partition to completion.
    pub async fn process_partition(
        &self,
        partition: Arc<Partition>,
        stream: Arc<ConfiguredStream>,
    ) {
        debug!(
            stream = stream.name(),
            slice = ?partition.to_slice(),
            "reading partition",
        );

        if let Err(err) = self.read_partition(&partition, &stream).await {
            warn!(
                stream = stream.name(),
                slice = ?partition.to_slice(),
                error = %err,
                "partition read failed",
            );

            let err = cdk_error!(
                ErrorKind::PartitionReadFailed,
                "Partition read failed",
                source: err
            );
            let worker_error = StreamWorkerError::new(stream.name(), err);
            if self
                .output_queue_tx
                .send(QueueItem::WorkerError(worker_error))
                .await
                .is_err()
            {
                warn!(
                    stream = stream.name(),
                    "output queue closed before the read error could be surfaced",
                );
                return;
            }
        }

        let sentinel = PartitionCompletedSentinel::new(partition);
        if self
            .output_queue_tx
            .send(QueueItem::PartitionCompleted(sentinel))
            .await
            .is_err()
        {
            warn!(
                stream = stream.name(),
                "output queue closed before the partition completion could be reported",
            );
        }
    }

    async fn read_partition(
        &self,
        partition: &Arc<Partition>,
        stream: &ConfiguredStream,
    ) -> CdkResult<()> {
        // The partition's own cursor field wins over the configured one, since
        // the generator may have narrowed it per slice.
        let cursor_field = partition.cursor_field().or_else(|| stream.cursor_field());

        let mut records =
            stream
                .stream()
                .read_records(partition, stream.sync_mode(), cursor_field);

        while let Some(row) = records.next().await {
            let data = row?;

            counter!(
                CDK_RECORDS_READ_TOTAL,
                STREAM_NAME_LABEL => stream.name().to_string()
            )
            .increment(1);

            let record = Record::new(data, Arc::clone(partition));
            self.output_queue_tx
                .send(QueueItem::Record(record))
                .await
                .map_err(|_| {
                    cdk_error!(
                        ErrorKind::QueueClosed,
                        "Output queue closed while reading records"
                    )
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::queue::create_output_queue;
    use crate::stream::SyncMode;
    use crate::test_utils::stream::{InMemoryStream, PartitionSpec};

    async fn run_reader(stream: InMemoryStream) -> Vec<QueueItem> {
        let (output_tx, mut output_rx) = create_output_queue(64);

        let configured = Arc::new(ConfiguredStream::new(
            Arc::new(stream),
            SyncMode::FullRefresh,
        ));
        let partition = {
            let mut partitions = configured.stream().generate_partitions();
            Arc::new(partitions.next().await.unwrap().unwrap())
        };

        let reader = PartitionReader::new(output_tx);
        reader.process_partition(partition, configured).await;

        let mut items = Vec::new();
        while let Ok(item) = output_rx.try_recv() {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn records_are_pushed_in_read_order_then_the_sentinel() {
        let stream = InMemoryStream::new("orders").with_partition(PartitionSpec::with_records(3));

        let items = run_reader(stream).await;
        assert_eq!(items.len(), 4);

        let mut previous_row = None;
        for item in &items[..3] {
            let QueueItem::Record(record) = item else {
                panic!("expected a record, got {item:?}");
            };
            assert_eq!(record.stream_name(), "orders");

            let row = record.data()["row"].as_u64().unwrap();
            if let Some(previous) = previous_row {
                assert!(row > previous);
            }
            previous_row = Some(row);
        }

        assert!(matches!(items[3], QueueItem::PartitionCompleted(_)));
    }

    #[tokio::test]
    async fn read_failures_become_worker_errors_followed_by_the_sentinel() {
        let stream = InMemoryStream::new("orders")
            .with_partition(PartitionSpec::with_records(2).failing_after(1));

        let items = run_reader(stream).await;
        assert_eq!(items.len(), 3);

        assert!(matches!(items[0], QueueItem::Record(_)));
        match &items[1] {
            QueueItem::WorkerError(worker_error) => {
                assert_eq!(worker_error.stream_name(), "orders");
                assert_eq!(
                    worker_error.error().kind(),
                    ErrorKind::PartitionReadFailed
                );
            }
            other => panic!("expected a worker error, got {other:?}"),
        }
        assert!(matches!(items[2], QueueItem::PartitionCompleted(_)));
    }
}
