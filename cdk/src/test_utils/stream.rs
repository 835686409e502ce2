use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::json;

use crate::cdk_error;
use crate::error::{CdkResult, ErrorKind};
use crate::stream::{SourceStream, StreamAvailability, SyncMode};
use crate::types::{Partition, PartitionSlice, RecordData};

/// Script for one partition of an [`InMemoryStream`].
#[derive(Debug, Clone)]
pub struct PartitionSpec {
    records: u64,
    fail_after: Option<u64>,
}

impl PartitionSpec {
    /// A partition yielding `records` rows and completing successfully.
    pub fn with_records(records: u64) -> Self {
        Self {
            records,
            fail_after: None,
        }
    }

    /// Makes the partition fail after yielding `records` rows.
    pub fn failing_after(mut self, records: u64) -> Self {
        self.fail_after = Some(records);
        self
    }

    /// A partition that fails immediately without yielding any rows.
    pub fn failing() -> Self {
        Self::with_records(0).failing_after(0)
    }
}

/// A scripted stream backed entirely by memory.
///
/// Partitions and their record sets are declared up front; reads can be
/// slowed down and failures injected at any point. The stream records the
/// high-water mark of concurrent reads so throttling behavior can be
/// asserted on.
#[derive(Debug)]
pub struct InMemoryStream {
    name: String,
    partitions: Vec<PartitionSpec>,
    generation_failure: Option<String>,
    availability: StreamAvailability,
    read_delay: Option<Duration>,
    active_reads: Arc<AtomicUsize>,
    max_concurrent_reads: Arc<AtomicUsize>,
}

impl InMemoryStream {
    /// Creates a stream with the given name and no partitions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: Vec::new(),
            generation_failure: None,
            availability: StreamAvailability::Available,
            read_delay: None,
            active_reads: Arc::new(AtomicUsize::new(0)),
            max_concurrent_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Appends a scripted partition.
    pub fn with_partition(mut self, spec: PartitionSpec) -> Self {
        self.partitions.push(spec);
        self
    }

    /// Makes generation fail after every scripted partition has been yielded.
    pub fn with_generation_failure(mut self, reason: impl Into<String>) -> Self {
        self.generation_failure = Some(reason.into());
        self
    }

    /// Marks the stream unavailable with the given reason.
    pub fn unavailable(mut self, reason: impl Into<String>) -> Self {
        self.availability = StreamAvailability::unavailable(reason);
        self
    }

    /// Sleeps for `delay` before each yielded row, keeping reads in flight
    /// long enough for concurrency assertions.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Highest number of concurrent partition reads observed so far.
    pub fn max_concurrent_reads(&self) -> usize {
        self.max_concurrent_reads.load(Ordering::SeqCst)
    }
}

/// Tracks one in-flight partition read, updating the high-water mark.
#[derive(Debug)]
struct ReadGuard {
    active_reads: Arc<AtomicUsize>,
}

impl ReadGuard {
    fn enter(active_reads: &Arc<AtomicUsize>, max_concurrent_reads: &Arc<AtomicUsize>) -> Self {
        let now_active = active_reads.fetch_add(1, Ordering::SeqCst) + 1;
        max_concurrent_reads.fetch_max(now_active, Ordering::SeqCst);

        Self {
            active_reads: active_reads.clone(),
        }
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.active_reads.fetch_sub(1, Ordering::SeqCst);
    }
}

/// State threaded through one partition's record stream.
struct ReadState {
    partition_index: u64,
    next_row: u64,
    rows_to_yield: u64,
    fail_at_end: bool,
    failure_emitted: bool,
    read_delay: Option<Duration>,
    _guard: ReadGuard,
}

#[async_trait]
impl SourceStream for InMemoryStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_partitions(&self) -> BoxStream<'_, CdkResult<Partition>> {
        let mut items: Vec<CdkResult<Partition>> = self
            .partitions
            .iter()
            .enumerate()
            .map(|(index, _)| {
                let mut slice = PartitionSlice::new();
                slice.insert("index".to_string(), json!(index));
                Ok(Partition::new(self.name.clone(), slice))
            })
            .collect();

        if let Some(reason) = &self.generation_failure {
            items.push(Err(cdk_error!(
                ErrorKind::PartitionGenerationFailed,
                "Injected generation failure",
                detail = reason.clone()
            )));
        }

        futures::stream::iter(items).boxed()
    }

    fn read_records<'a>(
        &'a self,
        partition: &'a Partition,
        _sync_mode: SyncMode,
        _cursor_field: Option<&'a [String]>,
    ) -> BoxStream<'a, CdkResult<RecordData>> {
        let partition_index = partition.to_slice()["index"]
            .as_u64()
            .expect("in-memory partitions always carry their index");
        let spec = self.partitions[partition_index as usize].clone();

        let rows_to_yield = spec
            .fail_after
            .map(|after| after.min(spec.records))
            .unwrap_or(spec.records);
        let state = ReadState {
            partition_index,
            next_row: 0,
            rows_to_yield,
            fail_at_end: spec.fail_after.is_some(),
            failure_emitted: false,
            read_delay: self.read_delay,
            _guard: ReadGuard::enter(&self.active_reads, &self.max_concurrent_reads),
        };

        futures::stream::unfold(state, |mut state| async move {
            if state.next_row < state.rows_to_yield {
                if let Some(delay) = state.read_delay {
                    tokio::time::sleep(delay).await;
                }

                let mut data = RecordData::new();
                data.insert("partition".to_string(), json!(state.partition_index));
                data.insert("row".to_string(), json!(state.next_row));
                state.next_row += 1;

                return Some((Ok(data), state));
            }

            if state.fail_at_end && !state.failure_emitted {
                state.failure_emitted = true;
                let error = cdk_error!(
                    ErrorKind::PartitionReadFailed,
                    "Injected read failure",
                    detail = format!("partition {}", state.partition_index)
                );

                return Some((Err(error), state));
            }

            None
        })
        .boxed()
    }

    async fn check_availability(&self) -> CdkResult<StreamAvailability> {
        Ok(self.availability.clone())
    }
}
