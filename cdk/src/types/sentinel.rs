use std::sync::Arc;

use crate::types::Partition;

/// Marker enqueued once a stream's partition generation has finished.
///
/// The `has_generated_partition` flag distinguishes empty streams, which the
/// orchestrator completes immediately instead of waiting for readers that will
/// never run.
#[derive(Debug, Clone)]
pub struct PartitionGenerationCompletedSentinel {
    stream_name: Arc<str>,
    has_generated_partition: bool,
}

impl PartitionGenerationCompletedSentinel {
    /// Creates the sentinel for the named stream.
    pub fn new(stream_name: impl Into<Arc<str>>, has_generated_partition: bool) -> Self {
        Self {
            stream_name: stream_name.into(),
            has_generated_partition,
        }
    }

    /// Name of the stream whose generation completed.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// True if the generator produced at least one partition.
    pub fn has_generated_partition(&self) -> bool {
        self.has_generated_partition
    }
}

/// Two generation sentinels for the same stream are interchangeable.
impl PartialEq for PartitionGenerationCompletedSentinel {
    fn eq(&self, other: &PartitionGenerationCompletedSentinel) -> bool {
        self.stream_name == other.stream_name
    }
}

impl Eq for PartitionGenerationCompletedSentinel {}

/// Marker enqueued by a reader once a partition's read has finished,
/// successfully or not.
///
/// The orchestrator counts these per stream to decide when every known
/// partition has been read; workers never touch shared counters themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionCompletedSentinel {
    partition: Arc<Partition>,
}

impl PartitionCompletedSentinel {
    /// Creates the sentinel for the given partition.
    pub fn new(partition: Arc<Partition>) -> Self {
        Self { partition }
    }

    /// The partition whose read finished.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Name of the stream the finished partition belongs to.
    pub fn stream_name(&self) -> &str {
        self.partition.stream_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_sentinels_compare_by_stream_only() {
        let a = PartitionGenerationCompletedSentinel::new("orders", true);
        let b = PartitionGenerationCompletedSentinel::new("orders", false);
        let c = PartitionGenerationCompletedSentinel::new("customers", true);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
