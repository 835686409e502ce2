use std::sync::Arc;

use serde_json::{Map, Value};

use crate::types::Partition;

/// Row payload produced by a stream read, keyed by field name.
pub type RecordData = Map<String, Value>;

/// One retrieved data row, tied back to the partition it came from.
///
/// The partition reference is a weak association used only to recover the
/// stream name for routing and logging; it carries no ownership semantics.
#[derive(Debug, Clone)]
pub struct Record {
    data: RecordData,
    partition: Arc<Partition>,
}

impl Record {
    /// Creates a record read from the given partition.
    pub fn new(data: RecordData, partition: Arc<Partition>) -> Self {
        Self { data, partition }
    }

    /// The raw row payload.
    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Consumes the record and returns its payload.
    pub fn into_data(self) -> RecordData {
        self.data
    }

    /// The partition this record was read from.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Name of the stream this record belongs to.
    pub fn stream_name(&self) -> &str {
        self.partition.stream_name()
    }
}

/// Records compare by payload and originating stream name.
///
/// The partition instance is deliberately ignored so that re-reading a
/// partition yields records equal to the first read.
impl PartialEq for Record {
    fn eq(&self, other: &Record) -> bool {
        self.data == other.data && self.stream_name() == other.stream_name()
    }
}

impl Eq for Record {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartitionSlice;
    use serde_json::json;

    fn partition(stream_name: &str, page: u64) -> Arc<Partition> {
        let mut slice = PartitionSlice::new();
        slice.insert("page".to_string(), json!(page));
        Arc::new(Partition::new(stream_name, slice))
    }

    fn row(id: u64) -> RecordData {
        let mut data = RecordData::new();
        data.insert("id".to_string(), json!(id));
        data
    }

    #[test]
    fn records_are_equal_across_partition_instances_of_the_same_stream() {
        let a = Record::new(row(1), partition("stream_a", 0));
        let b = Record::new(row(1), partition("stream_a", 7));

        assert_eq!(a, b);
    }

    #[test]
    fn records_from_different_streams_are_not_equal() {
        let a = Record::new(row(1), partition("stream_a", 0));
        let b = Record::new(row(1), partition("stream_b", 0));

        assert_ne!(a, b);
    }

    #[test]
    fn records_with_different_payloads_are_not_equal() {
        let shared = partition("stream_a", 0);
        let a = Record::new(row(1), shared.clone());
        let b = Record::new(row(2), shared);

        assert_ne!(a, b);
    }
}
