use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::{Map, Value};

/// Slice descriptor of a partition: an opaque key-value mapping such as date
/// bounds or a page token.
pub type PartitionSlice = Map<String, Value>;

/// A unit of retrievable work for a stream.
///
/// Partitions are produced by a stream's partition generator and consumed
/// exactly once by a partition reader. They are immutable after creation and
/// compare (and hash) over their stream name, slice, and cursor field, so the
/// orchestrator can track and deduplicate them safely.
#[derive(Debug, Clone)]
pub struct Partition {
    stream_name: Arc<str>,
    slice: PartitionSlice,
    cursor_field: Option<Vec<String>>,
}

impl Partition {
    /// Creates a partition of the named stream covering the given slice.
    pub fn new(stream_name: impl Into<Arc<str>>, slice: PartitionSlice) -> Self {
        Self {
            stream_name: stream_name.into(),
            slice,
            cursor_field: None,
        }
    }

    /// Attaches the cursor field used when reading this partition incrementally.
    pub fn with_cursor_field(mut self, cursor_field: Vec<String>) -> Self {
        self.cursor_field = Some(cursor_field);
        self
    }

    /// Name of the stream this partition belongs to.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Returns the slice descriptor as a plain mapping.
    ///
    /// The surrounding connector-state layer checkpoints this mapping into
    /// sync state, so it must round-trip losslessly.
    pub fn to_slice(&self) -> &PartitionSlice {
        &self.slice
    }

    /// Cursor field used for incremental reads of this partition, if any.
    pub fn cursor_field(&self) -> Option<&[String]> {
        self.cursor_field.as_deref()
    }
}

impl PartialEq for Partition {
    fn eq(&self, other: &Partition) -> bool {
        self.stream_name == other.stream_name
            && self.slice == other.slice
            && self.cursor_field == other.cursor_field
    }
}

impl Eq for Partition {}

impl Hash for Partition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stream_name.hash(state);
        self.cursor_field.hash(state);

        // Slice values are hashed through their canonical JSON rendering since
        // `Value` does not implement `Hash`. The map is ordered, so equal
        // slices render identically.
        for (key, value) in &self.slice {
            key.hash(state);
            value.to_string().hash(state);
        }
    }
}
