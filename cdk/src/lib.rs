//! Concurrent stream-reading core for data-source connectors.
//!
//! This crate implements the machinery shared by every connector that opts
//! into concurrent syncing: partition discovery fanned out across bounded
//! generation tasks, record retrieval across a bounded reader pool, and a
//! single consumer loop that merges results, tracks per-stream completion,
//! and surfaces partial failures without corrupting the overall sync.
//!
//! Connectors plug in by implementing [`stream::SourceStream`] and handing
//! their configured streams to [`source::ConcurrentSource`].

pub mod concurrency;
pub mod error;
mod macros;
pub mod metrics;
pub mod source;
pub mod stream;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;

/// Commonly used types, re-exported for convenient glob imports.
pub mod prelude {
    pub use cdk_config::shared::{ErrorPolicy, QueueConfig, SourceConfig};

    pub use crate::error::{CdkError, CdkResult, ErrorKind, StreamWorkerError};
    pub use crate::source::{ConcurrentSource, MessageStream};
    pub use crate::stream::{ConfiguredStream, SourceStream, StreamAvailability, SyncMode};
    pub use crate::types::{
        Partition, PartitionSlice, Record, RecordData, SourceMessage, StreamStatus,
    };
}
