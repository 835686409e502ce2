//! The stream interface connectors implement to opt into concurrent syncing.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::CdkResult;
use crate::types::{Partition, RecordData};

/// How a stream's records are read during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Read every record of the stream.
    FullRefresh,
    /// Read records past the cursor recorded by the previous sync.
    Incremental,
}

/// Result of a stream availability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAvailability {
    /// The stream can be synced.
    Available,
    /// The stream cannot be synced right now; the reason is user-facing.
    Unavailable { reason: String },
}

impl StreamAvailability {
    /// Creates an unavailable result with the given reason.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// True if the stream can be synced.
    pub fn is_available(&self) -> bool {
        matches!(self, StreamAvailability::Available)
    }

    /// The reason the stream is unavailable, if it is.
    pub fn reason(&self) -> Option<&str> {
        match self {
            StreamAvailability::Available => None,
            StreamAvailability::Unavailable { reason } => Some(reason),
        }
    }
}

/// A logical data stream a connector can sync concurrently.
///
/// Implementations are thin adapters over a remote source: they know how to
/// split the stream into partitions and how to read one partition's records.
/// All concurrency lives in the orchestrator; implementations only need to be
/// safe to share across tasks.
#[async_trait]
pub trait SourceStream: Send + Sync {
    /// Unique name of the stream within its source.
    fn name(&self) -> &str;

    /// Discovers the partitions of this stream.
    ///
    /// Partitions are consumed as they are yielded, so implementations should
    /// emit them incrementally instead of materializing the full set first.
    /// Discovery may itself call out to the remote API.
    fn generate_partitions(&self) -> BoxStream<'_, CdkResult<Partition>>;

    /// Reads the records of one partition.
    ///
    /// Row order within the returned stream is preserved end to end.
    fn read_records<'a>(
        &'a self,
        partition: &'a Partition,
        sync_mode: SyncMode,
        cursor_field: Option<&'a [String]>,
    ) -> BoxStream<'a, CdkResult<RecordData>>;

    /// Probes whether the stream can be synced at all.
    async fn check_availability(&self) -> CdkResult<StreamAvailability>;
}

/// A stream paired with the sync options chosen for this run.
pub struct ConfiguredStream {
    stream: Arc<dyn SourceStream>,
    sync_mode: SyncMode,
    cursor_field: Option<Vec<String>>,
}

impl ConfiguredStream {
    /// Configures `stream` to be synced with the given mode.
    pub fn new(stream: Arc<dyn SourceStream>, sync_mode: SyncMode) -> Self {
        Self {
            stream,
            sync_mode,
            cursor_field: None,
        }
    }

    /// Sets the cursor field used for incremental reads of this stream.
    pub fn with_cursor_field(mut self, cursor_field: Vec<String>) -> Self {
        self.cursor_field = Some(cursor_field);
        self
    }

    /// The underlying stream.
    pub fn stream(&self) -> &dyn SourceStream {
        self.stream.as_ref()
    }

    /// Name of the underlying stream.
    pub fn name(&self) -> &str {
        self.stream.name()
    }

    /// The sync mode chosen for this run.
    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// The cursor field chosen for this run, if any.
    pub fn cursor_field(&self) -> Option<&[String]> {
        self.cursor_field.as_deref()
    }
}

impl fmt::Debug for ConfiguredStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredStream")
            .field("stream", &self.stream.name())
            .field("sync_mode", &self.sync_mode)
            .field("cursor_field", &self.cursor_field)
            .finish()
    }
}
