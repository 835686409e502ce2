use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::RecordData;

/// Lifecycle states a stream reports while being synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Partition generation for the stream has started.
    Started,
    /// The first record of the stream has been emitted.
    Running,
    /// Every known partition of the stream has been read.
    Complete,
    /// The stream finished with an error, was skipped, or the sync aborted.
    Incomplete,
}

/// A single data row emitted to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordMessage {
    /// Name of the stream the row belongs to.
    pub stream: String,
    /// The raw row payload.
    pub data: RecordData,
    /// When the row was emitted by the orchestrator.
    pub emitted_at: DateTime<Utc>,
}

/// A stream lifecycle notification emitted to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatusMessage {
    /// Name of the stream the notification refers to.
    pub stream: String,
    /// The lifecycle state the stream entered.
    pub status: StreamStatus,
    /// When the transition was observed.
    pub emitted_at: DateTime<Utc>,
}

/// Message emitted by a concurrent source toward the enclosing sync.
///
/// Records are emitted as soon as the consumer loop observes them; status
/// messages bracket each stream's lifecycle. State messages are owned by the
/// surrounding connector-state layer, not by this core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceMessage {
    Record(RecordMessage),
    StreamStatus(StreamStatusMessage),
}

impl SourceMessage {
    /// Creates a record message stamped with the current time.
    pub fn record(stream: impl Into<String>, data: RecordData) -> Self {
        Self::Record(RecordMessage {
            stream: stream.into(),
            data,
            emitted_at: Utc::now(),
        })
    }

    /// Creates a stream status message stamped with the current time.
    pub fn stream_status(stream: impl Into<String>, status: StreamStatus) -> Self {
        Self::StreamStatus(StreamStatusMessage {
            stream: stream.into(),
            status,
            emitted_at: Utc::now(),
        })
    }

    /// Name of the stream this message refers to.
    pub fn stream_name(&self) -> &str {
        match self {
            SourceMessage::Record(record) => &record.stream,
            SourceMessage::StreamStatus(status) => &status.stream,
        }
    }

    /// Returns the record payload if this is a record message.
    pub fn as_record(&self) -> Option<&RecordMessage> {
        match self {
            SourceMessage::Record(record) => Some(record),
            SourceMessage::StreamStatus(_) => None,
        }
    }

    /// Returns the status if this is a stream status message.
    pub fn as_stream_status(&self) -> Option<&StreamStatusMessage> {
        match self {
            SourceMessage::Record(_) => None,
            SourceMessage::StreamStatus(status) => Some(status),
        }
    }
}
