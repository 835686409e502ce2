use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use cdk_config::shared::ErrorPolicy;
use metrics::counter;
use tracing::{info, warn};

use crate::error::{CdkError, ErrorKind, StreamWorkerError};
use crate::metrics::{CDK_PARTITIONS_COMPLETED_TOTAL, CDK_WORKER_ERRORS_TOTAL, STREAM_NAME_LABEL};
use crate::stream::ConfiguredStream;
use crate::types::{
    PartitionCompletedSentinel, PartitionGenerationCompletedSentinel, Record, SourceMessage,
    StreamStatus,
};

/// Read phase of one stream, as tracked by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamPhase {
    /// The stream is waiting for a generation slot.
    PendingGeneration,
    /// A generation worker is discovering the stream's partitions.
    Generating,
    /// Generation produced no partitions.
    Empty,
    /// Partitions are being read.
    Reading,
    /// The stream finished, successfully or not.
    Done,
}

/// Accounting state of one stream.
#[derive(Debug)]
struct StreamState {
    phase: StreamPhase,
    generated_partitions: u64,
    completed_partitions: u64,
    generation_completed: bool,
    record_count: u64,
    failed: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            phase: StreamPhase::PendingGeneration,
            generated_partitions: 0,
            completed_partitions: 0,
            generation_completed: false,
            record_count: 0,
            failed: false,
        }
    }

    /// True once every known partition has been read and no more can appear.
    fn all_partitions_completed(&self) -> bool {
        self.generation_completed && self.completed_partitions == self.generated_partitions
    }
}

/// Result of handling a worker error.
#[derive(Debug)]
pub(crate) struct WorkerErrorOutcome {
    /// Messages to emit for the affected streams.
    pub messages: Vec<SourceMessage>,
    /// True when the error policy demands aborting the sync.
    pub fatal: bool,
    /// True when the error ended a stream's generation, freeing the slot for
    /// the next pending stream.
    pub generation_ended: bool,
}

/// Single-threaded accounting core of the orchestrator.
///
/// Every per-stream counter lives here and is only ever touched by the
/// consumer loop, so no synchronization is needed. Each handler returns the
/// messages the orchestrator must emit for the observed event.
#[derive(Debug)]
pub(crate) struct ReadProcessor {
    pending_streams: VecDeque<Arc<ConfiguredStream>>,
    streams: HashMap<String, StreamState>,
    error_policy: ErrorPolicy,
    errors: Vec<CdkError>,
}

impl ReadProcessor {
    /// Creates the processor for the given streams, all pending generation.
    pub fn new(streams: Vec<Arc<ConfiguredStream>>, error_policy: ErrorPolicy) -> Self {
        let states = streams
            .iter()
            .map(|stream| (stream.name().to_string(), StreamState::new()))
            .collect();

        Self {
            pending_streams: streams.into(),
            streams: states,
            error_policy,
            errors: Vec::new(),
        }
    }

    /// Starts generation for the next pending stream, if any.
    ///
    /// Returns the stream a generation worker must be spawned for, plus the
    /// status message announcing it.
    pub fn start_next_partition_generator(
        &mut self,
    ) -> Option<(Arc<ConfiguredStream>, SourceMessage)> {
        let stream = self.pending_streams.pop_front()?;

        if let Some(state) = self.streams.get_mut(stream.name()) {
            state.phase = StreamPhase::Generating;
        }

        info!(stream = stream.name(), "starting partition generation");

        let message = SourceMessage::stream_status(stream.name(), StreamStatus::Started);
        Some((stream, message))
    }

    /// Records a newly generated partition of the named stream.
    pub fn on_partition(&mut self, stream_name: &str) {
        if let Some(state) = self.streams.get_mut(stream_name) {
            state.generated_partitions += 1;
        } else {
            warn!(stream = stream_name, "partition for an unknown stream");
        }
    }

    /// Handles a generation sentinel; may complete the stream.
    pub fn on_partition_generation_completed(
        &mut self,
        sentinel: &PartitionGenerationCompletedSentinel,
    ) -> Vec<SourceMessage> {
        let mut messages = Vec::new();

        let Some(state) = self.streams.get_mut(sentinel.stream_name()) else {
            warn!(
                stream = sentinel.stream_name(),
                "generation sentinel for an unknown stream",
            );
            return messages;
        };

        state.generation_completed = true;

        if !sentinel.has_generated_partition() {
            // Empty stream shortcut: nothing will ever be read, so the stream
            // is done without waiting on any reader.
            state.phase = StreamPhase::Empty;
            finish_stream(sentinel.stream_name(), state, &mut messages);
        } else {
            state.phase = StreamPhase::Reading;
            if state.all_partitions_completed() {
                finish_stream(sentinel.stream_name(), state, &mut messages);
            }
        }

        messages
    }

    /// Handles a partition completion; may complete the stream.
    pub fn on_partition_completed(
        &mut self,
        sentinel: &PartitionCompletedSentinel,
    ) -> Vec<SourceMessage> {
        let mut messages = Vec::new();

        counter!(
            CDK_PARTITIONS_COMPLETED_TOTAL,
            STREAM_NAME_LABEL => sentinel.stream_name().to_string()
        )
        .increment(1);

        let Some(state) = self.streams.get_mut(sentinel.stream_name()) else {
            warn!(
                stream = sentinel.stream_name(),
                "completion sentinel for an unknown stream",
            );
            return messages;
        };

        state.completed_partitions += 1;
        if state.phase != StreamPhase::Done && state.all_partitions_completed() {
            finish_stream(sentinel.stream_name(), state, &mut messages);
        }

        messages
    }

    /// Translates a record into its emitted message.
    ///
    /// The first record of a stream flips it to running.
    pub fn on_record(&mut self, record: Record) -> Vec<SourceMessage> {
        let mut messages = Vec::new();
        let stream_name = record.stream_name().to_string();

        if let Some(state) = self.streams.get_mut(&stream_name) {
            state.record_count += 1;
            if state.record_count == 1 {
                messages.push(SourceMessage::stream_status(
                    &stream_name,
                    StreamStatus::Running,
                ));
            }
        }

        messages.push(SourceMessage::record(stream_name, record.into_data()));
        messages
    }

    /// Records a worker error according to the error policy.
    pub fn on_worker_error(&mut self, error: StreamWorkerError) -> WorkerErrorOutcome {
        warn!(
            stream = error.stream_name(),
            error = %error.error(),
            "worker error surfaced",
        );
        counter!(
            CDK_WORKER_ERRORS_TOTAL,
            STREAM_NAME_LABEL => error.stream_name().to_string()
        )
        .increment(1);

        match self.error_policy {
            ErrorPolicy::FailFast => {
                let messages = self.fail_unfinished_streams();
                self.errors.push(error.into_error());

                WorkerErrorOutcome {
                    messages,
                    fatal: true,
                    generation_ended: false,
                }
            }
            ErrorPolicy::BestEffort => {
                let mut messages = Vec::new();
                let mut generation_ended = false;

                if let Some(state) = self.streams.get_mut(error.stream_name()) {
                    state.failed = true;

                    // A generation failure arrives in place of the generation
                    // sentinel, so it also ends the stream's generation
                    // accounting; partitions enqueued before the failure are
                    // still drained and read.
                    if error.error().kind() == ErrorKind::PartitionGenerationFailed
                        && !state.generation_completed
                    {
                        state.generation_completed = true;
                        generation_ended = true;

                        if state.all_partitions_completed() {
                            finish_stream(error.stream_name(), state, &mut messages);
                        } else {
                            state.phase = StreamPhase::Reading;
                        }
                    }
                }
                self.errors.push(error.into_error());

                WorkerErrorOutcome {
                    messages,
                    fatal: false,
                    generation_ended,
                }
            }
        }
    }

    /// Marks a stream that cannot be synced as finished before generation.
    pub fn mark_unavailable(&mut self, stream_name: &str) -> Vec<SourceMessage> {
        let mut messages = Vec::new();

        self.pending_streams
            .retain(|stream| stream.name() != stream_name);

        if let Some(state) = self.streams.get_mut(stream_name) {
            state.failed = true;
            finish_stream(stream_name, state, &mut messages);
        }

        messages
    }

    /// Marks every unfinished stream incomplete.
    ///
    /// Used on the fatal teardown paths (fail-fast errors, panics, shutdown)
    /// so consumers still observe a terminal status for each stream.
    pub fn fail_unfinished_streams(&mut self) -> Vec<SourceMessage> {
        let mut messages = Vec::new();

        self.pending_streams.clear();
        for (stream_name, state) in self.streams.iter_mut() {
            if state.phase != StreamPhase::Done {
                state.failed = true;
                finish_stream(stream_name, state, &mut messages);
            }
        }

        messages
    }

    /// True once every stream has reached its terminal phase.
    pub fn is_done(&self) -> bool {
        self.pending_streams.is_empty()
            && self
                .streams
                .values()
                .all(|state| state.phase == StreamPhase::Done)
    }

    /// Errors recorded during the sync.
    pub fn take_errors(&mut self) -> Vec<CdkError> {
        std::mem::take(&mut self.errors)
    }
}

/// Moves a stream to its terminal phase, emitting the closing status.
fn finish_stream(stream_name: &str, state: &mut StreamState, messages: &mut Vec<SourceMessage>) {
    state.phase = StreamPhase::Done;

    let status = if state.failed {
        StreamStatus::Incomplete
    } else {
        StreamStatus::Complete
    };

    info!(
        stream = stream_name,
        records = state.record_count,
        partitions = state.completed_partitions,
        status = ?status,
        "stream finished",
    );

    messages.push(SourceMessage::stream_status(stream_name, status));
}
