//! The top-level driver of a concurrent sync.
//!
//! [`ConcurrentSource`] owns the queues, the worker pools, and the throttler,
//! and runs the single consumer loop that merges records, sentinels, and
//! worker errors into the emitted message stream. All per-stream accounting
//! lives in the loop; worker tasks share nothing but the two queues.

mod processor;

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use cdk_config::shared::SourceConfig;
use futures::Stream;
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::cdk_error;
use crate::concurrency::queue::{
    OutputQueueRx, OutputQueueTx, QueueItem, WorkItem, WorkQueueRx, WorkQueueTx,
    create_output_queue, create_work_queue,
};
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::concurrency::throttle::Throttler;
use crate::error::{CdkError, CdkResult, ErrorKind};
use crate::source::processor::ReadProcessor;
use crate::stream::{ConfiguredStream, StreamAvailability};
use crate::types::{Partition, SourceMessage};
use crate::workers::enqueuer::PartitionEnqueuer;
use crate::workers::pool::WorkerPool;
use crate::workers::reader::PartitionReader;

/// Orchestrator for reading many streams concurrently.
///
/// Construction validates the configuration; [`ConcurrentSource::read`] then
/// starts the sync and hands back a [`MessageStream`] the caller drains.
#[derive(Debug)]
pub struct ConcurrentSource {
    config: Arc<SourceConfig>,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl ConcurrentSource {
    /// Creates a concurrent source with the given configuration.
    pub fn new(config: SourceConfig) -> CdkResult<Self> {
        if let Err(err) = config.validate() {
            return Err(cdk_error!(
                ErrorKind::ConfigError,
                "Invalid source configuration",
                source: err
            ));
        }

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Ok(Self {
            config: Arc::new(config),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Returns a handle that can stop the sync from the outside.
    ///
    /// Grab the handle before calling [`ConcurrentSource::read`], which
    /// consumes the source.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Starts reading the configured streams concurrently.
    ///
    /// Returns the stream of emitted messages. A fatal error ends the stream
    /// with a final `Err` item; dropping the stream stops the sync.
    pub fn read(self, streams: Vec<ConfiguredStream>) -> MessageStream {
        let (messages_tx, messages_rx) = mpsc::channel(self.config.queue.message_capacity);
        let streams: Vec<Arc<ConfiguredStream>> = streams.into_iter().map(Arc::new).collect();

        // Accounting is keyed by stream name, so duplicates cannot be synced.
        let mut seen = HashSet::new();
        for stream in &streams {
            if !seen.insert(stream.name().to_string()) {
                let err = cdk_error!(
                    ErrorKind::InvalidState,
                    "Duplicate stream name in sync",
                    detail = stream.name().to_string()
                );
                let _ = messages_tx.try_send(Err(err));

                return MessageStream { messages_rx };
            }
        }

        let span = info_span!("concurrent_source", source_id = self.config.id);
        let coordinator =
            ReadCoordinator::new(self.config, streams, self.shutdown_rx, messages_tx);
        tokio::spawn(coordinator.run().instrument(span));

        MessageStream { messages_rx }
    }
}

/// Stream of messages produced by [`ConcurrentSource::read`].
///
/// Ends once every stream has finished or the sync aborted. No ordering across
/// partitions or streams is guaranteed; records of a single partition arrive
/// in read order.
#[derive(Debug)]
pub struct MessageStream {
    messages_rx: mpsc::Receiver<CdkResult<SourceMessage>>,
}

impl Stream for MessageStream {
    type Item = CdkResult<SourceMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().messages_rx.poll_recv(cx)
    }
}

/// Event multiplexed by the consumer loop.
enum LoopEvent {
    Shutdown,
    Work(Option<WorkItem>),
    Output(Option<QueueItem>),
    Permit(CdkResult<OwnedSemaphorePermit>),
    ReaderJoined(Option<CdkResult<()>>),
    GeneratorJoined(Option<CdkResult<()>>),
}

/// The spawned task driving one sync to completion.
struct ReadCoordinator {
    config: Arc<SourceConfig>,
    streams: Vec<Arc<ConfiguredStream>>,
    processor: ReadProcessor,
    work_queue_tx: WorkQueueTx,
    work_queue_rx: WorkQueueRx,
    output_queue_tx: OutputQueueTx,
    output_queue_rx: OutputQueueRx,
    throttler: Throttler,
    readers: WorkerPool,
    generators: WorkerPool,
    /// Partition waiting for a free reader slot.
    pending_partition: Option<(Arc<Partition>, Arc<ConfiguredStream>)>,
    messages_tx: mpsc::Sender<CdkResult<SourceMessage>>,
    shutdown_rx: ShutdownRx,
}

impl ReadCoordinator {
    fn new(
        config: Arc<SourceConfig>,
        streams: Vec<Arc<ConfiguredStream>>,
        shutdown_rx: ShutdownRx,
        messages_tx: mpsc::Sender<CdkResult<SourceMessage>>,
    ) -> Self {
        let (work_queue_tx, work_queue_rx) = create_work_queue(config.queue.work_capacity);
        let (output_queue_tx, output_queue_rx) = create_output_queue(config.queue.output_capacity);
        let throttler = Throttler::new(config.max_concurrent_tasks as usize);
        let processor = ReadProcessor::new(streams.clone(), config.error_policy);

        Self {
            config,
            streams,
            processor,
            work_queue_tx,
            work_queue_rx,
            output_queue_tx,
            output_queue_rx,
            throttler,
            readers: WorkerPool::new(
                ErrorKind::PartitionReaderPanic,
                "Partition reader task panicked",
            ),
            generators: WorkerPool::new(
                ErrorKind::PartitionGeneratorPanic,
                "Partition generator task panicked",
            ),
            pending_partition: None,
            messages_tx,
            shutdown_rx,
        }
    }

    async fn run(mut self) {
        if let Err(err) = self.sync().await {
            if err.kind() == ErrorKind::QueueClosed {
                // The consumer dropped the message stream, there is nobody
                // left to deliver to.
                debug!("message consumer went away, sync stopped");
            } else {
                error!(error = %err, "concurrent sync failed");
                let _ = self.messages_tx.send(Err(err)).await;
            }
        }
    }

    async fn sync(&mut self) -> CdkResult<()> {
        info!(streams = self.streams.len(), "starting concurrent sync");

        self.check_stream_availability().await?;

        let initial_generators = self.config.initial_partition_generators as usize;
        for _ in 0..initial_generators {
            if !self.start_next_generator().await? {
                break;
            }
        }

        while !self.processor.is_done() {
            match self.next_event().await {
                LoopEvent::Shutdown => {
                    info!("shutdown signal received, stopping sync");
                    return self.abort_sync().await;
                }
                LoopEvent::Permit(permit) => {
                    let permit = permit?;
                    if let Some((partition, stream)) = self.pending_partition.take() {
                        self.submit_reader(partition, stream, permit);
                    }
                }
                LoopEvent::Work(Some(item)) => self.on_work_item(item).await?,
                LoopEvent::Work(None) => {
                    // Unreachable while the coordinator holds a transmitter.
                    debug!("work queue closed");
                }
                LoopEvent::Output(Some(item)) => {
                    if self.on_queue_item(item).await? {
                        self.readers.abort_all();
                        self.generators.abort_all();

                        return Err(self.processor.take_errors().into());
                    }
                }
                LoopEvent::Output(None) => {
                    debug!("output queue closed");
                }
                LoopEvent::ReaderJoined(Some(result))
                | LoopEvent::GeneratorJoined(Some(result)) => {
                    if let Err(err) = result {
                        // A panicked worker cannot be attributed to a stream or
                        // produce its completion sentinel, so the sync cannot
                        // keep its accounting and must abort.
                        return self.abort_sync_with(err).await;
                    }
                }
                LoopEvent::ReaderJoined(None) | LoopEvent::GeneratorJoined(None) => {}
            }
        }

        // Every stream is done, so any task still running belongs to a stream
        // that already finished (e.g. a partition drained after its stream
        // failed). Stop those instead of risking a send into a queue nobody
        // drains anymore, then collect late panics.
        self.readers.abort_all();
        self.generators.abort_all();
        self.readers.wait_all().await?;
        self.generators.wait_all().await?;

        let errors = self.processor.take_errors();
        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("concurrent sync finished");
        Ok(())
    }

    /// Multiplexes every signal the consumer loop reacts to.
    ///
    /// Submission is gated on the throttler without ever blocking the output
    /// drain: while a partition waits for a slot, the work queue is paused but
    /// records and sentinels keep flowing.
    async fn next_event(&mut self) -> LoopEvent {
        tokio::select! {
            _ = self.shutdown_rx.wait_for_shutdown() => LoopEvent::Shutdown,
            permit = self.throttler.wait_and_acquire(), if self.pending_partition.is_some() => {
                LoopEvent::Permit(permit)
            }
            item = self.work_queue_rx.recv(), if self.pending_partition.is_none() => {
                LoopEvent::Work(item)
            }
            item = self.output_queue_rx.recv() => LoopEvent::Output(item),
            result = self.readers.join_next(), if !self.readers.is_empty() => {
                LoopEvent::ReaderJoined(result)
            }
            result = self.generators.join_next(), if !self.generators.is_empty() => {
                LoopEvent::GeneratorJoined(result)
            }
        }
    }

    async fn on_work_item(&mut self, item: WorkItem) -> CdkResult<()> {
        match item {
            WorkItem::Partition { partition, stream } => {
                debug!(
                    stream = stream.name(),
                    slice = ?partition.to_slice(),
                    "partition ready for reading",
                );

                self.processor.on_partition(stream.name());
                // Submission happens once the throttler grants a slot.
                self.pending_partition = Some((partition, stream));
            }
            WorkItem::GenerationCompleted(sentinel) => {
                let messages = self.processor.on_partition_generation_completed(&sentinel);
                self.emit_all(messages).await?;

                // Each finished generation frees the slot for the next stream.
                self.start_next_generator().await?;
            }
        }

        Ok(())
    }

    /// Handles one output queue item.
    ///
    /// Returns true when the error policy demands aborting the sync.
    async fn on_queue_item(&mut self, item: QueueItem) -> CdkResult<bool> {
        match item {
            QueueItem::Record(record) => {
                let messages = self.processor.on_record(record);
                self.emit_all(messages).await?;
            }
            QueueItem::PartitionCompleted(sentinel) => {
                let messages = self.processor.on_partition_completed(&sentinel);
                self.emit_all(messages).await?;
            }
            QueueItem::WorkerError(worker_error) => {
                let outcome = self.processor.on_worker_error(worker_error);
                self.emit_all(outcome.messages).await?;

                if outcome.generation_ended {
                    // A failed generation frees the slot like a sentinel does.
                    self.start_next_generator().await?;
                }

                return Ok(outcome.fatal);
            }
        }

        Ok(false)
    }

    async fn start_next_generator(&mut self) -> CdkResult<bool> {
        let Some((stream, message)) = self.processor.start_next_partition_generator() else {
            return Ok(false);
        };
        self.emit(message).await?;

        let enqueuer = PartitionEnqueuer::new(
            stream.clone(),
            self.work_queue_tx.clone(),
            self.output_queue_tx.clone(),
        );
        let span = info_span!("partition_generator", stream = stream.name());
        self.generators.spawn(enqueuer.run().instrument(span));

        Ok(true)
    }

    fn submit_reader(
        &mut self,
        partition: Arc<Partition>,
        stream: Arc<ConfiguredStream>,
        permit: OwnedSemaphorePermit,
    ) {
        let reader = PartitionReader::new(self.output_queue_tx.clone());
        let span = info_span!("partition_reader", stream = stream.name());

        self.readers.spawn(
            async move {
                // The permit rides with the task so the slot frees exactly
                // when the read finishes.
                let _permit = permit;
                reader.process_partition(partition, stream).await;
            }
            .instrument(span),
        );
    }

    /// Skips streams whose availability probe fails before any work starts.
    async fn check_stream_availability(&mut self) -> CdkResult<()> {
        for stream in self.streams.clone() {
            let availability = match stream.stream().check_availability().await {
                Ok(availability) => availability,
                Err(err) => {
                    warn!(stream = stream.name(), error = %err, "availability check failed");
                    StreamAvailability::unavailable(err.to_string())
                }
            };

            if let StreamAvailability::Unavailable { reason } = availability {
                warn!(
                    stream = stream.name(),
                    reason = %reason,
                    "stream is not available, skipping",
                );

                let messages = self.processor.mark_unavailable(stream.name());
                self.emit_all(messages).await?;
            }
        }

        Ok(())
    }

    /// Stops the sync, marking every unfinished stream incomplete.
    async fn abort_sync(&mut self) -> CdkResult<()> {
        let messages = self.processor.fail_unfinished_streams();
        self.readers.abort_all();
        self.generators.abort_all();
        self.emit_all(messages).await?;

        let errors = self.processor.take_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    async fn abort_sync_with(&mut self, error: CdkError) -> CdkResult<()> {
        match self.abort_sync().await {
            Ok(()) => Err(error),
            Err(recorded) => Err(CdkError::from(vec![error, recorded])),
        }
    }

    async fn emit(&self, message: SourceMessage) -> CdkResult<()> {
        self.messages_tx.send(Ok(message)).await.map_err(|_| {
            cdk_error!(
                ErrorKind::QueueClosed,
                "Message channel closed by the consumer"
            )
        })
    }

    async fn emit_all(&self, messages: Vec<SourceMessage>) -> CdkResult<()> {
        for message in messages {
            self.emit(message).await?;
        }

        Ok(())
    }
}
