//! End-to-end tests of the concurrent source against scripted streams.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;

use cdk::prelude::*;
use cdk::test_utils::stream::{InMemoryStream, PartitionSpec};

fn init() {
    cdk_telemetry::init_tracing();
    let _ = cdk_telemetry::init_metrics();
}

fn config(max_concurrent_tasks: u16, error_policy: ErrorPolicy) -> SourceConfig {
    SourceConfig {
        id: 1,
        max_concurrent_tasks,
        initial_partition_generators: 1,
        queue: QueueConfig::default(),
        error_policy,
    }
}

fn configured(stream: InMemoryStream) -> ConfiguredStream {
    ConfiguredStream::new(Arc::new(stream), SyncMode::FullRefresh)
}

async fn read_messages(
    config: SourceConfig,
    streams: Vec<ConfiguredStream>,
) -> Vec<CdkResult<SourceMessage>> {
    let source = ConcurrentSource::new(config).unwrap();

    timeout(Duration::from_secs(10), source.read(streams).collect())
        .await
        .expect("sync did not terminate")
}

fn record_count(messages: &[CdkResult<SourceMessage>], stream: &str) -> usize {
    messages
        .iter()
        .filter_map(|message| message.as_ref().ok())
        .filter_map(|message| message.as_record())
        .filter(|record| record.stream == stream)
        .count()
}

fn statuses_for(messages: &[CdkResult<SourceMessage>], stream: &str) -> Vec<StreamStatus> {
    messages
        .iter()
        .filter_map(|message| message.as_ref().ok())
        .filter_map(|message| message.as_stream_status())
        .filter(|status| status.stream == stream)
        .map(|status| status.status)
        .collect()
}

fn final_error(messages: &[CdkResult<SourceMessage>]) -> Option<&CdkError> {
    messages.last().and_then(|message| message.as_ref().err())
}

#[tokio::test]
async fn all_partitions_of_a_stream_are_read_exactly_once() {
    init();

    let stream = InMemoryStream::new("orders")
        .with_partition(PartitionSpec::with_records(2))
        .with_partition(PartitionSpec::with_records(2))
        .with_partition(PartitionSpec::with_records(2));

    let messages = read_messages(
        config(4, ErrorPolicy::FailFast),
        vec![configured(stream)],
    )
    .await;

    assert!(final_error(&messages).is_none());
    assert_eq!(record_count(&messages, "orders"), 6);
    assert_eq!(
        statuses_for(&messages, "orders"),
        vec![
            StreamStatus::Started,
            StreamStatus::Running,
            StreamStatus::Complete
        ]
    );
}

#[tokio::test]
async fn empty_streams_complete_without_waiting_on_readers() {
    init();

    let messages = read_messages(
        config(4, ErrorPolicy::FailFast),
        vec![configured(InMemoryStream::new("empty_stream"))],
    )
    .await;

    assert!(final_error(&messages).is_none());
    assert_eq!(record_count(&messages, "empty_stream"), 0);
    assert_eq!(
        statuses_for(&messages, "empty_stream"),
        vec![StreamStatus::Started, StreamStatus::Complete]
    );
}

#[tokio::test]
async fn a_failing_partition_does_not_block_other_partitions_of_the_stream() {
    init();

    let stream = InMemoryStream::new("orders")
        .with_partition(PartitionSpec::with_records(2))
        .with_partition(PartitionSpec::failing())
        .with_partition(PartitionSpec::with_records(2));

    let messages = read_messages(
        config(1, ErrorPolicy::BestEffort),
        vec![configured(stream)],
    )
    .await;

    // Records of the healthy partitions are all delivered.
    assert_eq!(record_count(&messages, "orders"), 4);

    // The stream finishes, but incomplete, and the failure is surfaced.
    assert_eq!(
        statuses_for(&messages, "orders").last(),
        Some(&StreamStatus::Incomplete)
    );
    let error = final_error(&messages).expect("the read failure must be surfaced");
    assert_eq!(error.kind(), ErrorKind::PartitionReadFailed);
}

#[tokio::test]
async fn a_failing_stream_does_not_block_other_streams() {
    init();

    let failing = InMemoryStream::new("orders")
        .with_partition(PartitionSpec::with_records(1))
        .with_partition(PartitionSpec::failing());
    let healthy = InMemoryStream::new("customers")
        .with_partition(PartitionSpec::with_records(3))
        .with_partition(PartitionSpec::with_records(3));

    let messages = read_messages(
        config(2, ErrorPolicy::BestEffort),
        vec![configured(failing), configured(healthy)],
    )
    .await;

    assert_eq!(record_count(&messages, "customers"), 6);
    assert_eq!(
        statuses_for(&messages, "customers").last(),
        Some(&StreamStatus::Complete)
    );

    assert_eq!(
        statuses_for(&messages, "orders").last(),
        Some(&StreamStatus::Incomplete)
    );
    assert!(final_error(&messages).is_some());
}

#[tokio::test]
async fn fail_fast_aborts_the_sync_on_the_first_error() {
    init();

    let stream = InMemoryStream::new("orders")
        .with_partition(PartitionSpec::failing())
        .with_partition(PartitionSpec::with_records(2));

    let messages = read_messages(
        config(1, ErrorPolicy::FailFast),
        vec![configured(stream)],
    )
    .await;

    let error = final_error(&messages).expect("the sync must abort with an error");
    assert_eq!(error.kind(), ErrorKind::PartitionReadFailed);
    assert_eq!(
        statuses_for(&messages, "orders").last(),
        Some(&StreamStatus::Incomplete)
    );
}

#[tokio::test]
async fn generation_failures_only_affect_their_stream() {
    init();

    let failing = InMemoryStream::new("orders").with_generation_failure("listing failed");
    let healthy = InMemoryStream::new("customers").with_partition(PartitionSpec::with_records(2));

    let messages = read_messages(
        config(2, ErrorPolicy::BestEffort),
        vec![configured(failing), configured(healthy)],
    )
    .await;

    assert_eq!(record_count(&messages, "customers"), 2);
    assert_eq!(
        statuses_for(&messages, "customers").last(),
        Some(&StreamStatus::Complete)
    );

    assert_eq!(
        statuses_for(&messages, "orders").last(),
        Some(&StreamStatus::Incomplete)
    );
    let error = final_error(&messages).expect("the generation failure must be surfaced");
    assert_eq!(error.kind(), ErrorKind::PartitionGenerationFailed);
}

#[tokio::test]
async fn concurrent_reads_never_exceed_the_configured_ceiling() {
    init();

    let stream = Arc::new(
        InMemoryStream::new("orders")
            .with_partition(PartitionSpec::with_records(2))
            .with_partition(PartitionSpec::with_records(2))
            .with_partition(PartitionSpec::with_records(2))
            .with_partition(PartitionSpec::with_records(2))
            .with_partition(PartitionSpec::with_records(2))
            .with_read_delay(Duration::from_millis(10)),
    );

    let source = ConcurrentSource::new(config(2, ErrorPolicy::FailFast)).unwrap();
    let messages: Vec<_> = timeout(
        Duration::from_secs(10),
        source
            .read(vec![ConfiguredStream::new(
                stream.clone(),
                SyncMode::FullRefresh,
            )])
            .collect(),
    )
    .await
    .expect("sync did not terminate");

    assert!(final_error(&messages).is_none());
    assert_eq!(record_count(&messages, "orders"), 10);
    assert!(
        stream.max_concurrent_reads() <= 2,
        "observed {} concurrent reads",
        stream.max_concurrent_reads()
    );
}

#[tokio::test]
async fn streams_are_read_independently_and_all_terminate() {
    init();

    let orders = InMemoryStream::new("orders")
        .with_partition(PartitionSpec::with_records(3))
        .with_partition(PartitionSpec::with_records(3));
    let customers = InMemoryStream::new("customers")
        .with_partition(PartitionSpec::with_records(1))
        .with_partition(PartitionSpec::with_records(1))
        .with_partition(PartitionSpec::with_records(1));
    let empty = InMemoryStream::new("empty_stream");

    let messages = read_messages(
        config(3, ErrorPolicy::FailFast),
        vec![configured(orders), configured(customers), configured(empty)],
    )
    .await;

    assert!(final_error(&messages).is_none());
    assert_eq!(record_count(&messages, "orders"), 6);
    assert_eq!(record_count(&messages, "customers"), 3);
    assert_eq!(record_count(&messages, "empty_stream"), 0);

    for stream in ["orders", "customers", "empty_stream"] {
        assert_eq!(
            statuses_for(&messages, stream).last(),
            Some(&StreamStatus::Complete),
            "stream {stream} did not complete"
        );
    }
}

#[tokio::test]
async fn unavailable_streams_are_skipped_without_failing_the_sync() {
    init();

    let unavailable = InMemoryStream::new("orders").unavailable("credentials expired");
    let healthy = InMemoryStream::new("customers").with_partition(PartitionSpec::with_records(2));

    let messages = read_messages(
        config(2, ErrorPolicy::FailFast),
        vec![configured(unavailable), configured(healthy)],
    )
    .await;

    assert!(final_error(&messages).is_none());
    assert_eq!(record_count(&messages, "orders"), 0);
    assert_eq!(
        statuses_for(&messages, "orders"),
        vec![StreamStatus::Incomplete]
    );
    assert_eq!(
        statuses_for(&messages, "customers").last(),
        Some(&StreamStatus::Complete)
    );
}

#[tokio::test]
async fn shutdown_stops_the_sync_and_marks_streams_incomplete() {
    init();

    let mut stream = InMemoryStream::new("orders").with_read_delay(Duration::from_millis(10));
    for _ in 0..50 {
        stream = stream.with_partition(PartitionSpec::with_records(10));
    }

    let source = ConcurrentSource::new(config(2, ErrorPolicy::BestEffort)).unwrap();
    let shutdown_tx = source.shutdown_tx();
    let mut messages = source.read(vec![configured(stream)]);

    // Wait until the sync demonstrably makes progress, then stop it.
    let mut collected = Vec::new();
    while let Some(item) = timeout(Duration::from_secs(10), messages.next())
        .await
        .expect("sync stalled")
    {
        let is_record = item.as_ref().is_ok_and(|message| message.as_record().is_some());
        collected.push(item);
        if is_record {
            break;
        }
    }
    shutdown_tx.shutdown().unwrap();

    let rest: Vec<_> = timeout(Duration::from_secs(10), messages.collect())
        .await
        .expect("sync did not stop after shutdown");
    collected.extend(rest);

    assert_eq!(
        statuses_for(&collected, "orders").last(),
        Some(&StreamStatus::Incomplete)
    );
}

#[tokio::test]
async fn duplicate_stream_names_are_rejected() {
    init();

    let source = ConcurrentSource::new(config(2, ErrorPolicy::FailFast)).unwrap();
    let messages: Vec<_> = source
        .read(vec![
            configured(InMemoryStream::new("orders")),
            configured(InMemoryStream::new("orders")),
        ])
        .collect()
        .await;

    assert_eq!(messages.len(), 1);
    let error = final_error(&messages).expect("duplicate names must be rejected");
    assert_eq!(error.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn invalid_configuration_is_rejected_at_construction() {
    init();

    let invalid = config(0, ErrorPolicy::FailFast);

    let error = ConcurrentSource::new(invalid).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConfigError);
}
