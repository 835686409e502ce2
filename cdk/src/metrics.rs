//! Metrics definitions for concurrent source monitoring.

/// Label for source ID in metrics.
pub const SOURCE_ID_LABEL: &str = "source_id";

/// Label for stream name in metrics.
pub const STREAM_NAME_LABEL: &str = "stream_name";

// Sync metrics

/// Counter for total records read across all partitions.
pub const CDK_RECORDS_READ_TOTAL: &str = "cdk_records_read_total";

/// Counter for total partitions discovered by generators.
pub const CDK_PARTITIONS_GENERATED_TOTAL: &str = "cdk_partitions_generated_total";

/// Counter for total partitions whose read finished.
pub const CDK_PARTITIONS_COMPLETED_TOTAL: &str = "cdk_partitions_completed_total";

/// Counter for total errors surfaced by worker tasks.
pub const CDK_WORKER_ERRORS_TOTAL: &str = "cdk_worker_errors_total";
