use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Maximum concurrent reader tasks cannot be zero.
    #[error("`max_concurrent_tasks` cannot be zero")]
    MaxConcurrentTasksZero,
    /// The number of partition generators started up front cannot be zero.
    #[error("`initial_partition_generators` cannot be zero")]
    InitialPartitionGeneratorsZero,
    /// A field holds a value outside its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: String,
        constraint: String,
    },
}
