use serde::{Deserialize, Serialize};

use crate::shared::{QueueConfig, ValidationError};

/// How the orchestrator reacts to errors surfaced by worker tasks.
///
/// The chosen policy is applied uniformly to generation and read errors.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort the sync on the first worker error.
    FailFast,
    /// Keep reading unaffected partitions and streams, surfacing every
    /// recorded error once the sync finishes.
    BestEffort,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::FailFast
    }
}

const fn default_error_policy() -> ErrorPolicy {
    ErrorPolicy::FailFast
}

/// Configuration for a concurrent source.
///
/// Contains the settings required to run a concurrent sync: worker limits,
/// queue capacities, and the error policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// The unique identifier for this source.
    ///
    /// Used to label logs and metrics when multiple sources run in the same
    /// process.
    pub id: u64,
    /// Maximum number of partition reader tasks that can run at a time.
    pub max_concurrent_tasks: u16,
    /// Number of partition generators started up front.
    ///
    /// Each completed generation starts the next pending stream's generator,
    /// so this bounds how many streams discover partitions concurrently.
    #[serde(default = "default_initial_partition_generators")]
    pub initial_partition_generators: u16,
    /// Channel capacity configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Strategy applied when a worker task surfaces an error.
    #[serde(default = "default_error_policy")]
    pub error_policy: ErrorPolicy,
}

impl SourceConfig {
    /// Default number of partition generators started up front.
    pub const DEFAULT_INITIAL_PARTITION_GENERATORS: u16 = 1;

    /// Validates source configuration settings.
    ///
    /// Checks queue capacities and ensures worker counts are non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.queue.validate()?;

        if self.max_concurrent_tasks == 0 {
            return Err(ValidationError::MaxConcurrentTasksZero);
        }

        if self.initial_partition_generators == 0 {
            return Err(ValidationError::InitialPartitionGeneratorsZero);
        }

        Ok(())
    }
}

fn default_initial_partition_generators() -> u16 {
    SourceConfig::DEFAULT_INITIAL_PARTITION_GENERATORS
}
