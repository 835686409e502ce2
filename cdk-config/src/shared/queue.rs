use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Capacities of the channels a concurrent source communicates over.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    /// Maximum number of pending partitions on the work queue.
    #[serde(default = "default_work_capacity")]
    pub work_capacity: usize,
    /// Maximum number of pending records and sentinels on the output queue.
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,
    /// Maximum number of emitted messages buffered toward the caller.
    #[serde(default = "default_message_capacity")]
    pub message_capacity: usize,
}

impl QueueConfig {
    /// Default capacity shared by all three channels.
    pub const DEFAULT_CAPACITY: usize = 10_000;

    /// Validates queue configuration settings.
    ///
    /// Ensures every capacity is non-zero, since zero-capacity channels cannot
    /// be constructed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, capacity) in [
            ("queue.work_capacity", self.work_capacity),
            ("queue.output_capacity", self.output_capacity),
            ("queue.message_capacity", self.message_capacity),
        ] {
            if capacity == 0 {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            work_capacity: default_work_capacity(),
            output_capacity: default_output_capacity(),
            message_capacity: default_message_capacity(),
        }
    }
}

fn default_work_capacity() -> usize {
    QueueConfig::DEFAULT_CAPACITY
}

fn default_output_capacity() -> usize {
    QueueConfig::DEFAULT_CAPACITY
}

fn default_message_capacity() -> usize {
    QueueConfig::DEFAULT_CAPACITY
}
