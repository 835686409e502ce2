//! Shared configuration types for concurrent sources.

mod base;
mod queue;
mod source;

pub use base::ValidationError;
pub use queue::QueueConfig;
pub use source::{ErrorPolicy, SourceConfig};
