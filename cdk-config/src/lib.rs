//! Configuration loading and shared configuration types for the connector kit.
//!
//! Configuration is loaded hierarchically: a base file, an environment-specific
//! file, and `APP`-prefixed environment variable overrides, in that order.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{LoadConfigError, load_config};
