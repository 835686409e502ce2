//! Concurrency primitives coordinating the concurrent source.
//!
//! The [`queue`] module defines the two channels all cross-task communication
//! flows through, [`throttle`] bounds how many reader tasks run at once, and
//! [`shutdown`] implements the broadcast channel used to stop a sync from the
//! outside. No other state is shared between worker tasks.

pub mod queue;
pub mod shutdown;
pub mod throttle;
