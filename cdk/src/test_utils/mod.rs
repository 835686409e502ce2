//! Utilities for testing concurrent sources.
//!
//! Provides a scripted in-memory stream with per-partition record sets,
//! failure injection, and read-concurrency instrumentation so tests can
//! exercise the orchestrator without any remote source.

pub mod stream;
