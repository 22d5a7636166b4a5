#![deny(missing_docs)]

//! Core library for the jobgate extraction gateway.

/// HTTP routing and REST handlers.
pub mod api;
/// Typed HTTP client for a running gateway.
pub mod client;
/// Environment-driven configuration management.
pub mod config;
/// Text extraction work executed by jobs.
pub mod extraction;
/// Job admission, deduplication, and execution.
pub mod jobs;
/// Structured logging and tracing setup.
pub mod logging;
/// Job counters.
pub mod metrics;
/// Service facade combining the registry, runner, and extractor.
pub mod service;
/// Bounded key-value storage backends.
pub mod store;
