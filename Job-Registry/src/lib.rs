//! # Job Registry
//!
//! SQLite-backed record of carousel generation runs.
//!
//! ## Features
//!
//! - Capacity check and insert in one IMMEDIATE transaction, so separate
//!   processes sharing a database file respect the same cap
//! - Completion and failure bookkeeping with truncated error messages
//! - Listing of running and recent jobs
//! - Stale-job cleanup after a crash and pruning of old records
//!
//! ## Quick Start
//!
//! 1. Build a [`RegistryConfig`] (database path, concurrent-run cap)
//! 2. Open a [`JobRegistry`]
//! 3. Call [`JobRegistry::create_job()`] before a run and
//!    [`complete_job()`](JobRegistry::complete_job) or
//!    [`fail_job()`](JobRegistry::fail_job) after it

pub mod config;
pub mod db;
pub mod error;
pub mod registry;
pub mod types;

pub use config::{RegistryConfig, RegistryConfigBuilder};
pub use error::{JobError, Result};
pub use registry::{JobRegistry, DEFAULT_PRUNE_DAYS, DEFAULT_RECENT_LIMIT};
pub use types::{JobRecord, JobStatus};
