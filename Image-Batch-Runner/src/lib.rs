//! # Image Batch Runner
//!
//! Bounded-concurrency batch generation of carousel images.
//!
//! ## Key Features
//!
//! - **Bounded fan-out**: at most K generation calls in flight, enforced by
//!   a counting semaphore
//! - **Retry with exponential backoff**: `base * 2^(attempt-1)` between
//!   strictly sequential attempts, caller-controlled classification
//! - **Per-item and per-batch timeouts**: a stuck slide never blocks the
//!   rest, and the batch as a whole has a computed ceiling
//! - **Partial success**: every prompt gets exactly one result entry;
//!   finished images are saved as they arrive and survive later failures
//!
//! ## Quick Start
//!
//! 1. Implement [`gemini_image_rs::ImageGenerator`] (or use `GeminiClient`)
//! 2. Pick an [`ArtifactStore`] ([`LocalStore`] writes to disk)
//! 3. Build an [`ImageBatchGenerator`] and call
//!    [`generate_batch`](ImageBatchGenerator::generate_batch)

pub mod error;
pub mod generator;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use error::{BatchError, Result};
pub use generator::{build_request_text, GeneratorConfig, GeneratorConfigBuilder, ImageBatchGenerator};
pub use retry::{RetryPolicy, Retryable};
pub use scheduler::{BoundedScheduler, SchedulerConfig, TaskFailure};
pub use storage::{image_file_name, sanitize_component, ArtifactStore, LocalStore};
pub use types::{
    BatchResult, BatchStatus, GenerationPrompt, GenerationTaskResult, ReferenceAssetSet,
    TaskStatus, MAX_REFERENCES_PER_KIND,
};
