//! # Carousel Pipeline
//!
//! Sequential, multi-stage production of social media carousel posts.
//!
//! Each pending item (a spreadsheet row or a free-text submission) goes
//! through the same ordered stages: content analysis, creative direction,
//! copywriting, prompt engineering, prompt formatting, parallel image
//! generation, result persistence and state cleanup. A loop repeats this one
//! item at a time until its limit is reached or nothing is left.
//!
//! ## Features
//!
//! - **Fixed stage order**: one item in flight, its state dropped before the
//!   next one is selected
//! - **Tolerant parsing**: model output is searched for JSON in code fences
//!   and surrounding prose; unparseable output is kept raw and reported
//! - **Partial success**: a failing stage skips the rest of the item but the
//!   report is still written
//! - **Parallel images**: slides are generated through
//!   [`image_batch_runner::ImageBatchGenerator`] with bounded concurrency,
//!   retries and timeouts
//!
//! ## Quick Start
//!
//! ```no_run
//! use carousel_pipeline::{BatchPostLoop, GeminiTextClient, PipelineConfig,
//!     SequentialPostPipeline, TextSource};
//! use gemini_image_rs::GeminiClient;
//! use image_batch_runner::{GeneratorConfig, ImageBatchGenerator, LocalStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gemini = GeminiClient::new(std::env::var("GEMINI_API_KEY")?);
//!     let images = ImageBatchGenerator::new(
//!         gemini.clone(),
//!         LocalStore::new("output"),
//!         GeneratorConfig::default(),
//!     )?;
//!     let pipeline = SequentialPostPipeline::new(
//!         GeminiTextClient::new(gemini),
//!         images,
//!         PipelineConfig::builder().with_image_count(6).build(),
//!     )?;
//!
//!     let summary = BatchPostLoop::new(pipeline)
//!         .run_source(&TextSource::new("Five habits that changed my mornings"))
//!         .await?;
//!     println!("{} images", summary.images_successful);
//!     Ok(())
//! }
//! ```

pub mod batch_loop;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod formatter;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod source;
pub mod types;

pub use batch_loop::{BatchPostLoop, RunSummary};
pub use client::{build_text_body, GeminiTextClient, LlmConfig, TextGenerator, DEFAULT_TEXT_MODEL};
pub use config::{PipelineConfig, PipelineConfigBuilder, MAX_IMAGE_COUNT};
pub use context::{EphemeralCounters, ItemState, PipelineContext, RunCounters};
pub use error::{PipelineError, Result};
pub use extract::{extract_json, extract_json_block, StageText};
pub use formatter::{format_prompts, hex_to_natural_color, FormatOutcome};
pub use pipeline::{parse_prompts, ItemOutcome, PipelineStep, SequentialPostPipeline, Stage, StopReason};
pub use report::{index_line, post_title, render_report};
pub use source::{ItemSource, SelectionStrategy, SheetFilters, SheetSource, TextSource};
pub use types::{ContentAnalysis, CopyContent, CreativeBrief, InputMode, PendingItem};
