use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use gemini_image_rs::ImageGenerator;
use image_batch_runner::ArtifactStore;
use serde::Serialize;

use crate::client::TextGenerator;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::pipeline::{ItemOutcome, PipelineStep, SequentialPostPipeline, StopReason};
use crate::source::ItemSource;

/// Totals for one loop run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub items_processed: usize,
    pub items_succeeded: usize,
    pub items_failed: usize,
    pub images_successful: usize,
    pub images_failed: usize,
    /// `None` when the loop stopped at its item limit.
    pub stop_reason: Option<StopReason>,
    pub outcomes: Vec<ItemOutcome>,
    pub duration_ms: u64,
}

impl RunSummary {
    fn from_run(
        outcomes: Vec<ItemOutcome>,
        stop_reason: Option<StopReason>,
        started: Instant,
    ) -> Self {
        Self {
            items_processed: outcomes.len(),
            items_succeeded: outcomes.iter().filter(|o| o.is_success()).count(),
            items_failed: outcomes.iter().filter(|o| !o.is_success()).count(),
            images_successful: outcomes.iter().map(ItemOutcome::images_successful).sum(),
            images_failed: outcomes.iter().map(ItemOutcome::images_failed).sum(),
            stop_reason,
            outcomes,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Some processed item ended without a single image.
    pub fn has_item_without_images(&self) -> bool {
        self.outcomes.iter().any(ItemOutcome::produced_no_images)
    }

    pub fn is_empty(&self) -> bool {
        self.items_processed == 0
    }
}

/// Runs the pipeline item after item until the item limit is hit, the
/// pending list is exhausted, or the cancellation flag is raised.
///
/// Each iteration processes exactly one item and leaves no item-scoped state
/// behind.
pub struct BatchPostLoop<T, G, S> {
    pipeline: SequentialPostPipeline<T, G, S>,
    cancellation: Option<Arc<AtomicBool>>,
}

impl<T, G, S> BatchPostLoop<T, G, S>
where
    T: TextGenerator,
    G: ImageGenerator,
    S: ArtifactStore,
{
    pub fn new(pipeline: SequentialPostPipeline<T, G, S>) -> Self {
        Self {
            pipeline,
            cancellation: None,
        }
    }

    /// Stop before the next item once `flag` is set. The current item always
    /// finishes.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn pipeline(&self) -> &SequentialPostPipeline<T, G, S> {
        &self.pipeline
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Process items from `ctx` until a stop condition.
    pub async fn run(&self, ctx: &mut PipelineContext) -> RunSummary {
        let started = Instant::now();
        let limit = self.pipeline.config().max_items_per_run;
        let mut outcomes = Vec::new();
        let mut stop_reason = None;

        tracing::info!(
            pending = ctx.remaining(),
            limit = ?limit,
            "Starting batch loop"
        );

        loop {
            if limit.is_some_and(|max| outcomes.len() >= max) {
                tracing::info!(processed = outcomes.len(), "Reached item limit");
                break;
            }
            if self.is_cancelled() {
                tracing::warn!(processed = outcomes.len(), "Batch loop cancelled");
                stop_reason = Some(StopReason::Cancelled);
                break;
            }

            match self.pipeline.run_once(ctx).await {
                PipelineStep::Continue(outcome) => {
                    tracing::info!(
                        iteration = outcomes.len() + 1,
                        item_id = %outcome.item_id,
                        images = outcome.images_successful(),
                        "Item processed"
                    );
                    outcomes.push(outcome);
                }
                PipelineStep::Stop(reason) => {
                    stop_reason = Some(reason);
                    break;
                }
            }
        }

        let summary = RunSummary::from_run(outcomes, stop_reason, started);
        tracing::info!(
            items = summary.items_processed,
            succeeded = summary.items_succeeded,
            failed = summary.items_failed,
            images = summary.images_successful,
            images_failed = summary.images_failed,
            duration_ms = summary.duration_ms,
            "Batch loop finished"
        );
        summary
    }

    /// Load items from `source`, order them by the configured selection
    /// strategy and run the loop over a fresh context.
    ///
    /// An empty source is not an error; the summary just reports no items.
    pub async fn run_source<Src: ItemSource>(&self, source: &Src) -> Result<RunSummary> {
        let items = source.load().await?;
        let selection = self.pipeline.config().selection;
        let items = selection.apply(items);
        tracing::info!(items = items.len(), selection = %selection, "Loaded pending items");

        let mut ctx = PipelineContext::new(items);
        Ok(self.run(&mut ctx).await)
    }
}
