use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use gemini_image_rs::{GenerationError, ImageGenerator, ImageRequest};
use thiserror::Error;
use tokio::time::Instant;

use crate::error::{BatchError, Result};
use crate::retry::RetryPolicy;
use crate::scheduler::{BoundedScheduler, SchedulerConfig, TaskFailure};
use crate::storage::ArtifactStore;
use crate::types::{BatchResult, GenerationPrompt, GenerationTaskResult, ReferenceAssetSet};

const STYLE_REFERENCE_DIRECTIVE: &str = "Use the attached style reference image(s) as the visual style guide. Match their art style, color palette, lighting and texture.";
const PERSONA_REFERENCE_DIRECTIVE: &str = "Preserve the facial features, identity and likeness of the person shown in the attached persona reference image(s).";

/// Settings for [`ImageBatchGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub scheduler: SchedulerConfig,
    pub retry: RetryPolicy,
    pub aspect_ratio: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            retry: RetryPolicy::default(),
            aspect_ratio: Some("4:5".to_string()),
        }
    }
}

impl GeneratorConfig {
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(BatchError::InvalidConfig(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.attempt_timeout.is_some_and(|t| t.is_zero()) {
            return Err(BatchError::InvalidConfig(
                "attempt timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`GeneratorConfig`].
#[derive(Default)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    /// Maximum concurrent generation calls (K).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.scheduler.concurrency = concurrency;
        self
    }

    /// Timeout for one slide, covering all of its attempts.
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.config.scheduler.item_timeout = timeout;
        self
    }

    pub fn with_batch_slice(mut self, slice: Duration) -> Self {
        self.config.scheduler.batch_slice = Some(slice);
        self
    }

    pub fn with_batch_buffer(mut self, buffer: Duration) -> Self {
        self.config.scheduler.batch_buffer = buffer;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    /// Bound each single attempt; an overrun is retried.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.retry.attempt_timeout = Some(timeout);
        self
    }

    /// `None` leaves the aspect ratio to the model.
    pub fn with_aspect_ratio(mut self, ratio: Option<String>) -> Self {
        self.config.aspect_ratio = ratio;
        self
    }

    pub fn build(self) -> GeneratorConfig {
        self.config
    }
}

/// Final request text for one slide.
///
/// A style reference replaces the style suffix so the two cannot pull in
/// different directions. A persona reference adds an identity directive and
/// leaves the suffix alone.
pub fn build_request_text(
    prompt_text: &str,
    references: Option<&ReferenceAssetSet>,
    style_suffix: Option<&str>,
) -> String {
    let has_style = references.is_some_and(|r| r.has_style());
    let has_persona = references.is_some_and(|r| r.has_persona());

    let mut text = String::new();
    if has_style {
        text.push_str(STYLE_REFERENCE_DIRECTIVE);
        text.push(' ');
    }
    if has_persona {
        text.push_str(PERSONA_REFERENCE_DIRECTIVE);
        text.push(' ');
    }
    text.push_str(prompt_text.trim());

    if !has_style {
        if let Some(suffix) = style_suffix.map(str::trim).filter(|s| !s.is_empty()) {
            text.push_str(", ");
            text.push_str(suffix);
        }
    }
    text
}

#[derive(Debug, Error)]
enum SlideError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("Failed to save image: {0}")]
    Persist(std::io::Error),
}

struct SavedImage {
    path: PathBuf,
    byte_size: u64,
}

/// Per-slide bookkeeping that outlives the task future, so slides dropped
/// by a timeout still report their attempts and running time.
#[derive(Default)]
struct TaskProbe {
    attempts: AtomicU32,
    started: OnceLock<Instant>,
    finished_ms: OnceLock<u64>,
}

impl TaskProbe {
    fn start(&self) {
        let _ = self.started.set(Instant::now());
    }

    fn finish(&self) {
        if let Some(started) = self.started.get() {
            let _ = self.finished_ms.set(started.elapsed().as_millis() as u64);
        }
    }

    /// Time from the slide getting a slot until it finished, or until now
    /// if it never did.
    fn duration_ms(&self) -> u64 {
        match (self.finished_ms.get(), self.started.get()) {
            (Some(ms), _) => *ms,
            (None, Some(started)) => started.elapsed().as_millis() as u64,
            (None, None) => 0,
        }
    }
}

/// Generates one item's carousel: fans prompts out through the scheduler
/// with retry, saves each image as soon as it arrives, and summarizes.
///
/// # Example
/// ```no_run
/// use image_batch_runner::*;
/// use gemini_image_rs::GeminiClient;
///
/// # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
/// let generator = ImageBatchGenerator::new(
///     GeminiClient::new("api-key"),
///     LocalStore::new("output/posts"),
///     GeneratorConfig::builder().with_concurrency(3).build(),
/// )?;
///
/// let prompts = vec![
///     GenerationPrompt::new(1, "DREAM", "Create a moonlit field"),
///     GenerationPrompt::new(2, "BIG", "Create a mountain summit"),
/// ];
/// let result = generator.generate_batch("post_1", &prompts, None, Some("film grain")).await?;
/// println!("{}/{} images", result.successful, result.total);
/// # Ok(())
/// # }
/// ```
pub struct ImageBatchGenerator<G, S> {
    generator: Arc<G>,
    store: Arc<S>,
    scheduler: BoundedScheduler,
    config: GeneratorConfig,
}

impl<G, S> ImageBatchGenerator<G, S>
where
    G: ImageGenerator,
    S: ArtifactStore,
{
    pub fn new(generator: G, store: S, config: GeneratorConfig) -> Result<Self> {
        Self::from_shared(Arc::new(generator), Arc::new(store), config)
    }

    /// Build from collaborators that are also used elsewhere.
    pub fn from_shared(generator: Arc<G>, store: Arc<S>, config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = BoundedScheduler::new(config.scheduler.clone())?;
        Ok(Self {
            generator,
            store,
            scheduler,
            config,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Generate and persist every slide of one item.
    ///
    /// Only input problems are errors. Slide failures, timeouts included,
    /// are recorded in the returned [`BatchResult`].
    pub async fn generate_batch(
        &self,
        item_id: &str,
        prompts: &[GenerationPrompt],
        references: Option<&ReferenceAssetSet>,
        style_suffix: Option<&str>,
    ) -> Result<BatchResult> {
        let prompts = validate_prompts(prompts)?;
        if let Some(refs) = references {
            refs.validate()?;
        }

        let total = prompts.len();
        let started = Instant::now();
        tracing::info!(
            item_id,
            total,
            concurrency = self.config.scheduler.concurrency,
            max_attempts = self.config.retry.max_attempts,
            style_refs = references.map_or(0, |r| r.style.len()),
            persona_refs = references.map_or(0, |r| r.persona.len()),
            "Starting image batch"
        );

        let attached = references.map(|r| r.ordered()).unwrap_or_default();
        let mut probes = Vec::with_capacity(total);
        let mut tasks = Vec::with_capacity(total);

        for prompt in &prompts {
            let mut request = ImageRequest::new(build_request_text(
                &prompt.prompt_text,
                references,
                style_suffix,
            ))
            .references(attached.iter().cloned());
            if let Some(ratio) = &self.config.aspect_ratio {
                request = request.aspect_ratio(ratio.clone());
            }

            let probe = Arc::new(TaskProbe::default());
            probes.push(Arc::clone(&probe));

            let request = Arc::new(request);
            let generator = Arc::clone(&self.generator);
            let store = Arc::clone(&self.store);
            let retry = self.config.retry.clone();
            let item_id = item_id.to_string();
            let index = prompt.index;
            let label = prompt.label.clone();

            tasks.push(async move {
                probe.start();
                let outcome = async {
                    let bytes = retry
                        .run(|attempt| {
                            probe.attempts.store(attempt, Ordering::Relaxed);
                            let generator = Arc::clone(&generator);
                            let request = Arc::clone(&request);
                            async move { generator.generate(&request).await }
                        })
                        .await?;

                    let path = store
                        .save_image(&item_id, index, &bytes, &label)
                        .await
                        .map_err(SlideError::Persist)?;
                    tracing::info!(item_id = %item_id, index, path = %path.display(), "Slide saved");

                    Ok::<_, SlideError>(SavedImage {
                        path,
                        byte_size: bytes.len() as u64,
                    })
                }
                .await;
                probe.finish();
                outcome
            });
        }

        let outcomes = self.scheduler.run(tasks).await;

        let per_task: Vec<GenerationTaskResult> = prompts
            .iter()
            .zip(outcomes)
            .zip(probes)
            .map(|((prompt, outcome), probe)| {
                let mut result = match outcome {
                    Ok(saved) => GenerationTaskResult::success(
                        prompt.index,
                        &prompt.label,
                        saved.path,
                        saved.byte_size,
                    ),
                    Err(failure) => {
                        let message = describe_failure(&failure);
                        tracing::warn!(item_id, index = prompt.index, error = %message, "Slide failed");
                        GenerationTaskResult::failure(prompt.index, &prompt.label, message)
                    }
                };
                result.attempts = probe.attempts.load(Ordering::Relaxed);
                result.duration_ms = probe.duration_ms();
                result
            })
            .collect();

        let result =
            BatchResult::from_tasks(item_id, per_task, started.elapsed().as_millis() as u64);
        tracing::info!(
            item_id,
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            duration_ms = result.duration_ms,
            "Image batch finished"
        );
        Ok(result)
    }
}

fn describe_failure(failure: &TaskFailure<SlideError>) -> String {
    match failure {
        TaskFailure::Failed(e) => e.to_string(),
        TaskFailure::TimedOut(after) => {
            format!("Timed out after {}s (including retries)", after.as_secs())
        }
        other => other.to_string(),
    }
}

/// Check that indices are exactly 1..=N and return the prompts in index order.
fn validate_prompts(prompts: &[GenerationPrompt]) -> Result<Vec<GenerationPrompt>> {
    if prompts.is_empty() {
        return Err(BatchError::EmptyBatch);
    }

    let mut sorted = prompts.to_vec();
    sorted.sort_by_key(|p| p.index);
    for (position, prompt) in sorted.iter().enumerate() {
        let expected = position as u32 + 1;
        if prompt.index != expected {
            return Err(BatchError::InvalidPrompts(format!(
                "indices must be unique and dense from 1 to {}; found {} at position {}",
                prompts.len(),
                prompt.index,
                expected
            )));
        }
        if prompt.prompt_text.trim().is_empty() {
            return Err(BatchError::InvalidPrompts(format!(
                "prompt {} is empty",
                prompt.index
            )));
        }
    }
    Ok(sorted)
}
