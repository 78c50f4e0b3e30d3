use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use gemini_image_rs::ImageGenerator;
use image_batch_runner::{ArtifactStore, BatchResult, GenerationPrompt, ImageBatchGenerator};
use serde::Serialize;

use crate::client::TextGenerator;
use crate::config::PipelineConfig;
use crate::context::{ItemState, PipelineContext};
use crate::error::{PipelineError, Result};
use crate::extract::{extract_json, StageText};
use crate::formatter::format_prompts;
use crate::prompt::{
    render, ANALYZE_TEMPLATE, COPY_TEMPLATE, DIRECT_TEMPLATE, FLEXIBLE_TEXT_RULE, PERSONA_NOTE,
    PROMPTS_TEMPLATE, SHORT_TEXT_RULE, STYLE_REFERENCE_NOTE,
};
use crate::report::{index_line, post_title, render_report};
use crate::types::{ContentAnalysis, CopyContent, CreativeBrief, InputMode};

/// Stages of one item, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Select,
    Analyze,
    Direct,
    WriteCopy,
    EngineerPrompts,
    FormatPrompts,
    GenerateImages,
    PersistResult,
    ClearState,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Select,
        Stage::Analyze,
        Stage::Direct,
        Stage::WriteCopy,
        Stage::EngineerPrompts,
        Stage::FormatPrompts,
        Stage::GenerateImages,
        Stage::PersistResult,
        Stage::ClearState,
    ];

    /// Stages between selection and persistence. A failure in any of them
    /// ends the item's work early.
    const WORK: [Stage; 6] = [
        Stage::Analyze,
        Stage::Direct,
        Stage::WriteCopy,
        Stage::EngineerPrompts,
        Stage::FormatPrompts,
        Stage::GenerateImages,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Select => "select",
            Stage::Analyze => "analyze",
            Stage::Direct => "direct",
            Stage::WriteCopy => "write_copy",
            Stage::EngineerPrompts => "engineer_prompts",
            Stage::FormatPrompts => "format_prompts",
            Stage::GenerateImages => "generate_images",
            Stage::PersistResult => "persist_result",
            Stage::ClearState => "clear_state",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a loop stopped before reaching its item limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    NoItemsRemaining,
    Cancelled,
}

/// Result of one [`SequentialPostPipeline::run_once`] call.
#[derive(Debug)]
pub enum PipelineStep {
    /// An item was processed (successfully or not); keep going.
    Continue(ItemOutcome),
    Stop(StopReason),
}

/// What happened to one item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub item_id: String,
    pub title: String,
    pub batch: Option<BatchResult>,
    pub report_path: Option<PathBuf>,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
}

impl ItemOutcome {
    fn from_state(state: &ItemState) -> Self {
        let (failed_stage, error) = match &state.failure {
            Some((stage, error)) => (Some(stage.clone()), Some(error.clone())),
            None => (None, None),
        };
        Self {
            item_id: state.item.id.clone(),
            title: post_title(state),
            batch: state.batch.clone(),
            report_path: state.report_path.clone(),
            failed_stage,
            error,
        }
    }

    pub fn images_successful(&self) -> usize {
        self.batch.as_ref().map_or(0, |b| b.successful)
    }

    pub fn images_failed(&self) -> usize {
        self.batch.as_ref().map_or(0, |b| b.failed)
    }

    /// The item produced no image at all.
    pub fn produced_no_images(&self) -> bool {
        self.images_successful() == 0
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.produced_no_images()
    }
}

/// Parse ENGINEER_PROMPTS output into at most `image_count` prompts.
///
/// Accepts a JSON array (or an object with a `prompts` array) of
/// `{"i","t","p"}` entries. Entries that do not fit are skipped. The rest are
/// sorted by their given index and renumbered `1..=N`.
pub fn parse_prompts(raw: &str, image_count: usize) -> Vec<GenerationPrompt> {
    let Some(value) = extract_json(raw) else {
        return Vec::new();
    };
    let entries = match value {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Object(mut map) => {
            match map.remove("prompts").or_else(|| map.remove("image_prompts")) {
                Some(serde_json::Value::Array(entries)) => entries,
                _ => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };

    let mut prompts: Vec<GenerationPrompt> = entries
        .into_iter()
        .filter_map(|e| serde_json::from_value::<GenerationPrompt>(e).ok())
        .filter(|p| !p.prompt_text.trim().is_empty())
        .collect();
    prompts.sort_by_key(|p| p.index);
    prompts.truncate(image_count);
    for (position, prompt) in prompts.iter_mut().enumerate() {
        prompt.index = position as u32 + 1;
    }
    prompts
}

fn current(ctx: &PipelineContext) -> Result<&ItemState> {
    ctx.current()
        .ok_or_else(|| PipelineError::MissingInput("no current item".to_string()))
}

fn current_mut(ctx: &mut PipelineContext) -> Result<&mut ItemState> {
    ctx.current_mut()
        .ok_or_else(|| PipelineError::MissingInput("no current item".to_string()))
}

fn raw_or_empty(stage: &Option<StageText>) -> &str {
    stage.as_ref().map_or("{}", |s| s.raw.trim())
}

/// Drives one item at a time through the carousel stages.
///
/// Text stages go through a [`TextGenerator`]; images go through an
/// [`ImageBatchGenerator`], whose store also receives the report.
pub struct SequentialPostPipeline<T, G, S> {
    text: Arc<T>,
    images: ImageBatchGenerator<G, S>,
    config: PipelineConfig,
}

impl<T, G, S> SequentialPostPipeline<T, G, S>
where
    T: TextGenerator,
    G: ImageGenerator,
    S: ArtifactStore,
{
    pub fn new(text: T, images: ImageBatchGenerator<G, S>, config: PipelineConfig) -> Result<Self> {
        Self::from_shared(Arc::new(text), images, config)
    }

    pub fn from_shared(
        text: Arc<T>,
        images: ImageBatchGenerator<G, S>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            text,
            images,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process the next pending item from SELECT through CLEAR_STATE.
    ///
    /// Returns [`PipelineStep::Stop`] when SELECT finds nothing. A failing
    /// stage skips the remaining work stages, but the report is still
    /// written and state is always cleared.
    pub async fn run_once(&self, ctx: &mut PipelineContext) -> PipelineStep {
        if !ctx.select_next(self.config.references.clone()) {
            tracing::info!(
                processed = ctx.counters.items_processed,
                "No items remaining, stopping"
            );
            return PipelineStep::Stop(StopReason::NoItemsRemaining);
        }

        let item_id = ctx
            .current()
            .map(|s| s.item.id.clone())
            .unwrap_or_default();
        tracing::info!(
            item_id = %item_id,
            position = ctx.counters.next_index,
            total = ctx.pending().len(),
            "Selected item"
        );

        for stage in Stage::WORK {
            tracing::debug!(item_id = %item_id, stage = %stage, "Running stage");
            if let Err(e) = self.run_stage(stage, ctx).await {
                tracing::error!(item_id = %item_id, stage = %stage, error = %e, "Stage failed, abandoning item");
                if let Some(state) = ctx.current_mut() {
                    state.failure = Some((stage.name().to_string(), e.to_string()));
                }
                break;
            }
        }

        if let Err(e) = self.persist(ctx).await {
            tracing::error!(item_id = %item_id, error = %e, "Failed to persist item");
            if let Some(state) = ctx.current_mut() {
                if state.failure.is_none() {
                    state.failure = Some((Stage::PersistResult.name().to_string(), e.to_string()));
                }
            }
        }

        let outcome = match ctx.current() {
            Some(state) => ItemOutcome::from_state(state),
            None => ItemOutcome {
                item_id: item_id.clone(),
                title: "Untitled Post".to_string(),
                batch: None,
                report_path: None,
                failed_stage: None,
                error: Some("item state lost".to_string()),
            },
        };

        let counters = &mut ctx.counters;
        counters.items_processed += 1;
        if outcome.is_success() {
            counters.items_succeeded += 1;
        } else {
            counters.items_failed += 1;
        }
        counters.images_successful += outcome.images_successful();
        counters.images_failed += outcome.images_failed();

        let cleared = ctx.clear();
        tracing::info!(
            item_id = %item_id,
            cleared = cleared.len(),
            images = outcome.images_successful(),
            success = outcome.is_success(),
            "Item finished, state cleared"
        );
        PipelineStep::Continue(outcome)
    }

    async fn run_stage(&self, stage: Stage, ctx: &mut PipelineContext) -> Result<()> {
        match stage {
            Stage::Analyze => self.analyze(ctx).await,
            Stage::Direct => self.direct(ctx).await,
            Stage::WriteCopy => self.write_copy(ctx).await,
            Stage::EngineerPrompts => self.engineer_prompts(ctx).await,
            Stage::FormatPrompts => self.format(ctx),
            Stage::GenerateImages => self.generate_images(ctx).await,
            Stage::Select | Stage::PersistResult | Stage::ClearState => Ok(()),
        }
    }

    async fn ask(&self, ctx: &mut PipelineContext, stage: Stage, prompt: &str) -> Result<StageText> {
        let raw = self.text.generate_text(prompt).await?;
        ctx.ephemeral.text_calls += 1;

        let text = StageText::from_raw(raw);
        if !text.is_parsed() {
            tracing::warn!(stage = %stage, chars = text.raw.len(), "Stage output is not JSON, keeping raw text");
        }
        Ok(text)
    }

    async fn analyze(&self, ctx: &mut PipelineContext) -> Result<()> {
        let content = current(ctx)?.item.content.clone();
        let prompt = render(ANALYZE_TEMPLATE, &[("content", &content)]);
        let analysis = self.ask(ctx, Stage::Analyze, &prompt).await?;
        if let Some(parsed) = analysis.parse_as::<ContentAnalysis>() {
            tracing::info!(
                topic = %parsed.topic,
                tone = %parsed.tone,
                is_story = parsed.is_story,
                "Content analysed"
            );
        }
        current_mut(ctx)?.analysis = Some(analysis);
        Ok(())
    }

    async fn direct(&self, ctx: &mut PipelineContext) -> Result<()> {
        let state = current(ctx)?;
        let style_note = if state.has_style_reference() {
            STYLE_REFERENCE_NOTE
        } else {
            ""
        };
        let prompt = render(
            DIRECT_TEMPLATE,
            &[
                ("analysis", raw_or_empty(&state.analysis)),
                ("image_count", &self.config.image_count.to_string()),
                ("style_note", style_note),
            ],
        );
        let brief = self.ask(ctx, Stage::Direct, &prompt).await?;
        current_mut(ctx)?.brief = Some(brief);
        Ok(())
    }

    async fn write_copy(&self, ctx: &mut PipelineContext) -> Result<()> {
        let state = current(ctx)?;
        let text_rule = match state.item.mode {
            InputMode::Text => FLEXIBLE_TEXT_RULE,
            InputMode::Sheet => SHORT_TEXT_RULE,
        };
        let prompt = render(
            COPY_TEMPLATE,
            &[
                ("analysis", raw_or_empty(&state.analysis)),
                ("brief", raw_or_empty(&state.brief)),
                ("image_count", &self.config.image_count.to_string()),
                ("text_rule", text_rule),
            ],
        );
        let copy = self.ask(ctx, Stage::WriteCopy, &prompt).await?;

        if let Some(parsed) = copy.parse_as::<CopyContent>() {
            if parsed.image_texts.len() != self.config.image_count {
                tracing::warn!(
                    expected = self.config.image_count,
                    got = parsed.image_texts.len(),
                    "Copy has wrong number of image texts"
                );
            }
        }
        current_mut(ctx)?.copy = Some(copy);
        Ok(())
    }

    async fn engineer_prompts(&self, ctx: &mut PipelineContext) -> Result<()> {
        let state = current(ctx)?;
        let art_style = if state.has_style_reference() {
            "the style of the attached reference image".to_string()
        } else {
            state
                .brief
                .as_ref()
                .and_then(|b| b.parse_as::<CreativeBrief>())
                .map(|b| b.art_style)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "the art style from the creative brief".to_string())
        };
        let persona_note = if state.has_persona_reference() {
            PERSONA_NOTE
        } else {
            ""
        };
        let prompt = render(
            PROMPTS_TEMPLATE,
            &[
                ("brief", raw_or_empty(&state.brief)),
                ("copy", raw_or_empty(&state.copy)),
                ("image_count", &self.config.image_count.to_string()),
                ("art_style", &art_style),
                ("persona_note", persona_note),
            ],
        );
        let output = self.ask(ctx, Stage::EngineerPrompts, &prompt).await?;

        let prompts = parse_prompts(&output.raw, self.config.image_count);
        if prompts.is_empty() {
            tracing::warn!("No usable image prompts in model output, keeping raw text");
        } else if prompts.len() < self.config.image_count {
            tracing::warn!(
                expected = self.config.image_count,
                got = prompts.len(),
                "Fewer image prompts than requested"
            );
        }

        let state = current_mut(ctx)?;
        state.raw_prompts = Some(output.raw);
        state.prompts = prompts;
        Ok(())
    }

    fn format(&self, ctx: &mut PipelineContext) -> Result<()> {
        let state = current_mut(ctx)?;
        let brief = state
            .brief
            .as_ref()
            .and_then(|b| b.parse_as::<CreativeBrief>());
        let has_style = state.has_style_reference();
        format_prompts(&mut state.prompts, brief.as_ref(), has_style);
        Ok(())
    }

    async fn generate_images(&self, ctx: &mut PipelineContext) -> Result<()> {
        let state = current(ctx)?;
        if state.prompts.is_empty() {
            return Err(PipelineError::MissingInput(
                "No image prompts to generate".to_string(),
            ));
        }
        let item_id = state.item.id.clone();
        let prompts = state.prompts.clone();
        let references = state.references.clone();

        let batch = self
            .images
            .generate_batch(
                &item_id,
                &prompts,
                references.as_ref(),
                self.config.style_suffix.as_deref(),
            )
            .await?;

        ctx.ephemeral.images_generated = batch.successful;
        current_mut(ctx)?.batch = Some(batch);
        Ok(())
    }

    async fn persist(&self, ctx: &mut PipelineContext) -> Result<()> {
        let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let store = self.images.store();

        let (item_id, prompts) = {
            let state = current(ctx)?;
            (state.item.id.clone(), state.prompts.clone())
        };
        if !prompts.is_empty() {
            store.save_prompts(&item_id, &prompts).await?;
        }

        let report = render_report(current(ctx)?, &generated_at);
        let path = store.save_report(&item_id, &report).await?;
        tracing::info!(item_id = %item_id, path = %path.display(), "Report saved");
        current_mut(ctx)?.report_path = Some(path);

        let line = index_line(current(ctx)?, &generated_at);
        store.append_index(&line).await?;
        Ok(())
    }
}
