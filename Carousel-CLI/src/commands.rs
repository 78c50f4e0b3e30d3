use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use carousel_pipeline::{
    BatchPostLoop, GeminiTextClient, ItemSource, LlmConfig, PipelineConfig, RunSummary,
    SelectionStrategy, SequentialPostPipeline, SheetSource, TextSource,
};
use gemini_image_rs::GeminiClient;
use image_batch_runner::{ImageBatchGenerator, LocalStore};
use job_registry::{JobRegistry, RegistryConfig};

use crate::args::{GlobalArgs, JobsCommand, SheetArgs, TextArgs};
use crate::output::{format_job, format_summary};
use crate::references::load_references;

fn open_registry(global: &GlobalArgs) -> Result<JobRegistry> {
    let path = global.job_db_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let config = RegistryConfig::builder()
        .with_db_path(path)
        .with_max_concurrent_jobs(global.max_jobs)
        .build();
    Ok(JobRegistry::open(config)?)
}

/// Stop the loop before its next item on Ctrl-C.
fn cancel_on_interrupt() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let signal = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current item");
            signal.store(true, Ordering::SeqCst);
        }
    });
    flag
}

async fn execute<Src: ItemSource>(
    global: &GlobalArgs,
    source: &Src,
    selection: SelectionStrategy,
    max_items: Option<usize>,
) -> Result<RunSummary> {
    let api_key = global
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .context("GOOGLE_API_KEY is not set (use --api-key or the environment)")?;

    let gemini = GeminiClient::new(api_key).with_image_model(&global.image_model);
    let images = ImageBatchGenerator::new(
        gemini.clone(),
        LocalStore::new(&global.output_dir),
        global.generator_config(),
    )?;
    let text = GeminiTextClient::new(gemini)
        .with_model(&global.text_model)
        .with_config(LlmConfig::default().with_timeout(Duration::from_secs(global.text_timeout_secs)))
        .with_retry(global.text_retry());

    let mut builder = PipelineConfig::builder()
        .with_image_count(global.image_count)
        .with_selection(selection)
        .with_style_suffix(global.style.clone());
    builder = match max_items {
        Some(max) => builder.with_max_items_per_run(max),
        None => builder.unlimited(),
    };
    if let Some(references) = load_references(&global.style_refs, &global.persona_refs).await? {
        builder = builder.with_references(references);
    }

    let pipeline = SequentialPostPipeline::new(text, images, builder.build())?;
    let batch_loop = BatchPostLoop::new(pipeline).with_cancellation(cancel_on_interrupt());
    Ok(batch_loop.run_source(source).await?)
}

/// How a finished run is recorded in the job registry.
#[derive(Debug, PartialEq, Eq)]
enum JobOutcome {
    Completed { post_id: Option<String> },
    Failed(String),
}

fn job_outcome(summary: &RunSummary) -> JobOutcome {
    if summary.has_item_without_images() {
        let empty = summary
            .outcomes
            .iter()
            .filter(|o| o.produced_no_images())
            .count();
        JobOutcome::Failed(format!("{} item(s) produced no images", empty))
    } else {
        JobOutcome::Completed {
            post_id: summary.outcomes.first().map(|o| o.item_id.clone()),
        }
    }
}

/// Any processed item without a single image fails the run. An empty
/// source is not a failure.
fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.has_item_without_images() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Register a job, run the loop, record how it ended and print the summary.
async fn run_job<Src: ItemSource>(
    global: &GlobalArgs,
    source: &Src,
    input_mode: &str,
    text_preview: Option<&str>,
    selection: SelectionStrategy,
    max_items: Option<usize>,
) -> Result<ExitCode> {
    let registry = open_registry(global)?;
    let job_id = registry.create_job(input_mode, text_preview)?;
    tracing::info!(job_id = %job_id, input_mode, "Run started");

    let result = execute(global, source, selection, max_items).await;
    let recorded = match result.as_ref().map(job_outcome) {
        Ok(JobOutcome::Completed { post_id }) => registry.complete_job(&job_id, post_id.as_deref()),
        Ok(JobOutcome::Failed(message)) => registry.fail_job(&job_id, &message),
        Err(e) => registry.fail_job(&job_id, &format!("{:#}", e)),
    };
    if let Err(e) = recorded {
        tracing::warn!(job_id = %job_id, error = %e, "Failed to record job outcome");
    }

    let summary = result?;
    if global.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", format_summary(&summary));
    }

    Ok(exit_code(&summary))
}

pub async fn sheet(global: &GlobalArgs, args: &SheetArgs) -> Result<ExitCode> {
    let source = SheetSource::new(&args.sheet_id, &args.gid, args.filters());
    run_job(global, &source, "sheet", None, args.select, args.max_items()).await
}

pub async fn text(global: &GlobalArgs, args: &TextArgs) -> Result<ExitCode> {
    let text = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("either --text or --file is required"),
    };
    let source = TextSource::new(text.clone());
    // Validate before a job is registered.
    source.item()?;
    run_job(global, &source, "text", Some(&text), SelectionStrategy::All, Some(1)).await
}

pub fn jobs(global: &GlobalArgs, command: &JobsCommand) -> Result<ExitCode> {
    let registry = open_registry(global)?;
    match command {
        JobsCommand::List { limit } => {
            for job in registry.recent_jobs(*limit)? {
                println!("{}", format_job(&job));
            }
        }
        JobsCommand::Running => {
            let running = registry.running_jobs()?;
            println!("{} running (max {})", running.len(), global.max_jobs);
            for job in running {
                println!("{}", format_job(&job));
            }
        }
        JobsCommand::Cleanup => {
            let count = registry.cleanup_stale_jobs()?;
            println!("Marked {} stale job(s) as failed", count);
        }
        JobsCommand::Prune { days } => {
            let count = registry.prune_old_jobs(*days)?;
            println!("Deleted {} job(s) older than {} days", count, days);
        }
    }
    Ok(ExitCode::SUCCESS)
}
