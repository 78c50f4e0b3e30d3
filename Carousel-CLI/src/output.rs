use std::fmt::Write;

use carousel_pipeline::{RunSummary, StopReason};
use job_registry::JobRecord;

/// Human-readable run summary.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run summary");
    let _ = writeln!(out, "  Items processed: {}", summary.items_processed);
    let _ = writeln!(
        out,
        "  Items succeeded: {}  failed: {}",
        summary.items_succeeded, summary.items_failed
    );
    let _ = writeln!(
        out,
        "  Images generated: {}  failed: {}",
        summary.images_successful, summary.images_failed
    );
    let _ = writeln!(out, "  Duration: {:.1}s", summary.duration_ms as f64 / 1000.0);
    match summary.stop_reason {
        Some(StopReason::NoItemsRemaining) if summary.items_processed == 0 => {
            let _ = writeln!(out, "  No items to process.");
        }
        Some(StopReason::Cancelled) => {
            let _ = writeln!(out, "  Stopped early: cancelled.");
        }
        _ => {}
    }

    for outcome in &summary.outcomes {
        let total = outcome.batch.as_ref().map_or(0, |b| b.total);
        let _ = writeln!(
            out,
            "\n{} \"{}\": {}/{} images",
            outcome.item_id,
            outcome.title,
            outcome.images_successful(),
            total
        );
        if let Some(path) = &outcome.report_path {
            let _ = writeln!(out, "  Report: {}", path.display());
        }
        if let (Some(stage), Some(error)) = (&outcome.failed_stage, &outcome.error) {
            let _ = writeln!(out, "  Error in {}: {}", stage, error);
        }
        if let Some(batch) = &outcome.batch {
            for task in batch.failures() {
                let _ = writeln!(
                    out,
                    "  Slide {} failed: {}",
                    task.index,
                    task.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    out
}

/// One line per job for `jobs` listings.
pub fn format_job(job: &JobRecord) -> String {
    let mut line = format!(
        "{}  {:<9}  {:<5}  {}",
        job.id,
        job.status.as_str(),
        job.input_mode,
        job.started_at
    );
    if let Some(post_id) = &job.post_id {
        let _ = write!(line, "  post={}", post_id);
    }
    if let Some(preview) = &job.text_preview {
        let _ = write!(line, "  \"{}\"", preview);
    }
    if let Some(error) = &job.error {
        let _ = write!(line, "  error={}", error);
    }
    line
}
