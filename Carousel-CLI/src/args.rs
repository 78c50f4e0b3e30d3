use std::path::PathBuf;
use std::time::Duration;

use carousel_pipeline::{SelectionStrategy, SheetFilters, DEFAULT_TEXT_MODEL};
use clap::{Args, Parser, Subcommand};
use gemini_image_rs::DEFAULT_IMAGE_MODEL;
use image_batch_runner::{GeneratorConfig, RetryPolicy};

/// Carousel post generator
#[derive(Parser, Debug)]
#[command(name = "carousel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn spreadsheet rows or free text into illustrated carousel posts")]
#[command(long_about = r#"
Runs the carousel pipeline: content analysis, creative direction, copy,
image prompts and parallel image generation, then writes a Markdown report
per post under the output directory.

Examples:
  carousel sheet --select first          # One post from the configured sheet
  carousel sheet --select all --max-items 0
  carousel text --file idea.txt --style-ref style.png
  carousel jobs running
"#)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate posts from rows of a Google Sheet
    Sheet(SheetArgs),

    /// Generate one post from free text
    Text(TextArgs),

    /// Inspect or maintain the job registry
    #[command(subcommand)]
    Jobs(JobsCommand),
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Gemini API key
    #[arg(long, global = true, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Maximum image generations in flight
    #[arg(long, global = true, env = "MAX_PARALLEL_IMAGES", default_value_t = 10)]
    pub concurrency: usize,

    /// Attempts per image, including the first
    #[arg(long, global = true, env = "RETRY_ATTEMPTS", default_value_t = 3)]
    pub retries: u32,

    /// Base backoff between attempts, doubled after each failure
    #[arg(long, global = true, env = "RETRY_DELAY", default_value_t = 2)]
    pub retry_base_secs: u64,

    /// Timeout per image, covering all of its attempts
    #[arg(long, global = true, env = "IMAGE_GENERATION_TIMEOUT", default_value_t = 60)]
    pub item_timeout_secs: u64,

    /// Optional timeout per single image attempt
    #[arg(long, global = true, env = "IMAGE_ATTEMPT_TIMEOUT")]
    pub attempt_timeout_secs: Option<u64>,

    /// Timeout per text-model request
    #[arg(long, global = true, env = "TEXT_GENERATION_TIMEOUT", default_value_t = 30)]
    pub text_timeout_secs: u64,

    /// Slides per carousel
    #[arg(long, global = true, env = "CAROUSEL_IMAGE_COUNT", default_value_t = 10)]
    pub image_count: usize,

    /// Style text appended to every image prompt
    #[arg(long, global = true, env = "STYLE", default_value = "")]
    pub style: String,

    /// Aspect ratio requested from the image model ("none" to omit)
    #[arg(long, global = true, env = "ASPECT_RATIO", default_value = "4:5")]
    pub aspect_ratio: String,

    /// Style reference images (at most 5)
    #[arg(long = "style-ref", global = true, env = "REFERENCE_STYLE_IMAGE", value_delimiter = ',')]
    pub style_refs: Vec<PathBuf>,

    /// Persona reference images (at most 5)
    #[arg(long = "persona-ref", global = true, env = "REFERENCE_PERSONA_IMAGE", value_delimiter = ',')]
    pub persona_refs: Vec<PathBuf>,

    /// Where posts, images and SUMMARY.md are written
    #[arg(long, global = true, env = "OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// Job registry database (defaults to <output-dir>/jobs.db)
    #[arg(long, global = true, env = "JOB_DB_PATH")]
    pub job_db: Option<PathBuf>,

    /// Concurrent runs allowed by the job registry
    #[arg(long, global = true, env = "MAX_CONCURRENT_JOBS", default_value_t = 5)]
    pub max_jobs: u32,

    #[arg(long, global = true, env = "TEXT_MODEL", default_value = DEFAULT_TEXT_MODEL)]
    pub text_model: String,

    #[arg(long, global = true, env = "IMAGE_MODEL", default_value = DEFAULT_IMAGE_MODEL)]
    pub image_model: String,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn generator_config(&self) -> GeneratorConfig {
        let mut builder = GeneratorConfig::builder()
            .with_concurrency(self.concurrency)
            .with_item_timeout(Duration::from_secs(self.item_timeout_secs))
            .with_max_attempts(self.retries)
            .with_base_delay(Duration::from_secs(self.retry_base_secs))
            .with_aspect_ratio(self.aspect_ratio());
        if let Some(secs) = self.attempt_timeout_secs {
            builder = builder.with_attempt_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Backoff policy for text requests; same attempts and delay as images.
    pub fn text_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_secs(self.retry_base_secs))
    }

    fn aspect_ratio(&self) -> Option<String> {
        let ratio = self.aspect_ratio.trim();
        if ratio.is_empty() || ratio.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(ratio.to_string())
        }
    }

    pub fn job_db_path(&self) -> PathBuf {
        self.job_db
            .clone()
            .unwrap_or_else(|| self.output_dir.join("jobs.db"))
    }
}

#[derive(Args, Debug)]
pub struct SheetArgs {
    /// Spreadsheet id
    #[arg(long, env = "GOOGLE_SHEETS_ID")]
    pub sheet_id: String,

    /// Tab id within the spreadsheet
    #[arg(long, env = "SHEET_GID", default_value = "0")]
    pub gid: String,

    /// Accepted VIRALITY values, comma separated (empty accepts all)
    #[arg(long, env = "VIRALITY_FILTER", default_value = "VIRUS,BEST,GOOD")]
    pub virality: String,

    /// Accepted ENGAGEMENT values, comma separated (empty accepts all)
    #[arg(long, env = "ENGAGEMENT_FILTER", default_value = "BEST ER,VIRAL ER")]
    pub engagement: String,

    /// Which matching rows to work on: first, random or all
    #[arg(long, env = "SELECTION", default_value = "random")]
    pub select: SelectionStrategy,

    /// Posts per run; 0 processes every selected row
    #[arg(long, env = "BATCH_SIZE", default_value_t = 1)]
    pub max_items: usize,
}

impl SheetArgs {
    pub fn filters(&self) -> SheetFilters {
        SheetFilters::new(
            SheetFilters::parse_list(&self.virality),
            SheetFilters::parse_list(&self.engagement),
        )
    }

    /// `None` means no limit.
    pub fn max_items(&self) -> Option<usize> {
        (self.max_items > 0).then_some(self.max_items)
    }
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct TextArgs {
    /// The post text
    #[arg(long)]
    pub text: Option<String>,

    /// Read the post text from a file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// Most recent jobs
    List {
        #[arg(short, long, default_value_t = job_registry::DEFAULT_RECENT_LIMIT)]
        limit: u32,
    },

    /// Jobs currently running
    Running,

    /// Mark jobs left running by a crashed process as failed
    Cleanup,

    /// Delete finished jobs older than the given age
    Prune {
        #[arg(long, default_value_t = job_registry::DEFAULT_PRUNE_DAYS)]
        days: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_defaults() {
        let cli = Cli::try_parse_from(["carousel", "sheet", "--sheet-id", "abc"]).unwrap();
        let Command::Sheet(sheet) = &cli.command else {
            panic!("expected sheet command");
        };
        assert_eq!(sheet.gid, "0");
        assert_eq!(sheet.select, SelectionStrategy::Random);
        assert_eq!(sheet.max_items(), Some(1));
        assert_eq!(sheet.filters().virality, vec!["VIRUS", "BEST", "GOOD"]);
        assert_eq!(sheet.filters().engagement, vec!["BEST ER", "VIRAL ER"]);

        let config = cli.global.generator_config();
        assert_eq!(config.scheduler.concurrency, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.aspect_ratio.as_deref(), Some("4:5"));
        assert_eq!(cli.global.job_db_path(), PathBuf::from("output/jobs.db"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "carousel",
            "sheet",
            "--sheet-id",
            "abc",
            "--select",
            "all",
            "--max-items",
            "0",
            "--concurrency",
            "4",
            "--attempt-timeout-secs",
            "20",
            "--aspect-ratio",
            "none",
            "--style-ref",
            "a.png,b.jpg",
        ])
        .unwrap();
        let Command::Sheet(sheet) = &cli.command else {
            panic!("expected sheet command");
        };
        assert_eq!(sheet.select, SelectionStrategy::All);
        assert_eq!(sheet.max_items(), None);

        let config = cli.global.generator_config();
        assert_eq!(config.scheduler.concurrency, 4);
        assert_eq!(config.retry.attempt_timeout, Some(Duration::from_secs(20)));
        assert!(config.aspect_ratio.is_none());
        assert_eq!(cli.global.style_refs.len(), 2);
    }

    #[test]
    fn test_text_requires_exactly_one_input() {
        assert!(Cli::try_parse_from(["carousel", "text"]).is_err());
        assert!(Cli::try_parse_from(["carousel", "text", "--text", "a", "--file", "b"]).is_err());
        let cli = Cli::try_parse_from(["carousel", "text", "--text", "hello"]).unwrap();
        assert!(matches!(cli.command, Command::Text(TextArgs { text: Some(_), file: None })));
    }

    #[test]
    fn test_jobs_subcommands() {
        let cli = Cli::try_parse_from(["carousel", "jobs", "prune", "--days", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Jobs(JobsCommand::Prune { days: 3 })));

        let cli = Cli::try_parse_from(["carousel", "jobs", "list"]).unwrap();
        assert!(matches!(cli.command, Command::Jobs(JobsCommand::List { limit: 20 })));
    }

    #[test]
    fn test_unknown_selection_rejected() {
        assert!(Cli::try_parse_from(["carousel", "sheet", "--sheet-id", "x", "--select", "best"]).is_err());
    }
}
