use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gemini_image_rs::{GenerationError, ImageGenerator, ImageRequest, ReferenceImage};
use image_batch_runner::*;
use tempfile::tempdir;

/// Scripted image model keyed by exact prompt text.
#[derive(Default)]
struct ScriptedGenerator {
    latency: Duration,
    always_fail: HashSet<String>,
    fail_first: HashMap<String, u32>,
    hang: HashSet<String>,
    slow: HashMap<String, Duration>,
    calls: Mutex<HashMap<String, u32>>,
    seen: Mutex<Vec<ImageRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedGenerator {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    fn calls_for(&self, prompt: &str) -> u32 {
        self.calls.lock().unwrap().get(prompt).copied().unwrap_or(0)
    }
}

impl ImageGenerator for ScriptedGenerator {
    async fn generate(&self, request: &ImageRequest) -> gemini_image_rs::Result<Vec<u8>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(request.prompt.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.seen.lock().unwrap().push(request.clone());

        if self.hang.contains(&request.prompt) {
            std::future::pending::<()>().await;
        }
        let delay = self.slow.get(&request.prompt).copied().unwrap_or(self.latency);
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.always_fail.contains(&request.prompt) {
            return Err(GenerationError::NoCandidates);
        }
        if let Some(&failures) = self.fail_first.get(&request.prompt) {
            if call <= failures {
                return Err(GenerationError::Http {
                    status: 503,
                    body: "overloaded".into(),
                });
            }
        }
        Ok(request.prompt.as_bytes().to_vec())
    }
}

/// Store whose image writes always fail.
struct BrokenStore;

impl ArtifactStore for BrokenStore {
    async fn save_image(&self, _: &str, _: u32, _: &[u8], _: &str) -> io::Result<PathBuf> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }

    async fn save_report(&self, _: &str, _: &str) -> io::Result<PathBuf> {
        Err(io::Error::other("unused"))
    }

    async fn save_prompts(&self, _: &str, _: &[GenerationPrompt]) -> io::Result<PathBuf> {
        Err(io::Error::other("unused"))
    }

    async fn append_index(&self, _: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps images in memory so timing tests never wait on blocking file I/O.
#[derive(Default)]
struct MemoryStore {
    images: Mutex<HashMap<u32, Vec<u8>>>,
}

impl ArtifactStore for MemoryStore {
    async fn save_image(&self, item_id: &str, index: u32, bytes: &[u8], _: &str) -> io::Result<PathBuf> {
        self.images.lock().unwrap().insert(index, bytes.to_vec());
        Ok(PathBuf::from(format!("mem/{}/{}", item_id, index)))
    }

    async fn save_report(&self, item_id: &str, _: &str) -> io::Result<PathBuf> {
        Ok(PathBuf::from(format!("mem/{}/report", item_id)))
    }

    async fn save_prompts(&self, item_id: &str, _: &[GenerationPrompt]) -> io::Result<PathBuf> {
        Ok(PathBuf::from(format!("mem/{}/prompts", item_id)))
    }

    async fn append_index(&self, _: &str) -> io::Result<()> {
        Ok(())
    }
}

fn prompt_text(index: u32) -> String {
    format!("Create slide {}", index)
}

fn prompts(n: u32) -> Vec<GenerationPrompt> {
    (1..=n)
        .map(|i| GenerationPrompt::new(i, format!("TEXT {}", i), prompt_text(i)))
        .collect()
}

fn config(concurrency: usize) -> GeneratorConfig {
    GeneratorConfig::builder()
        .with_concurrency(concurrency)
        .with_item_timeout(Duration::from_secs(60))
        .with_max_attempts(3)
        .with_base_delay(Duration::from_secs(2))
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_all_slides_succeed() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::with_latency(Duration::from_secs(3)));
    let batch = ImageBatchGenerator::from_shared(
        Arc::clone(&generator),
        Arc::new(LocalStore::new(dir.path())),
        config(3),
    )
    .unwrap();

    let result = batch
        .generate_batch("post_1", &prompts(10), None, None)
        .await
        .unwrap();

    assert_eq!(result.total, 10);
    assert_eq!(result.successful, 10);
    assert_eq!(result.failed, 0);
    assert_eq!(result.status(), BatchStatus::Success);

    let paths: HashSet<_> = result.artifact_paths().into_iter().cloned().collect();
    assert_eq!(paths.len(), 10);
    for path in &paths {
        assert!(path.exists());
    }

    let indices: Vec<u32> = result.per_task.iter().map(|t| t.index).collect();
    assert_eq!(indices, (1..=10).collect::<Vec<_>>());
    assert!(result.per_task.iter().all(|t| t.attempts == 1));

    let slide_4 = result.task(4).unwrap();
    assert!(slide_4
        .artifact_path
        .as_ref()
        .unwrap()
        .ends_with("post_1/images/slide_04_TEXT_4.png"));
    assert_eq!(slide_4.byte_size, Some(prompt_text(4).len() as u64));
}

#[tokio::test(start_paused = true)]
async fn test_one_slide_fails_every_attempt() {
    let dir = tempdir().unwrap();
    let mut scripted = ScriptedGenerator::with_latency(Duration::from_millis(500));
    scripted.always_fail.insert(prompt_text(4));
    let generator = Arc::new(scripted);
    let batch = ImageBatchGenerator::from_shared(
        Arc::clone(&generator),
        Arc::new(LocalStore::new(dir.path())),
        config(3),
    )
    .unwrap();

    let result = batch
        .generate_batch("post_2", &prompts(10), None, None)
        .await
        .unwrap();

    assert_eq!(result.total, 10);
    assert_eq!(result.successful, 9);
    assert_eq!(result.failed, 1);
    assert_eq!(result.status(), BatchStatus::Partial);
    assert!(!result.is_total_failure());

    let failed = result.task(4).unwrap();
    assert_eq!(failed.status, TaskStatus::Error);
    assert!(failed.artifact_path.is_none());
    assert!(failed.error.as_deref().unwrap().contains("No candidates"));
    assert_eq!(failed.attempts, 3);
    assert_eq!(generator.calls_for(&prompt_text(4)), 3);

    for task in result.per_task.iter().filter(|t| t.index != 4) {
        assert!(task.artifact_path.is_some(), "slide {} has no path", task.index);
        assert!(task.error.is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_deadline_marks_slow_slides() {
    let mut scripted = ScriptedGenerator::with_latency(Duration::from_millis(100));
    scripted
        .slow
        .insert(prompt_text(2), Duration::from_secs(600));
    let config = GeneratorConfig::builder()
        .with_concurrency(3)
        .with_item_timeout(Duration::from_secs(900))
        .with_batch_slice(Duration::from_secs(5))
        .with_batch_buffer(Duration::ZERO)
        .build();
    let store = Arc::new(MemoryStore::default());
    let batch =
        ImageBatchGenerator::from_shared(Arc::new(scripted), Arc::clone(&store), config).unwrap();

    let result = batch
        .generate_batch("post_3", &prompts(3), None, None)
        .await
        .unwrap();

    assert_eq!(result.successful, 2);
    assert_eq!(result.failed, 1);
    let slow = result.task(2).unwrap();
    assert!(slow.error.as_deref().unwrap().contains("deadline"));
    assert!(result.task(1).unwrap().is_success());
    assert!(result.task(3).unwrap().is_success());
    let saved = store.images.lock().unwrap();
    assert!(saved.contains_key(&1) && saved.contains_key(&3));
    assert!(!saved.contains_key(&2));
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_never_exceeds_bound() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::with_latency(Duration::from_secs(1)));
    let batch = ImageBatchGenerator::from_shared(
        Arc::clone(&generator),
        Arc::new(LocalStore::new(dir.path())),
        config(4),
    )
    .unwrap();

    let result = batch
        .generate_batch("post_4", &prompts(20), None, None)
        .await
        .unwrap();

    assert_eq!(result.successful, 20);
    assert!(generator.peak.load(Ordering::SeqCst) <= 4);
    assert_eq!(generator.peak.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_retried_slide_waits_for_backoff() {
    let mut scripted = ScriptedGenerator::with_latency(Duration::from_millis(10));
    scripted.fail_first.insert(prompt_text(2), 2);
    let generator = Arc::new(scripted);
    let config = config(2);
    let backoff = config.retry.total_backoff(2);
    let batch = ImageBatchGenerator::from_shared(
        Arc::clone(&generator),
        Arc::new(MemoryStore::default()),
        config,
    )
    .unwrap();

    let result = batch
        .generate_batch("post_5", &prompts(3), None, None)
        .await
        .unwrap();

    assert_eq!(result.successful, 3);
    let retried = result.task(2).unwrap();
    assert_eq!(retried.attempts, 3);
    assert!(Duration::from_millis(retried.duration_ms) >= backoff);
    assert_eq!(backoff, Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_slide_times_out_alone() {
    let mut scripted = ScriptedGenerator::with_latency(Duration::from_secs(1));
    scripted.hang.insert(prompt_text(1));
    let config = GeneratorConfig::builder()
        .with_concurrency(2)
        .with_item_timeout(Duration::from_secs(20))
        .build();
    let batch = ImageBatchGenerator::new(scripted, MemoryStore::default(), config).unwrap();

    let result = batch
        .generate_batch("post_6", &prompts(5), None, None)
        .await
        .unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(result.successful, 4);
    let hung = result.task(1).unwrap();
    assert!(hung.error.as_deref().unwrap().contains("Timed out"));
    // The timed-out slide reports how long it ran before being dropped.
    assert!(Duration::from_millis(hung.duration_ms) >= Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_is_not_retried() {
    struct Rejecting;

    impl ImageGenerator for Rejecting {
        async fn generate(&self, _request: &ImageRequest) -> gemini_image_rs::Result<Vec<u8>> {
            Err(GenerationError::Http {
                status: 400,
                body: "bad request".into(),
            })
        }
    }

    let dir = tempdir().unwrap();
    let batch = ImageBatchGenerator::new(Rejecting, LocalStore::new(dir.path()), config(3)).unwrap();
    let result = batch
        .generate_batch("post_7", &prompts(2), None, None)
        .await
        .unwrap();

    assert!(result.is_total_failure());
    assert!(result.per_task.iter().all(|t| t.attempts == 1));
}

#[tokio::test(start_paused = true)]
async fn test_persist_failure_is_recorded() {
    let batch = ImageBatchGenerator::new(
        ScriptedGenerator::with_latency(Duration::from_millis(1)),
        BrokenStore,
        config(2),
    )
    .unwrap();

    let result = batch
        .generate_batch("post_8", &prompts(2), None, None)
        .await
        .unwrap();

    assert_eq!(result.failed, 2);
    for task in &result.per_task {
        assert!(task.error.as_deref().unwrap().contains("Failed to save image"));
    }
}

#[tokio::test]
async fn test_empty_and_invalid_batches_rejected() {
    let dir = tempdir().unwrap();
    let batch = ImageBatchGenerator::new(
        ScriptedGenerator::default(),
        LocalStore::new(dir.path()),
        config(2),
    )
    .unwrap();

    let empty = batch.generate_batch("post_9", &[], None, None).await;
    assert!(matches!(empty, Err(BatchError::EmptyBatch)));

    let img = ReferenceImage::new("image/png", vec![1u8]);
    let refs = ReferenceAssetSet::new(vec![img; 6], vec![]);
    let too_many = batch
        .generate_batch("post_9", &prompts(1), Some(&refs), None)
        .await;
    assert!(matches!(too_many, Err(BatchError::TooManyReferences { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_requests_carry_references_and_suffix() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::with_latency(Duration::from_millis(1)));
    let batch = ImageBatchGenerator::from_shared(
        Arc::clone(&generator),
        Arc::new(LocalStore::new(dir.path())),
        config(2),
    )
    .unwrap();

    let style = ReferenceImage::new("image/png", vec![1u8]);
    let persona = ReferenceImage::new("image/jpeg", vec![2u8]);
    let refs = ReferenceAssetSet::new(vec![style], vec![persona]);

    batch
        .generate_batch("post_10", &prompts(2), Some(&refs), Some("watercolor"))
        .await
        .unwrap();

    let seen = generator.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for request in seen.iter() {
        assert_eq!(request.references.len(), 2);
        assert_eq!(request.references[0].mime_type, "image/png");
        assert_eq!(request.references[1].mime_type, "image/jpeg");
        assert_eq!(request.aspect_ratio.as_deref(), Some("4:5"));
        assert!(!request.prompt.contains("watercolor"));
    }
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let result = ImageBatchGenerator::new(
        ScriptedGenerator::default(),
        LocalStore::new("unused"),
        GeneratorConfig::builder().with_concurrency(0).build(),
    );
    assert!(matches!(result, Err(BatchError::InvalidConfig(_))));
}
