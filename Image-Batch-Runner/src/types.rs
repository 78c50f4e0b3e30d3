use std::path::PathBuf;

use gemini_image_rs::ReferenceImage;
use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};

/// Maximum reference images per kind (style, persona).
pub const MAX_REFERENCES_PER_KIND: usize = 5;

/// One slide to generate.
///
/// Serialized with the compact keys `i`, `t`, `p`. Longer spellings are
/// accepted when parsing model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPrompt {
    /// 1-based slide number; unique and dense within a batch.
    #[serde(rename = "i", alias = "index", alias = "slide_number")]
    pub index: u32,
    /// Short on-image text, also used in the file name.
    #[serde(rename = "t", alias = "label", alias = "image_text", default)]
    pub label: String,
    #[serde(rename = "p", alias = "prompt", alias = "prompt_text")]
    pub prompt_text: String,
}

impl GenerationPrompt {
    pub fn new(index: u32, label: impl Into<String>, prompt_text: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
            prompt_text: prompt_text.into(),
        }
    }
}

/// Reference images attached to every request of one item's batch.
#[derive(Debug, Clone, Default)]
pub struct ReferenceAssetSet {
    pub style: Vec<ReferenceImage>,
    pub persona: Vec<ReferenceImage>,
}

impl ReferenceAssetSet {
    pub fn new(style: Vec<ReferenceImage>, persona: Vec<ReferenceImage>) -> Self {
        Self { style, persona }
    }

    pub fn has_style(&self) -> bool {
        !self.style.is_empty()
    }

    pub fn has_persona(&self) -> bool {
        !self.persona.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.style.is_empty() && self.persona.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        for (kind, list) in [("style", &self.style), ("persona", &self.persona)] {
            if list.len() > MAX_REFERENCES_PER_KIND {
                return Err(BatchError::TooManyReferences {
                    kind,
                    count: list.len(),
                    max: MAX_REFERENCES_PER_KIND,
                });
            }
        }
        Ok(())
    }

    /// Style images first, then persona images.
    pub fn ordered(&self) -> Vec<ReferenceImage> {
        self.style.iter().chain(self.persona.iter()).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Success,
    Error,
}

/// Outcome of one slide.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTaskResult {
    pub index: u32,
    pub label: String,
    pub status: TaskStatus,
    pub artifact_path: Option<PathBuf>,
    pub error: Option<String>,
    pub byte_size: Option<u64>,
    /// Generation attempts started for this slide.
    pub attempts: u32,
    pub duration_ms: u64,
}

impl GenerationTaskResult {
    pub fn success(index: u32, label: &str, path: PathBuf, byte_size: u64) -> Self {
        Self {
            index,
            label: label.to_string(),
            status: TaskStatus::Success,
            artifact_path: Some(path),
            error: None,
            byte_size: Some(byte_size),
            attempts: 0,
            duration_ms: 0,
        }
    }

    pub fn failure(index: u32, label: &str, error: String) -> Self {
        Self {
            index,
            label: label.to_string(),
            status: TaskStatus::Error,
            artifact_path: None,
            error: Some(error),
            byte_size: None,
            attempts: 0,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    /// Every slide succeeded.
    Success,
    /// At least one slide failed.
    Partial,
}

/// Summary of one item's batch.
///
/// `successful + failed == total`, and `per_task` holds exactly one entry
/// per input prompt, ordered by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub item_id: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub per_task: Vec<GenerationTaskResult>,
    pub duration_ms: u64,
}

impl BatchResult {
    pub fn from_tasks(item_id: &str, per_task: Vec<GenerationTaskResult>, duration_ms: u64) -> Self {
        let successful = per_task.iter().filter(|t| t.is_success()).count();
        Self {
            item_id: item_id.to_string(),
            total: per_task.len(),
            successful,
            failed: per_task.len() - successful,
            per_task,
            duration_ms,
        }
    }

    pub fn status(&self) -> BatchStatus {
        if self.failed == 0 {
            BatchStatus::Success
        } else {
            BatchStatus::Partial
        }
    }

    /// No slide produced an image.
    pub fn is_total_failure(&self) -> bool {
        self.successful == 0
    }

    pub fn task(&self, index: u32) -> Option<&GenerationTaskResult> {
        self.per_task.iter().find(|t| t.index == index)
    }

    pub fn failures(&self) -> impl Iterator<Item = &GenerationTaskResult> {
        self.per_task.iter().filter(|t| !t.is_success())
    }

    pub fn artifact_paths(&self) -> Vec<&PathBuf> {
        self.per_task
            .iter()
            .filter_map(|t| t.artifact_path.as_ref())
            .collect()
    }
}
