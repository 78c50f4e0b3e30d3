use image_batch_runner::ReferenceAssetSet;

use crate::error::{PipelineError, Result};
use crate::source::SelectionStrategy;

/// Most slides a carousel may have.
pub const MAX_IMAGE_COUNT: usize = 20;

/// Settings for [`SequentialPostPipeline`](crate::SequentialPostPipeline)
/// and [`BatchPostLoop`](crate::BatchPostLoop).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Slides per carousel.
    pub image_count: usize,
    /// Items processed per run. `None` processes everything selected.
    pub max_items_per_run: Option<usize>,
    pub selection: SelectionStrategy,
    /// Appended to every image prompt when no style reference is attached.
    pub style_suffix: Option<String>,
    pub references: Option<ReferenceAssetSet>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_count: 10,
            max_items_per_run: Some(1),
            selection: SelectionStrategy::Random,
            style_suffix: None,
            references: None,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_count == 0 || self.image_count > MAX_IMAGE_COUNT {
            return Err(PipelineError::InvalidConfig(format!(
                "image count must be between 1 and {}, got {}",
                MAX_IMAGE_COUNT, self.image_count
            )));
        }
        if self.max_items_per_run == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "max items per run must be at least 1 (use unlimited instead of 0)".to_string(),
            ));
        }
        if let Some(refs) = &self.references {
            refs.validate()
                .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }

    pub fn has_style_reference(&self) -> bool {
        self.references.as_ref().is_some_and(|r| r.has_style())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn with_image_count(mut self, count: usize) -> Self {
        self.config.image_count = count;
        self
    }

    pub fn with_max_items_per_run(mut self, max: usize) -> Self {
        self.config.max_items_per_run = Some(max);
        self
    }

    /// Process every selected item.
    pub fn unlimited(mut self) -> Self {
        self.config.max_items_per_run = None;
        self
    }

    pub fn with_selection(mut self, selection: SelectionStrategy) -> Self {
        self.config.selection = selection;
        self
    }

    /// Empty or whitespace-only suffixes are ignored.
    pub fn with_style_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.config.style_suffix = if suffix.trim().is_empty() {
            None
        } else {
            Some(suffix)
        };
        self
    }

    pub fn with_references(mut self, references: ReferenceAssetSet) -> Self {
        self.config.references = if references.is_empty() {
            None
        } else {
            Some(references)
        };
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
