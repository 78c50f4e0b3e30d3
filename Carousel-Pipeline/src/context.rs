use std::path::PathBuf;

use image_batch_runner::{BatchResult, GenerationPrompt, ReferenceAssetSet};
use serde::Serialize;

use crate::extract::StageText;
use crate::types::PendingItem;

/// Counters that survive across items for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounters {
    /// Position of the next pending item to select.
    pub next_index: usize,
    pub items_processed: usize,
    pub items_succeeded: usize,
    pub items_failed: usize,
    pub images_successful: usize,
    pub images_failed: usize,
}

/// Counters reset at the end of every item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EphemeralCounters {
    pub images_generated: usize,
    pub text_calls: usize,
}

/// Everything the stages know about the current item.
#[derive(Debug, Clone)]
pub struct ItemState {
    pub item: PendingItem,
    pub references: Option<ReferenceAssetSet>,
    pub analysis: Option<StageText>,
    pub brief: Option<StageText>,
    pub copy: Option<StageText>,
    /// ENGINEER_PROMPTS output as the model returned it.
    pub raw_prompts: Option<String>,
    pub prompts: Vec<GenerationPrompt>,
    pub batch: Option<BatchResult>,
    pub report_path: Option<PathBuf>,
    /// Stage that ended this item early, with its error.
    pub failure: Option<(String, String)>,
}

impl ItemState {
    pub fn new(item: PendingItem, references: Option<ReferenceAssetSet>) -> Self {
        Self {
            item,
            references,
            analysis: None,
            brief: None,
            copy: None,
            raw_prompts: None,
            prompts: Vec::new(),
            batch: None,
            report_path: None,
            failure: None,
        }
    }

    pub fn has_style_reference(&self) -> bool {
        self.references.as_ref().is_some_and(|r| r.has_style())
    }

    pub fn has_persona_reference(&self) -> bool {
        self.references.as_ref().is_some_and(|r| r.has_persona())
    }

    /// Names of the item-scoped keys currently set.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = vec!["current_item"];
        let optional = [
            ("references", self.references.is_some()),
            ("analysis", self.analysis.is_some()),
            ("brief", self.brief.is_some()),
            ("copy", self.copy.is_some()),
            ("raw_prompts", self.raw_prompts.is_some()),
            ("prompts", !self.prompts.is_empty()),
            ("batch", self.batch.is_some()),
            ("report_path", self.report_path.is_some()),
            ("failure", self.failure.is_some()),
        ];
        keys.extend(optional.into_iter().filter(|(_, set)| *set).map(|(k, _)| k));
        keys
    }
}

/// State shared by the stages of a run.
///
/// Holds the pending items, the run-wide counters, at most one current
/// item's state, and per-item ephemeral counters. Stages borrow it mutably
/// one at a time.
#[derive(Debug, Default)]
pub struct PipelineContext {
    pending: Vec<PendingItem>,
    pub counters: RunCounters,
    pub ephemeral: EphemeralCounters,
    current: Option<ItemState>,
}

impl PipelineContext {
    pub fn new(pending: Vec<PendingItem>) -> Self {
        Self {
            pending,
            ..Default::default()
        }
    }

    pub fn pending(&self) -> &[PendingItem] {
        &self.pending
    }

    pub fn remaining(&self) -> usize {
        self.pending.len().saturating_sub(self.counters.next_index)
    }

    /// Move the next pending item into the current slot.
    ///
    /// Returns `false` when nothing is left. Any previous item state is
    /// replaced.
    pub fn select_next(&mut self, references: Option<ReferenceAssetSet>) -> bool {
        let Some(item) = self.pending.get(self.counters.next_index).cloned() else {
            return false;
        };
        self.counters.next_index += 1;
        self.current = Some(ItemState::new(item, references));
        true
    }

    pub fn current(&self) -> Option<&ItemState> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut ItemState> {
        self.current.as_mut()
    }

    /// Number of item-scoped keys set; zero after [`clear`](Self::clear).
    pub fn item_scoped_key_count(&self) -> usize {
        self.current.as_ref().map_or(0, |s| s.keys().len())
    }

    /// Drop all item-scoped state and reset ephemeral counters.
    ///
    /// Run counters are untouched. Calling it again is a no-op.
    pub fn clear(&mut self) -> Vec<&'static str> {
        let cleared = self.current.take().map(|s| s.keys()).unwrap_or_default();
        self.ephemeral = EphemeralCounters::default();
        cleared
    }
}
