use serde::{Deserialize, Serialize};

/// Where an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Sheet,
    Text,
}

impl InputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMode::Sheet => "sheet",
            InputMode::Text => "text",
        }
    }
}

/// One unit of work: a spreadsheet row or a free-text submission.
///
/// Immutable once created by its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItem {
    pub id: String,
    /// Text the pipeline works from.
    pub content: String,
    pub category: String,
    pub theme: String,
    pub virality: Option<String>,
    pub engagement: Option<String>,
    pub url: Option<String>,
    pub posted_date: Option<String>,
    /// Unedited text when `content` is a rewrite.
    pub original_text: Option<String>,
    pub mode: InputMode,
}

impl PendingItem {
    pub fn new(id: impl Into<String>, content: impl Into<String>, mode: InputMode) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            category: String::new(),
            theme: String::new(),
            virality: None,
            engagement: None,
            url: None,
            posted_date: None,
            original_text: None,
            mode,
        }
    }

    pub fn with_tags(mut self, category: impl Into<String>, theme: impl Into<String>) -> Self {
        self.category = category.into();
        self.theme = theme.into();
        self
    }

    /// First `max_chars` characters of the content.
    pub fn preview(&self, max_chars: usize) -> String {
        self.content.chars().take(max_chars).collect()
    }
}

/// ANALYZE output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentAnalysis {
    pub topic: String,
    pub tone: String,
    pub is_story: bool,
}

/// DIRECT output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreativeBrief {
    /// `narrative` or `independent`.
    pub carousel_style: String,
    pub art_style: String,
    /// Hex codes such as `#F7CAC9`.
    pub colors: Vec<String>,
    pub text_placement: String,
    pub reasoning: String,
}

/// WRITE_COPY output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyContent {
    pub post_title: String,
    pub image_texts: Vec<String>,
    pub post_caption: String,
    pub hashtags: Vec<String>,
}
