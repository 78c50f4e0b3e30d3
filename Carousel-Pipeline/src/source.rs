use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use reqwest::Client;

use crate::error::{PipelineError, Result};
use crate::types::{InputMode, PendingItem};

/// Produces the pending items for a run.
pub trait ItemSource: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<Vec<PendingItem>>> + Send;
}

/// Which of the loaded items a run works on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionStrategy {
    First,
    #[default]
    Random,
    All,
}

impl SelectionStrategy {
    pub fn apply(self, mut items: Vec<PendingItem>) -> Vec<PendingItem> {
        if items.is_empty() {
            return items;
        }
        match self {
            SelectionStrategy::All => items,
            SelectionStrategy::First => {
                items.truncate(1);
                items
            }
            SelectionStrategy::Random => {
                let pick = rand::rng().random_range(0..items.len());
                vec![items.swap_remove(pick)]
            }
        }
    }
}

impl FromStr for SelectionStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(SelectionStrategy::First),
            "random" => Ok(SelectionStrategy::Random),
            "all" => Ok(SelectionStrategy::All),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown selection strategy '{}' (expected first, random or all)",
                other
            ))),
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionStrategy::First => "first",
            SelectionStrategy::Random => "random",
            SelectionStrategy::All => "all",
        };
        f.write_str(name)
    }
}

/// Accepted values for the two quality-tag columns. An empty list accepts
/// every row.
#[derive(Debug, Clone, Default)]
pub struct SheetFilters {
    pub virality: Vec<String>,
    pub engagement: Vec<String>,
}

impl SheetFilters {
    pub fn new(virality: Vec<String>, engagement: Vec<String>) -> Self {
        Self {
            virality,
            engagement,
        }
    }

    /// Split a comma-separated list such as `VIRUS,BEST,GOOD`.
    pub fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn accepts(allowed: &[String], value: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(value) = value.map(str::trim) else {
        return false;
    };
    allowed.iter().any(|a| a.trim().eq_ignore_ascii_case(value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Url,
    PostedDate,
    Category,
    Theme,
    Virality,
    Engagement,
    Original,
    Rewritten,
}

fn column_for(header: &str) -> Option<Column> {
    let name = header.trim().to_ascii_lowercase().replace(['-', '_'], " ");
    let column = match name.as_str() {
        "url" | "link" => Column::Url,
        "posted date" | "date" => Column::PostedDate,
        "category" => Column::Category,
        "theme" => Column::Theme,
        "virality" => Column::Virality,
        "engagement" => Column::Engagement,
        "original script" | "original text" | "original" => Column::Original,
        "rewrited script" | "rewritten script" | "rewritten text" | "rewritten" => Column::Rewritten,
        _ => return None,
    };
    Some(column)
}

/// Parse a sheet CSV export into pending items.
///
/// A tag filter only applies when its column exists. Rows with neither
/// rewritten nor original text are skipped. Ids are `post_{n}_{stamp}` with
/// `n` counting kept rows from zero.
pub fn parse_sheet_csv(body: &str, filters: &SheetFilters, stamp: &str) -> Result<Vec<PendingItem>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let columns: HashMap<Column, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .filter_map(|(idx, h)| column_for(h).map(|c| (c, idx)))
        .collect();

    let mut items = Vec::new();
    let mut total = 0usize;
    for record in reader.records() {
        let record = record?;
        total += 1;
        let field = |c: Column| {
            columns
                .get(&c)
                .and_then(|&idx| record.get(idx))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let virality = field(Column::Virality);
        let engagement = field(Column::Engagement);
        if columns.contains_key(&Column::Virality) && !accepts(&filters.virality, virality.as_deref()) {
            continue;
        }
        if columns.contains_key(&Column::Engagement)
            && !accepts(&filters.engagement, engagement.as_deref())
        {
            continue;
        }

        let original = field(Column::Original);
        let Some(content) = field(Column::Rewritten).or_else(|| original.clone()) else {
            continue;
        };

        let id = format!("post_{}_{}", items.len(), stamp);
        items.push(PendingItem {
            id,
            content,
            category: field(Column::Category).unwrap_or_default(),
            theme: field(Column::Theme).unwrap_or_default(),
            virality,
            engagement,
            url: field(Column::Url),
            posted_date: field(Column::PostedDate),
            original_text: original,
            mode: InputMode::Sheet,
        });
    }

    tracing::info!(total_rows = total, qualifying = items.len(), "Parsed sheet export");
    Ok(items)
}

/// Local timestamp used in item ids.
pub fn id_stamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Rows of a public Google Sheet tab, fetched as CSV.
#[derive(Debug, Clone)]
pub struct SheetSource {
    http: Client,
    sheet_id: String,
    gid: String,
    filters: SheetFilters,
    timeout: Duration,
}

impl SheetSource {
    pub fn new(sheet_id: impl Into<String>, gid: impl Into<String>, filters: SheetFilters) -> Self {
        Self {
            http: Client::new(),
            sheet_id: sheet_id.into(),
            gid: gid.into(),
            filters,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn export_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/export?format=csv&gid={}",
            self.sheet_id, self.gid
        )
    }
}

impl ItemSource for SheetSource {
    async fn load(&self) -> Result<Vec<PendingItem>> {
        if self.sheet_id.trim().is_empty() {
            return Err(PipelineError::MissingInput("sheet id".to_string()));
        }
        let url = self.export_url();
        tracing::info!(sheet_id = %self.sheet_id, gid = %self.gid, "Fetching sheet export");

        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PipelineError::Source(format!("Failed to fetch {}: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Source(format!(
                "Sheet export returned HTTP {}",
                resp.status()
            )));
        }
        let body = resp.text().await?;
        parse_sheet_csv(&body, &self.filters, &id_stamp())
    }
}

/// A single free-text submission.
#[derive(Debug, Clone)]
pub struct TextSource {
    text: String,
}

impl TextSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn item(&self) -> Result<PendingItem> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(PipelineError::MissingInput("text input is empty".to_string()));
        }
        Ok(
            PendingItem::new(format!("text_{}", id_stamp()), text, InputMode::Text)
                .with_tags("user_input", "user_input"),
        )
    }
}

impl ItemSource for TextSource {
    async fn load(&self) -> Result<Vec<PendingItem>> {
        Ok(vec![self.item()?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "\
url,posted date,category,theme,VIRALITY,ENGAGEMENT,original_script,rewrited_script
https://a,2024-01-01,love,romance,VIRUS,BEST ER,orig a,rewrite a
https://b,2024-01-02,zodiac,signs,MEH,BEST ER,orig b,rewrite b
https://c,2024-01-03,growth,habits,good,viral er,orig c,
https://d,2024-01-04,misc,misc,BEST,LOW ER,orig d,rewrite d
https://e,2024-01-05,empty,empty,BEST,VIRAL ER,,
";

    fn default_filters() -> SheetFilters {
        SheetFilters::new(
            SheetFilters::parse_list("VIRUS,BEST,GOOD"),
            SheetFilters::parse_list("BEST ER,VIRAL ER"),
        )
    }

    #[test]
    fn test_parse_filters_rows() {
        let items = parse_sheet_csv(SHEET, &default_filters(), "20250101_120000").unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].id, "post_0_20250101_120000");
        assert_eq!(items[0].content, "rewrite a");
        assert_eq!(items[0].category, "love");
        assert_eq!(items[0].url.as_deref(), Some("https://a"));
        assert_eq!(items[0].posted_date.as_deref(), Some("2024-01-01"));
        assert_eq!(items[0].original_text.as_deref(), Some("orig a"));

        // Falls back to the original text, filters are case-insensitive.
        assert_eq!(items[1].id, "post_1_20250101_120000");
        assert_eq!(items[1].content, "orig c");
    }

    #[test]
    fn test_filters_that_match_nothing() {
        let filters = SheetFilters::new(vec!["NONE".into()], vec![]);
        let items = parse_sheet_csv(SHEET, &filters, "x").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_empty_filters_accept_all_with_content() {
        let items = parse_sheet_csv(SHEET, &SheetFilters::default(), "x").unwrap();
        assert_eq!(items.len(), 4);
    }

    #[test]
    fn test_missing_tag_columns_skip_filtering() {
        let body = "category,rewrited_script\nlove,hello\n";
        let items = parse_sheet_csv(body, &default_filters(), "x").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "hello");
    }

    #[test]
    fn test_header_aliases() {
        assert_eq!(column_for(" Posted_Date "), Some(Column::PostedDate));
        assert_eq!(column_for("Rewritten Script"), Some(Column::Rewritten));
        assert_eq!(column_for("views"), None);
    }

    #[test]
    fn test_export_url() {
        let source = SheetSource::new("abc", "904285398", SheetFilters::default());
        assert_eq!(
            source.export_url(),
            "https://docs.google.com/spreadsheets/d/abc/export?format=csv&gid=904285398"
        );
    }

    #[test]
    fn test_text_source() {
        let item = TextSource::new("  my story  ").item().unwrap();
        assert!(item.id.starts_with("text_"));
        assert_eq!(item.content, "my story");
        assert_eq!(item.category, "user_input");
        assert_eq!(item.mode, InputMode::Text);

        assert!(matches!(
            TextSource::new("   ").item(),
            Err(PipelineError::MissingInput(_))
        ));
    }

    #[test]
    fn test_selection_strategies() {
        let items: Vec<_> = (0..5)
            .map(|i| PendingItem::new(format!("post_{}", i), "c", InputMode::Sheet))
            .collect();

        assert_eq!(SelectionStrategy::All.apply(items.clone()).len(), 5);
        let first = SelectionStrategy::First.apply(items.clone());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "post_0");
        let random = SelectionStrategy::Random.apply(items.clone());
        assert_eq!(random.len(), 1);
        assert!(items.contains(&random[0]));
        assert!(SelectionStrategy::Random.apply(Vec::new()).is_empty());
    }

    #[test]
    fn test_selection_from_str() {
        assert_eq!("ALL".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::All);
        assert_eq!(SelectionStrategy::First.to_string(), "first");
        assert!("some".parse::<SelectionStrategy>().is_err());
    }
}
