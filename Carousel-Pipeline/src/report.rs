use std::fmt::Write;

use crate::context::ItemState;
use crate::extract::StageText;
use crate::prompt::numbered_list;
use crate::types::{CopyContent, CreativeBrief};

const RULE: &str = "\n---\n\n";

fn or_na(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}

/// Raw model output, fenced, for stages whose JSON could not be recovered.
fn raw_block(out: &mut String, label: &str, stage: &StageText) {
    let _ = write!(out, "_Unparsed {} output:_\n\n```\n{}\n```\n", label, stage.raw.trim());
}

/// Title for the report and index line.
pub fn post_title(state: &ItemState) -> String {
    state
        .copy
        .as_ref()
        .and_then(|c| c.parse_as::<CopyContent>())
        .map(|c| c.post_title)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Untitled Post".to_string())
}

/// Markdown report for one processed item.
pub fn render_report(state: &ItemState, generated_at: &str) -> String {
    let item = &state.item;
    let copy = state.copy.as_ref().and_then(|c| c.parse_as::<CopyContent>());
    let brief = state.brief.as_ref().and_then(|b| b.parse_as::<CreativeBrief>());

    let mut out = String::new();
    let _ = write!(
        out,
        "# {}\n\n**Post ID:** {}  \n**Category:** {}  \n**Theme:** {}  \n**Generated:** {}\n",
        post_title(state),
        item.id,
        or_na(&item.category),
        or_na(&item.theme),
        generated_at
    );

    out.push_str(RULE);
    out.push_str("## Caption\n\n");
    match (&copy, &state.copy) {
        (Some(c), _) => {
            let _ = writeln!(out, "{}", or_na(&c.post_caption));
        }
        (None, Some(raw)) => raw_block(&mut out, "copy", raw),
        (None, None) => out.push_str("No caption\n"),
    }

    out.push_str(RULE);
    out.push_str("## Hashtags\n\n");
    let _ = writeln!(
        out,
        "{}",
        copy.as_ref().map(|c| c.hashtags.join(" ")).unwrap_or_default()
    );

    out.push_str(RULE);
    out.push_str("## Image Texts (Carousel Slides)\n\n");
    if let Some(c) = &copy {
        let bold: Vec<String> = c.image_texts.iter().map(|t| format!("**{}**", t)).collect();
        let _ = writeln!(out, "{}", numbered_list(&bold));
    }

    out.push_str(RULE);
    out.push_str("## Creative Direction\n\n");
    match (&brief, &state.brief) {
        (Some(b), _) => {
            let _ = write!(
                out,
                "**Carousel Style:** {}  \n**Art Style:** {}  \n**Colors:** {}  \n**Text Placement:** {}\n\n**Reasoning:** {}\n",
                or_na(&b.carousel_style),
                or_na(&b.art_style),
                b.colors.join(", "),
                or_na(&b.text_placement),
                or_na(&b.reasoning)
            );
        }
        (None, Some(raw)) => raw_block(&mut out, "creative brief", raw),
        (None, None) => out.push_str("N/A\n"),
    }
    if state.has_style_reference() {
        out.push_str("\n_Style taken from the attached reference image._\n");
    }

    out.push_str(RULE);
    out.push_str("## Image Generation Results\n\n");
    match &state.batch {
        Some(batch) => {
            let _ = write!(
                out,
                "**Total:** {}  \n**Successful:** {}  \n**Failed:** {}\n",
                batch.total, batch.successful, batch.failed
            );
            let failures: Vec<_> = batch.failures().collect();
            if !failures.is_empty() {
                out.push_str("\n**Failed slides:**\n\n");
                for task in failures {
                    let _ = writeln!(
                        out,
                        "- Slide {}: {}",
                        task.index,
                        task.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
        None => out.push_str("0 images generated.\n"),
    }
    if let Some((stage, error)) = &state.failure {
        let _ = write!(out, "\n**Error in {}:** {}\n", stage, error);
    }

    out.push_str(RULE);
    out.push_str("## Image Generation Prompts\n\n");
    if state.prompts.is_empty() {
        match &state.raw_prompts {
            Some(raw) if !raw.trim().is_empty() => {
                let _ = write!(out, "_Unparsed prompt output:_\n\n```\n{}\n```\n", raw.trim());
            }
            _ => out.push_str("No prompts.\n"),
        }
    }
    for prompt in &state.prompts {
        let _ = write!(
            out,
            "### Slide {}: {}\n\n```\n{}\n```\n\n",
            prompt.index, prompt.label, prompt.prompt_text
        );
    }

    out.push_str(RULE);
    out.push_str("## Original Post Data\n\n");
    let _ = write!(
        out,
        "**Virality:** {}  \n**Engagement:** {}  \n**URL:** {}\n\n**Original Content:**\n```\n{}\n```\n",
        item.virality.as_deref().unwrap_or("N/A"),
        item.engagement.as_deref().unwrap_or("N/A"),
        item.url.as_deref().unwrap_or("N/A"),
        item.original_text.as_deref().unwrap_or(&item.content)
    );
    out
}

/// One line for the run-wide index.
pub fn index_line(state: &ItemState, generated_at: &str) -> String {
    let id = &state.item.id;
    let (ok, total) = state
        .batch
        .as_ref()
        .map_or((0, state.prompts.len()), |b| (b.successful, b.total));
    format!(
        "- [{}]({}/{}_content.md) - {}/{} images - {}",
        post_title(state),
        id,
        id,
        ok,
        total,
        generated_at
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InputMode, PendingItem};
    use image_batch_runner::{BatchResult, GenerationPrompt, GenerationTaskResult};
    use std::path::PathBuf;

    fn state() -> ItemState {
        let item = PendingItem::new("post_0_x", "the content", InputMode::Sheet)
            .with_tags("love", "romance");
        ItemState::new(item, None)
    }

    #[test]
    fn test_full_report() {
        let mut s = state();
        s.copy = Some(StageText::from_raw(
            r##"{"post_title": "Love Notes", "image_texts": ["HOPE", "TRUST"], "post_caption": "Read this.", "hashtags": ["#love", "#life"]}"##,
        ));
        s.brief = Some(StageText::from_raw(
            r##"```json
{"carousel_style": "narrative", "art_style": "watercolor", "colors": ["#FFFFFF"], "text_placement": "center", "reasoning": "Soft."}
```"##,
        ));
        s.prompts = vec![
            GenerationPrompt::new(1, "HOPE", "Create watercolor, hope"),
            GenerationPrompt::new(2, "TRUST", "Create watercolor, trust"),
        ];
        s.batch = Some(BatchResult::from_tasks(
            "post_0_x",
            vec![
                GenerationTaskResult::success(1, "HOPE", PathBuf::from("a.png"), 3),
                GenerationTaskResult::failure(2, "TRUST", "No candidates in response".into()),
            ],
            10,
        ));

        let md = render_report(&s, "2025-01-01 12:00:00");
        assert!(md.starts_with("# Love Notes\n"));
        assert!(md.contains("**Category:** love"));
        assert!(md.contains("Read this."));
        assert!(md.contains("#love #life"));
        assert!(md.contains("1. **HOPE**\n2. **TRUST**"));
        assert!(md.contains("**Art Style:** watercolor"));
        assert!(md.contains("**Successful:** 1"));
        assert!(md.contains("- Slide 2: No candidates in response"));
        assert!(md.contains("### Slide 1: HOPE\n\n```\nCreate watercolor, hope\n```"));
        assert!(md.contains("the content"));

        assert_eq!(
            index_line(&s, "t"),
            "- [Love Notes](post_0_x/post_0_x_content.md) - 1/2 images - t"
        );
    }

    #[test]
    fn test_failed_item_report() {
        let mut s = state();
        s.brief = Some(StageText::from_raw("I think watercolor would be lovely"));
        s.raw_prompts = Some("no json, sorry".into());
        s.failure = Some(("generate_images".into(), "No image prompts to generate".into()));

        let md = render_report(&s, "now");
        assert!(md.starts_with("# Untitled Post\n"));
        assert!(md.contains("0 images generated."));
        assert!(md.contains("**Error in generate_images:** No image prompts to generate"));
        assert!(md.contains("I think watercolor would be lovely"));
        assert!(md.contains("no json, sorry"));
        assert!(index_line(&s, "now").contains("0/0 images"));
    }
}
