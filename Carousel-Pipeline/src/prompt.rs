/// Replace `{key}` placeholders with values. Unknown placeholders are left
/// as they are.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }
    rendered
}

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

pub const ANALYZE_TEMPLATE: &str = r#"You are a content analysis expert specializing in viral social media content.

Analyze this post:
{content}

Extract ONLY:
1. Topic (1-3 words)
2. Tone (1-2 words: romantic, educational, humorous, etc.)
3. Is it narrative or list-based?

Output simple JSON:
{"topic": "...", "tone": "...", "is_story": true}"#;

pub const DIRECT_TEMPLATE: &str = r##"You are a senior creative director creating viral Instagram carousels.

Based on this analysis: {analysis}

Decide:
1. CAROUSEL STYLE: "narrative" (one story across {image_count} slides) or "independent" (standalone thematic slides)
2. ART STYLE: photography, digital art or illustration (pick ONE, describe briefly)
3. COLORS: 2-3 hex codes
4. TEXT PLACEMENT: top, center or bottom
5. REASONING: one sentence
{style_note}
Output a concise JSON brief:
{"carousel_style": "narrative", "art_style": "...", "colors": ["#hex1", "#hex2"], "text_placement": "center", "reasoning": "..."}"##;

pub const STYLE_REFERENCE_NOTE: &str = "A style reference image is attached to every image request. The art style comes from that image: set art_style to \"from reference image\" and keep colors neutral.\n";

pub const COPY_TEMPLATE: &str = r##"You are an expert social media copywriter.

Based on:
- Analysis: {analysis}
- Creative direction: {brief}

Generate:
1. POST TITLE (3-5 words)
2. IMAGE TEXT: exactly {image_count} entries, one per slide, {text_rule}
3. POST CAPTION (100-200 chars): hook, call to action
4. HASHTAGS: 3 tags

Output compact JSON only:
{"post_title": "...", "image_texts": ["..."], "post_caption": "...", "hashtags": ["#tag1", "#tag2", "#tag3"]}"##;

pub const SHORT_TEXT_RULE: &str = "1-2 punchy words each";
pub const FLEXIBLE_TEXT_RULE: &str = "short phrases taken from the submitted text";

pub const PROMPTS_TEMPLATE: &str = r#"Output ONLY a JSON array. No explanations.

Creative brief: {brief}
Copy: {copy}

Write {image_count} image prompts, one per image text, in order:
- Start every prompt with "Create {art_style},"
- Then: large text '[IMAGE TEXT]' centered prominently, same font on every slide
- Then: a detailed scene with emotional and symbolic elements, composition, lighting and mood
- Describe colors with natural names, never hex codes
- End with "4K quality"
- 80-100 tokens per prompt
{persona_note}
Format:
[{"i": 1, "t": "TEXT1", "p": "Create ..."}]"#;

pub const PERSONA_NOTE: &str = "A persona reference image is attached. Every scene features that person as the main subject.\n";
