use image_batch_runner::GenerationPrompt;
use regex::Regex;

use crate::types::CreativeBrief;

const COLOR_NAMES: &[(&str, &str)] = &[
    ("#FF0000", "bright red"),
    ("#8B0000", "deep crimson red"),
    ("#DC143C", "vibrant crimson"),
    ("#FFC0CB", "soft pink"),
    ("#FFB5B5", "light coral pink"),
    ("#F7A8B7", "soft rose pink"),
    ("#F7CAC9", "pale blush pink"),
    ("#FF8C00", "burning amber orange"),
    ("#FFA500", "warm orange"),
    ("#FFD700", "bright golden yellow"),
    ("#FFE5EC", "soft blush pink"),
    ("#FFD4B2", "peachy cream"),
    ("#FFC7B2", "peachy coral"),
    ("#FFE0B5", "delicate cream"),
    ("#FDF0D5", "warm cream"),
    ("#F0EAD6", "soft cream"),
    ("#E8D5B5", "warm beige"),
    ("#D6AE8D", "warm sandy beige"),
    ("#8C5E58", "dusty rose brown"),
    ("#A56A6A", "muted mauve brown"),
    ("#E0BBE4", "pale lavender"),
    ("#957DAD", "muted purple"),
    ("#E5D4ED", "warm lavender"),
    ("#B0656F", "dusty mauve"),
    ("#4A3C4D", "deep plum"),
    ("#A9DEF9", "soft sky blue"),
    ("#B6CBE0", "pale blue"),
    ("#D0F4DE", "soft mint green"),
    ("#F3D7D7", "pale dusty rose"),
];

/// Describe a hex color in words, e.g. `#F0EAD6` → `soft cream`.
///
/// Known colors come from a fixed table; anything else is guessed from its
/// brightness and dominant channel. Unparseable input gives `neutral`.
pub fn hex_to_natural_color(hex: &str) -> String {
    let code = hex.trim().to_ascii_uppercase();
    if let Some((_, name)) = COLOR_NAMES.iter().find(|(k, _)| *k == code) {
        return (*name).to_string();
    }

    let digits = code.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .map(u32::from)
    };
    let (Some(r), Some(g), Some(b)) = (channel(0..2), channel(2..4), channel(4..6)) else {
        tracing::warn!(hex, "Could not parse color");
        return "neutral".to_string();
    };

    let brightness = (r + g + b) as f64 / 3.0;
    let prefix = if brightness > 200.0 {
        "pale"
    } else if brightness > 150.0 {
        "soft"
    } else if brightness > 100.0 {
        "muted"
    } else {
        "deep"
    };

    let hue = if r > g && r > b {
        if g > b {
            "coral"
        } else {
            "rose"
        }
    } else if g > r && g > b {
        "green"
    } else if b > r && b > g {
        "blue"
    } else if r > 150 && g > 150 {
        "cream"
    } else {
        "neutral"
    };
    format!("{} {}", prefix, hue)
}

/// What [`format_prompts`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    /// Art style enforced and colors renamed.
    Formatted { art_style: String, colors: usize },
    /// A style reference controls the look; prompts untouched.
    StyleReference,
    /// The brief has no usable art style; prompts untouched.
    NoArtStyle,
}

/// Normalize engineered prompts against the creative brief.
///
/// With a style reference the prompts pass through. Otherwise every brief
/// color is replaced by its natural name and each prompt is forced to open
/// with `Create {art_style},`.
pub fn format_prompts(
    prompts: &mut [GenerationPrompt],
    brief: Option<&CreativeBrief>,
    has_style_reference: bool,
) -> FormatOutcome {
    if has_style_reference {
        tracing::info!(prompts = prompts.len(), "Style reference attached, prompts passed through");
        return FormatOutcome::StyleReference;
    }

    let Some(brief) = brief.filter(|b| !b.art_style.trim().is_empty()) else {
        tracing::warn!("No art style in creative brief, prompts passed through");
        return FormatOutcome::NoArtStyle;
    };
    let art_style = brief.art_style.trim();

    let colors: Vec<(&str, String)> = brief
        .colors
        .iter()
        .map(|c| (c.trim(), hex_to_natural_color(c)))
        .filter(|(c, _)| !c.is_empty())
        .collect();
    let prefix = Regex::new(r"(?i)^Create\s+[^,]+,").ok();
    let replacement = format!("Create {},", art_style);

    for prompt in prompts.iter_mut() {
        let mut text = prompt.prompt_text.clone();
        for (hex, name) in &colors {
            text = text.replace(hex, name);
        }
        text = if text.trim_start().to_ascii_lowercase().starts_with("create") {
            match &prefix {
                Some(re) => re
                    .replace(text.trim_start(), regex::NoExpand(&replacement))
                    .into_owned(),
                None => text,
            }
        } else {
            format!("Create {}, {}", art_style, text)
        };
        prompt.prompt_text = text;
    }

    tracing::info!(
        prompts = prompts.len(),
        art_style,
        colors = colors.len(),
        "Formatted prompts"
    );
    FormatOutcome::Formatted {
        art_style: art_style.to_string(),
        colors: colors.len(),
    }
}
