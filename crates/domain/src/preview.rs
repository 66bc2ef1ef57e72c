//! Preview generation for denied requests.
//!
//! Two built-in strategies: paragraph truncation for prose, and
//! first-N-segments for slide decks. The classifier that picks between
//! them is deliberately explicit and its thresholds are named constants —
//! they are policy, not magic.

use regex::Regex;
use std::sync::LazyLock;

/// Slide decks are markdown files split by `---` horizontal rules; a file
/// with at least this many separators is a slide-deck candidate.
pub const SLIDE_SEPARATOR_MIN: usize = 3;

/// ...and its segments must be short on average (characters) to actually
/// classify as slides rather than an essay that likes section breaks.
pub const SLIDE_AVG_SEGMENT_MAX: usize = 500;

/// Block elements kept by the prose preview.
pub const PREVIEW_PARAGRAPHS: usize = 3;

/// Segments kept by the slide preview.
pub const PREVIEW_SLIDES: usize = 3;

const SLIDE_SEPARATOR: &str = "\n---\n";

/// What kind of content a markdown body looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentShape {
    Prose,
    SlideDeck,
}

/// Classify a markdown body so the right preview strategy can be applied.
pub fn classify_content(markdown: &str) -> ContentShape {
    let separators = markdown.matches(SLIDE_SEPARATOR).count();
    if separators >= SLIDE_SEPARATOR_MIN {
        let segments: Vec<&str> = markdown.split(SLIDE_SEPARATOR).collect();
        let total: usize = segments.iter().map(|s| s.len()).sum();
        let avg = total / segments.len().max(1);
        if avg < SLIDE_AVG_SEGMENT_MAX {
            return ContentShape::SlideDeck;
        }
    }
    ContentShape::Prose
}

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script.*?</script>").unwrap());

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<(?:p|div|h[1-6]|table|ul|ol|blockquote|pre)\b[^>]*>.*?</(?:p|div|h[1-6]|table|ul|ol|blockquote|pre)>",
    )
    .unwrap()
});

/// Prose preview: the first `max_blocks` block elements of the rendered
/// HTML, scripts stripped, an ellipsis paragraph appended when anything was
/// cut. `None` when there is nothing to show.
pub fn truncate_html_blocks(html: &str, max_blocks: usize) -> Option<String> {
    let cleaned = SCRIPT_RE.replace_all(html, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let blocks: Vec<&str> = BLOCK_RE.find_iter(cleaned).map(|m| m.as_str()).collect();
    if blocks.is_empty() {
        // No recognizable block structure; show the whole thing.
        return Some(cleaned.to_string());
    }

    let count = max_blocks.max(1);
    let truncated = blocks
        .iter()
        .take(count)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");

    if blocks.len() > count {
        Some(format!("{truncated}\n<p>…</p>"))
    } else {
        Some(truncated)
    }
}

/// Slide preview: the first `max_slides` segments, separators preserved.
/// A body with no separators is returned whole.
pub fn slide_preview(markdown: &str, max_slides: usize) -> String {
    let segments: Vec<&str> = markdown.split(SLIDE_SEPARATOR).collect();
    if segments.len() <= 1 {
        return markdown.to_string();
    }
    segments
        .into_iter()
        .take(max_slides.max(1))
        .collect::<Vec<_>>()
        .join(SLIDE_SEPARATOR)
}
