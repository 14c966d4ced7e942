use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Selector};
use thiserror::Error;

use super::time;
use crate::config::ExtractorConfig;
use crate::dom;
use crate::models::{BookInfo, NoteRecord, NoteType};

const ID_ATTRS: &[&str] = &["data-id", "id", "data-note-id"];

/// Quote blocks shorter than this are labels, not quoted text.
const MIN_QUOTE_CHARS: usize = 10;

const PALETTE: [(&str, &str); 5] = [
    ("yellow", "#FFEB3B"),
    ("green", "#4CAF50"),
    ("blue", "#2196F3"),
    ("red", "#F44336"),
    ("orange", "#FF9800"),
];

/// CSS named-colour prefixes that still denote the base colour (`lightblue`).
const SHADE_PREFIXES: [&str; 2] = ["light", "dark"];

struct TypeRule {
    note_type: NoteType,
    keywords: &'static [&'static str],
}

const TYPE_RULES: [TypeRule; 3] = [
    TypeRule { note_type: NoteType::Highlight, keywords: &["highlight", "高亮", "划线"] },
    TypeRule { note_type: NoteType::Thought, keywords: &["thought", "review", "想法", "点评"] },
    TypeRule { note_type: NoteType::Bookmark, keywords: &["bookmark", "书签"] },
];

/// One way of reading a field out of a note element.
enum FieldStrategy {
    /// Text of the first descendant matching the selector.
    Child(Selector),
    /// First quote-styled descendant with enough text.
    QuoteBlock,
    /// Timestamp found anywhere in the element's own text.
    TimeInText,
}

impl FieldStrategy {
    fn apply(&self, el: ElementRef) -> Option<String> {
        match self {
            FieldStrategy::Child(sel) => el
                .select(sel)
                .next()
                .map(dom::trimmed_text)
                .filter(|t| !t.is_empty()),
            FieldStrategy::QuoteBlock => el
                .select(&QUOTE_BLOCK)
                .map(dom::trimmed_text)
                .find(|t| t.chars().count() > MIN_QUOTE_CHARS),
            FieldStrategy::TimeInText => {
                let text = dom::text_of(el);
                time::find_time(&text).map(|t| t.trim().to_string())
            }
        }
    }
}

fn children(list: &[&str]) -> Vec<FieldStrategy> {
    dom::compile(list).into_iter().map(FieldStrategy::Child).collect()
}

fn first_match(el: ElementRef, strategies: &[FieldStrategy]) -> Option<String> {
    strategies.iter().find_map(|s| s.apply(el))
}

static QUOTE_BLOCK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("blockquote, q, [class*='quote'], [style*='italic']").unwrap()
});

static ORIGINAL_TEXT: LazyLock<Vec<FieldStrategy>> = LazyLock::new(|| {
    let mut s = children(&[
        ".originalText",
        ".quote-text",
        ".highlight-text",
        ".annotation-text",
        ".note-quote",
        ".review-quote",
        ".noteItem_originalText",
        ".bookmarkText",
        ".wr_bookNote_abstract",
        ".noteItem_abstract",
        ".note-abstract",
        ".abstract",
        ".original-text",
        ".quote",
    ]);
    s.push(FieldStrategy::QuoteBlock);
    s
});

static NOTE_CONTENT: LazyLock<Vec<FieldStrategy>> = LazyLock::new(|| {
    children(&[
        ".noteContent",
        ".note-content",
        ".review-content",
        ".annotation-content",
        ".user-note",
        ".noteItem_content",
        ".thoughtText",
        ".wr_bookNote_thought",
        ".thought",
        ".note-text",
    ])
});

static CHAPTER: LazyLock<Vec<FieldStrategy>> = LazyLock::new(|| {
    children(&[
        ".chapterTitle",
        ".chapter-title",
        ".note-chapter",
        ".section-title",
        ".noteItem_chapter",
        ".wr_bookNote_chapterTitle",
        ".chapter",
    ])
});

static CREATE_TIME: LazyLock<Vec<FieldStrategy>> = LazyLock::new(|| {
    let mut s = children(&[
        ".createTime",
        ".note-time",
        ".timestamp",
        ".time-info",
        ".noteItem_time",
        ".review-time",
        ".wr_bookNote_time",
        ".time",
        ".date",
        "time",
    ]);
    s.push(FieldStrategy::TimeInText);
    s
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("note element {index} has neither original text nor note content")]
    Empty { index: usize },
}

/// Per-pass inputs shared by every element.
pub struct FieldContext<'a> {
    pub book: &'a BookInfo,
    pub config: &'a ExtractorConfig,
    pub now: DateTime<Utc>,
}

/// Build one record from a discovered element. `seen_ids` holds ids already
/// emitted in this pass; a repeated attribute id falls back to the hash id.
pub fn extract_record(
    el: ElementRef,
    index: usize,
    ctx: &FieldContext,
    seen_ids: &mut HashSet<String>,
) -> Result<NoteRecord, RecordError> {
    let original_text = first_match(el, &ORIGINAL_TEXT).unwrap_or_default();
    let note_content = first_match(el, &NOTE_CONTENT).unwrap_or_default();
    if original_text.is_empty() && note_content.is_empty() {
        return Err(RecordError::Empty { index });
    }

    let chapter_title =
        first_match(el, &CHAPTER).unwrap_or_else(|| ctx.config.default_chapter_title.clone());
    let create_time = first_match(el, &CREATE_TIME)
        .map(|raw| time::normalize(&raw, ctx.now, ctx.config.timezone()))
        .unwrap_or(ctx.now);

    let class_name = dom::class_name(el);
    let text = dom::text_of(el);
    let style = el.value().attr("style").unwrap_or("");

    let id = note_id(el, index, seen_ids);
    seen_ids.insert(id.clone());

    Ok(NoteRecord {
        id,
        book_id: ctx.book.book_id.clone(),
        book_title: ctx.book.title.clone(),
        book_author: ctx.book.author.clone(),
        book_cover: ctx.book.cover.clone(),
        chapter_title,
        note_content,
        original_text,
        create_time,
        note_type: note_type(class_name, &text),
        color: color(style, class_name).unwrap_or_else(|| ctx.config.default_color.clone()),
    })
}

fn note_id(el: ElementRef, index: usize, seen_ids: &HashSet<String>) -> String {
    ID_ATTRS
        .iter()
        .filter_map(|a| el.value().attr(a))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .filter(|v| !seen_ids.contains(*v))
        .map(str::to_string)
        .unwrap_or_else(|| format!("note_{:x}_{}", text_hash(&dom::raw_text(el)), index))
}

/// 32-bit `h * 31 + c` rolling hash over UTF-16 code units, sign dropped.
pub fn text_hash(text: &str) -> u32 {
    text.encode_utf16()
        .fold(0i32, |h, c| (h << 5).wrapping_sub(h).wrapping_add(c as i32))
        .unsigned_abs()
}

pub fn note_type(class_name: &str, text: &str) -> NoteType {
    let haystack = format!("{} {}", class_name, text).to_lowercase();
    TYPE_RULES
        .iter()
        .find(|r| r.keywords.iter().any(|kw| haystack.contains(kw)))
        .map(|r| r.note_type)
        .unwrap_or(NoteType::Highlight)
}

/// Palette colour named in the inline style or class list. Names match whole
/// words, so `wr_highlight_blue`, `highlightYellow` and `lightblue` count but
/// `colored` does not.
pub fn color(style: &str, class_name: &str) -> Option<String> {
    let words = words(&format!("{} {}", style, class_name));
    PALETTE
        .iter()
        .find(|(name, _)| words.iter().any(|w| is_shade_of(w, name)))
        .map(|(_, hex)| hex.to_string())
}

fn is_shade_of(word: &str, name: &str) -> bool {
    word == name
        || SHADE_PREFIXES
            .iter()
            .any(|p| word.strip_prefix(p) == Some(name))
}

/// Lowercased words, split on punctuation and on camelCase humps.
fn words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in s.chars() {
        let boundary = !c.is_ascii_alphanumeric() || (c.is_ascii_uppercase() && prev_lower);
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        if c.is_ascii_alphanumeric() {
            current.push(c.to_ascii_lowercase());
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

// ── Tests ──
