use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::time::has_time_pattern;
use crate::dom;

/// Class names the site has used for one note container. The long-standing
/// names come first; the current reader and notebook classes follow.
const NOTE_SELECTORS: &[&str] = &[
    ".noteItem",
    ".note-item",
    ".reviewItem",
    ".annotation-item",
    "[data-testid=\"noteItem\"]",
    ".noteListItem",
    ".highlight-item",
    ".wr_note_item",
    ".bookReview_review_item",
    ".shelf_book_note_item",
    ".wr_bookNote_item",
    ".readerNoteList_item",
    ".bookmark-item",
    "[data-note-id]",
];

/// Containers only; a `<p>` meta line inside a card must not outrank the card.
const BLOCK_ELEMENTS: &str = "div, article, section";

const NOTE_KEYWORDS: &[&str] = &["笔记", "标注", "想法", "批注", "高亮"];

pub const MIN_NOTE_CHARS: usize = 10;
pub const MAX_NOTE_CHARS: usize = 5000;

struct SelectorStrategy {
    name: &'static str,
    selector: Selector,
}

static STRATEGIES: LazyLock<Vec<SelectorStrategy>> = LazyLock::new(|| {
    NOTE_SELECTORS
        .iter()
        .zip(dom::compile(NOTE_SELECTORS))
        .map(|(&name, selector)| SelectorStrategy { name, selector })
        .collect()
});

static BLOCKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse(BLOCK_ELEMENTS).unwrap());

/// Which rule found the note elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Selector(&'static str),
    Pattern,
}

pub struct Discovered<'a> {
    pub strategy: Strategy,
    pub elements: Vec<ElementRef<'a>>,
}

/// Locate note elements in document order. The first selector with any
/// match is used alone; the keyword/length/time pattern runs only when no
/// selector matches. `None` when nothing looks like a note.
pub fn discover(document: &Html) -> Option<Discovered<'_>> {
    let found = STRATEGIES
        .iter()
        .find_map(|s| {
            let elements: Vec<_> = document.select(&s.selector).collect();
            (!elements.is_empty()).then(|| Discovered {
                strategy: Strategy::Selector(s.name),
                elements,
            })
        })
        .or_else(|| {
            let elements = pattern_matches(document);
            (!elements.is_empty()).then_some(Discovered {
                strategy: Strategy::Pattern,
                elements,
            })
        })?;

    debug!(strategy = ?found.strategy, count = found.elements.len(), "discovered note elements");
    Some(found)
}

/// Block elements passing all three note predicates. A candidate that
/// wraps another candidate is a list container, not a note, and is dropped.
fn pattern_matches(document: &Html) -> Vec<ElementRef<'_>> {
    let candidates: Vec<ElementRef> = document
        .select(&BLOCKS)
        .filter(|el| looks_like_note(&dom::text_of(*el), dom::class_name(*el)))
        .collect();

    let ids: HashSet<_> = candidates.iter().map(|el| el.id()).collect();
    candidates
        .into_iter()
        .filter(|el| !el.descendants().skip(1).any(|n| ids.contains(&n.id())))
        .collect()
}

pub fn looks_like_note(text: &str, class_name: &str) -> bool {
    has_note_keyword(text, class_name) && has_plausible_length(text) && has_time_pattern(text)
}

pub fn has_note_keyword(text: &str, class_name: &str) -> bool {
    NOTE_KEYWORDS
        .iter()
        .any(|kw| class_name.contains(kw) || text.contains(kw))
}

pub fn has_plausible_length(text: &str) -> bool {
    (MIN_NOTE_CHARS..=MAX_NOTE_CHARS).contains(&text.trim().chars().count())
}

// ── Tests ──
