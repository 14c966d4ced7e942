use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Page classification ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageType {
    Unknown,
    Shelf,
    BookDetail,
    Reader,
    Notes,
    Review,
}

impl PageType {
    /// Only the reader and the notes list expose exportable notes.
    pub fn is_supported(self) -> bool {
        matches!(self, PageType::Reader | PageType::Notes)
    }

    /// Guidance shown to the user; depends on the page type alone.
    pub fn message(self) -> &'static str {
        match self {
            PageType::Reader => "Reader page detected, notes for this book can be exported",
            PageType::Notes => "Notes page detected, notes can be exported",
            PageType::BookDetail => {
                "Book detail page: open the book in the reader or its notes list to export notes"
            }
            PageType::Shelf => "Bookshelf page: pick a book and open its notes to export",
            PageType::Review => "Review page: reviews are not exported, open a book's notes instead",
            PageType::Unknown => "Not a recognised WeRead page, navigate to a book's reader or notes",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVerdict {
    pub page_type: PageType,
    pub is_supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_info: Option<BookInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_count: Option<usize>,
    pub message: String,
}

impl PageVerdict {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            is_supported: page_type.is_supported(),
            book_info: None,
            note_count: None,
            message: page_type.message().to_string(),
        }
    }
}

// ── Book metadata ──

/// Book metadata scraped from whichever page was open. Identity is `book_id`:
/// two values for the same book compare equal even when other fields differ.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInfo {
    pub book_id: String,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PartialEq for BookInfo {
    fn eq(&self, other: &Self) -> bool {
        self.book_id == other.book_id
    }
}

impl Eq for BookInfo {}

impl Hash for BookInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.book_id.hash(state);
    }
}

// ── Notes ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    Highlight,
    Thought,
    Bookmark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub id: String,
    pub book_id: String,
    pub book_title: String,
    pub book_author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_cover: Option<String>,
    pub chapter_title: String,
    pub note_content: String,
    pub original_text: String,
    pub create_time: DateTime<Utc>,
    pub note_type: NoteType,
    pub color: String,
}

/// Aggregate handed to whatever renders or saves the export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub book_info: BookInfo,
    pub notes: Vec<NoteRecord>,
    pub export_time: DateTime<Utc>,
    pub total_count: usize,
}

impl ExportBundle {
    pub fn new(book_info: BookInfo, notes: Vec<NoteRecord>) -> Self {
        Self {
            book_info,
            total_count: notes.len(),
            notes,
            export_time: Utc::now(),
        }
    }
}

/// `{success, data}` envelope, the same shape the extension's message handler replies with.
#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExportBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractResponse {
    pub fn ok(bundle: ExportBundle) -> Self {
        Self {
            success: true,
            data: Some(bundle),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
