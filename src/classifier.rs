use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::dom;
use crate::models::{BookInfo, PageType, PageVerdict};

const SITE_DOMAIN: &str = "weread.qq.com";
const TITLE_SUFFIXES: &[&str] = &["- 微信读书", "| 微信读书", "微信读书"];

static READER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/web/reader/([^/]+)").unwrap());
static DETAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/web/bookDetail/([^/]+)").unwrap());
static BOOK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/web/book(?:/(?:[^/]+/)*([^/]+))?/?$").unwrap());
static SHELF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/web/shelf(?:/|$)").unwrap());
static REVIEW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/web/review(?:/|$)").unwrap());
static PUB_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(出版社|出版时间|ISBN)\s*[:：]?\s*(.+)$").unwrap());

/// One row of the URL dispatch table.
struct Route {
    page_type: PageType,
    matches: fn(&Url) -> bool,
}

/// Evaluated in order, first match wins. `/web/bookDetail/..` also starts
/// with `/web/book`, so detail must stay ahead of notes.
const ROUTES: [Route; 5] = [
    Route { page_type: PageType::Reader, matches: is_reader_url },
    Route { page_type: PageType::BookDetail, matches: is_detail_url },
    Route { page_type: PageType::Notes, matches: is_notes_url },
    Route { page_type: PageType::Shelf, matches: is_shelf_url },
    Route { page_type: PageType::Review, matches: is_review_url },
];

struct MetaLayout {
    title: Vec<Selector>,
    author: Vec<Selector>,
    cover: Vec<Selector>,
}

static READER_LAYOUT: LazyLock<MetaLayout> = LazyLock::new(|| MetaLayout {
    title: dom::compile(&[
        ".readerTopBar_title_link",
        ".readerTopBar_title",
        ".readerCatalog_bookInfo_title_txt",
        ".bookInfo_title",
    ]),
    author: dom::compile(&[
        ".readerTopBar_author",
        ".readerCatalog_bookInfo_author",
        ".bookInfo_author",
    ]),
    cover: dom::compile(&[".readerCatalog_bookInfo_cover img", ".wr_bookCover_img"]),
});

static DETAIL_LAYOUT: LazyLock<MetaLayout> = LazyLock::new(|| MetaLayout {
    title: dom::compile(&[
        ".bookInfo_title",
        "[data-testid=\"bookTitle\"]",
        ".bookInfo_right_header_title_text",
        ".bookInfo_right_header_title",
    ]),
    author: dom::compile(&[
        ".bookInfo_author",
        "[data-testid=\"bookAuthor\"]",
        ".bookInfo_author_link",
    ]),
    cover: dom::compile(&[".bookInfo_cover img", ".wr_bookCover_img"]),
});

static NOTES_LAYOUT: LazyLock<MetaLayout> = LazyLock::new(|| MetaLayout {
    title: dom::compile(&[
        ".bookTitle",
        ".noteHeader_bookTitle",
        "[data-testid=\"noteBookTitle\"]",
        ".booknotes_title",
        ".noteBook_title",
        ".bookInfo_title",
    ]),
    author: dom::compile(&[
        ".bookAuthor",
        ".noteHeader_bookAuthor",
        "[data-testid=\"noteBookAuthor\"]",
        ".booknotes_author",
        ".noteBook_author",
        ".bookInfo_author",
    ]),
    cover: dom::compile(&[".booknotes_cover img", ".wr_bookCover_img"]),
});

static DOC_TITLE: LazyLock<Vec<Selector>> = LazyLock::new(|| dom::compile(&["title"]));
static DETAIL_INTRO: LazyLock<Vec<Selector>> =
    LazyLock::new(|| dom::compile(&[".bookInfo_intro", ".bookInfo_intro_text"]));
static DETAIL_PUB_LINE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".introDialog_content_pub_line, .bookInfo_pub_line").unwrap()
});

/// Shallow preview count for the notes list; no fallback, no validation.
static NOTE_COUNT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        ".noteItem, .note-item, [data-testid=\"noteItem\"], .reviewItem, \
         .wr_bookNote_item, .readerNoteList_item, [data-note-id]",
    )
    .unwrap()
});

/// Classify the page at `location` from its URL and DOM. Never fails:
/// anything unrecognised is `Unknown`, missing metadata leaves `book_info` empty.
pub fn classify(location: &Url, document: &Html) -> PageVerdict {
    let page_type = page_type_for(location);
    let mut verdict = PageVerdict::new(page_type);
    let root = document.root_element();

    verdict.book_info = match page_type {
        PageType::Reader => book_info(location, root, &READER_LAYOUT, &READER_RE),
        PageType::BookDetail => book_info(location, root, &DETAIL_LAYOUT, &DETAIL_RE)
            .map(|info| with_detail_fields(info, root)),
        PageType::Notes => book_info(location, root, &NOTES_LAYOUT, &BOOK_RE),
        PageType::Shelf | PageType::Review | PageType::Unknown => None,
    };

    if page_type == PageType::Notes {
        verdict.note_count = Some(document.select(&NOTE_COUNT).count());
    }

    debug!(
        url = %location,
        page_type = ?page_type,
        has_book = verdict.book_info.is_some(),
        "classified page"
    );
    verdict
}

pub fn page_type_for(location: &Url) -> PageType {
    if !is_site_host(location) {
        return PageType::Unknown;
    }
    ROUTES
        .iter()
        .find(|r| (r.matches)(location))
        .map(|r| r.page_type)
        .unwrap_or(PageType::Unknown)
}

fn is_site_host(location: &Url) -> bool {
    let Some(host) = location.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    host == SITE_DOMAIN
        || host
            .strip_suffix(SITE_DOMAIN)
            .is_some_and(|sub| sub.ends_with('.'))
}

fn is_reader_url(location: &Url) -> bool {
    READER_RE.is_match(location.path())
}

fn is_detail_url(location: &Url) -> bool {
    DETAIL_RE.is_match(location.path())
}

fn is_shelf_url(location: &Url) -> bool {
    SHELF_RE.is_match(location.path())
}

fn is_review_url(location: &Url) -> bool {
    REVIEW_RE.is_match(location.path())
}

fn is_notes_url(location: &Url) -> bool {
    BOOK_RE.is_match(location.path())
        && location.query_pairs().any(|(k, v)| {
            (k == "type" && v.to_ascii_lowercase().contains("note")) || k == "noteType"
        })
}

/// Book id from the path segment captured by `path_re`, else the `bookId` query.
fn book_id(location: &Url, path_re: &Regex) -> Option<String> {
    path_re
        .captures(location.path())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            location
                .query_pairs()
                .find(|(k, _)| k == "bookId")
                .map(|(_, v)| v.into_owned())
        })
        .filter(|id| !id.trim().is_empty())
}

fn book_info(
    location: &Url,
    root: ElementRef,
    layout: &MetaLayout,
    path_re: &Regex,
) -> Option<BookInfo> {
    let book_id = book_id(location, path_re)?;
    let title = dom::first_text(root, &layout.title).or_else(|| document_title(root))?;
    let author = dom::first_text(root, &layout.author).unwrap_or_default();
    let cover = dom::first_attr(root, &layout.cover, &["src", "data-src"])
        .and_then(|src| location.join(&src).ok())
        .map(String::from);

    Some(BookInfo {
        book_id,
        title,
        author,
        cover,
        ..Default::default()
    })
}

/// `<title>` without the site suffix; `None` when only the site name remains.
fn document_title(root: ElementRef) -> Option<String> {
    let mut title = dom::first_text(root, &DOC_TITLE)?;
    for suffix in TITLE_SUFFIXES {
        if let Some(stripped) = title.strip_suffix(suffix) {
            title = stripped.trim().to_string();
        }
    }
    Some(title).filter(|t| !t.is_empty())
}

fn with_detail_fields(mut info: BookInfo, root: ElementRef) -> BookInfo {
    info.description = dom::first_text(root, &DETAIL_INTRO);
    for line in root.select(&DETAIL_PUB_LINE) {
        let text = dom::text_of(line);
        let Some(caps) = PUB_LINE_RE.captures(&text) else {
            continue;
        };
        let value = Some(caps[2].trim().to_string());
        match &caps[1] {
            "出版社" => info.publisher = value,
            "出版时间" => info.publish_date = value,
            "ISBN" => info.isbn = value,
            _ => {}
        }
    }
    info
}

// ── Tests ──
