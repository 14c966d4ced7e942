pub mod discovery;
pub mod fields;
pub mod time;

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use scraper::{ElementRef, Html};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::models::{BookInfo, NoteRecord};
use crate::page::DomSource;
use fields::FieldContext;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("notes did not load within {}ms", .waited.as_millis())]
    Timeout { waited: Duration },
    #[error("failed to read page: {0:#}")]
    Snapshot(#[from] anyhow::Error),
}

/// Wait for notes to render on `source`, then extract one record per note
/// element in document order. Polls every `poll_interval` until something
/// note-shaped appears or `timeout` elapses; a timeout returns no partial result.
pub async fn extract_notes<S: DomSource>(
    source: &S,
    book: &BookInfo,
    config: &ExtractorConfig,
) -> Result<Vec<NoteRecord>, ExtractionError> {
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        let html = source.snapshot().await.inspect_err(|e| {
            warn!(url = %source.location(), error = %e, "snapshot failed");
        })?;
        polls += 1;

        if let Some(records) = scan(&html, book, config) {
            info!(
                book_id = %book.book_id,
                notes = records.len(),
                polls,
                "extracted notes"
            );
            return Ok(records);
        }

        let waited = started.elapsed();
        if waited >= config.timeout() {
            warn!(polls, waited_ms = waited.as_millis() as u64, "no notes rendered before timeout");
            return Err(ExtractionError::Timeout { waited });
        }
        debug!(polls, "no note elements yet");
        tokio::time::sleep(config.poll_interval()).await;
    }
}

/// One synchronous pass over a snapshot. `None` while nothing note-shaped
/// has rendered yet.
fn scan(html: &str, book: &BookInfo, config: &ExtractorConfig) -> Option<Vec<NoteRecord>> {
    let document = Html::parse_document(html);
    let found = discovery::discover(&document)?;
    let ctx = FieldContext {
        book,
        config,
        now: Utc::now(),
    };
    Some(build_records(&found.elements, &ctx))
}

/// Extract every element independently; a discarded element never stops the batch.
fn build_records(elements: &[ElementRef], ctx: &FieldContext) -> Vec<NoteRecord> {
    let mut seen_ids = HashSet::new();
    let mut records = Vec::with_capacity(elements.len());

    for (index, el) in elements.iter().enumerate() {
        match fields::extract_record(*el, index, ctx, &mut seen_ids) {
            Ok(record) => records.push(record),
            Err(e) => debug!(error = %e, "discarding note element"),
        }
    }

    if records.len() < elements.len() {
        debug!(
            kept = records.len(),
            discarded = elements.len() - records.len(),
            "dropped empty note elements"
        );
    }
    records
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use url::Url;

    use super::*;
    use crate::models::NoteType;
    use crate::page::{FilePage, StaticPage};

    fn reader_url() -> Url {
        Url::parse("https://weread.qq.com/web/reader/3a8321c0813ab7839g011bd5").unwrap()
    }

    fn book() -> BookInfo {
        BookInfo {
            book_id: "3a8321c0813ab7839g011bd5".into(),
            title: "三体".into(),
            author: "刘慈欣".into(),
            ..Default::default()
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    /// Serves an empty shell for the first `blank_polls` snapshots, then the notes.
    struct LateRender {
        location: Url,
        blank_polls: usize,
        calls: AtomicUsize,
        html: String,
    }

    impl DomSource for LateRender {
        fn location(&self) -> &Url {
            &self.location
        }

        async fn snapshot(&self) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.blank_polls {
                Ok(fixture("empty_reader"))
            } else {
                Ok(self.html.clone())
            }
        }
    }

    #[tokio::test]
    async fn end_to_end_drops_empty_note() {
        let page = StaticPage::new(reader_url(), fixture("reader_notes"));
        let notes = extract_notes(&page, &book(), &ExtractorConfig::default())
            .await
            .unwrap();

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].id, "note-1001");
        assert_eq!(notes[0].chapter_title, "第一部 科学边界");
        assert_eq!(notes[0].original_text, "给岁月以文明，而不是给文明以岁月。");
        assert_eq!(notes[0].note_content, "");
        assert_eq!(notes[0].note_type, NoteType::Highlight);
        assert_eq!(notes[0].color, "#FFEB3B");
        assert_eq!(
            notes[0].create_time,
            Utc.with_ymd_and_hms(2024, 1, 15, 2, 30, 0).unwrap()
        );

        assert_eq!(notes[1].chapter_title, "第二部 黑暗森林");
        assert_eq!(notes[1].note_content, "猜疑链是整本书最冷的设定。");
        assert_eq!(notes[1].color, "#4CAF50");
        assert!(notes[1].id.starts_with("note_") && notes[1].id.ends_with("_1"));

        for n in &notes {
            assert!(!n.original_text.is_empty() || !n.note_content.is_empty());
            assert_eq!(n.book_title, "三体");
        }
    }

    #[tokio::test]
    async fn pattern_fallback_end_to_end() {
        let page = StaticPage::new(reader_url(), fixture("pattern_notes"));
        let notes = extract_notes(&page, &book(), &ExtractorConfig::default())
            .await
            .unwrap();

        assert_eq!(notes.len(), 2);
        assert!(notes[0].original_text.starts_with("我们都是阴沟里的虫子"));
        assert_eq!(
            notes[0].create_time,
            Utc.with_ymd_and_hms(2023, 11, 2, 13, 15, 0).unwrap()
        );
        assert_eq!(notes[0].note_type, NoteType::Highlight);
        assert!(notes[1].original_text.starts_with("人类的无知和弱小"));
        assert_eq!(notes[1].note_type, NoteType::Thought);
        assert_eq!(notes[0].chapter_title, crate::config::DEFAULT_CHAPTER_TITLE);
    }

    #[tokio::test]
    async fn older_markup_end_to_end() {
        let page = StaticPage::new(reader_url(), fixture("legacy_notes"));
        let notes = extract_notes(&page, &book(), &ExtractorConfig::default())
            .await
            .unwrap();

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].id, "legacy-1");
        assert_eq!(notes[0].chapter_title, "第一部 科学边界");
        assert!(notes[0].original_text.starts_with("给岁月以文明，\n"));
        assert!(notes[0].original_text.ends_with("而不是给文明以岁月。"));
        assert_eq!(notes[0].note_content, "好句子");
        assert_eq!(notes[0].color, "#FFEB3B");
        assert_eq!(
            notes[0].create_time,
            Utc.with_ymd_and_hms(2024, 1, 15, 2, 30, 0).unwrap()
        );

        assert_eq!(notes[1].chapter_title, "第二部 黑暗森林");
        assert_eq!(notes[1].original_text, "宇宙就是一座黑暗森林，每个文明都是带枪的猎人。");
        assert_eq!(notes[1].color, "#2196F3");
    }

    #[tokio::test]
    async fn note_item_with_only_a_quote() {
        let page = StaticPage::new(
            reader_url(),
            r#"<html><body><div class="wr_note_item"><blockquote>人类的无知和弱小不是生存的障碍，傲慢才是。</blockquote></div></body></html>"#,
        );
        let notes = extract_notes(&page, &book(), &ExtractorConfig::default())
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].original_text, "人类的无知和弱小不是生存的障碍，傲慢才是。");
    }

    #[tokio::test]
    async fn highlight_card_without_known_classes() {
        let page = StaticPage::new(
            reader_url(),
            r#"<html><body><div class="feed">
                 <div class="card"><blockquote>给岁月以文明，而不是给文明以岁月。</blockquote><span>高亮 · 2023-11-02 21:15</span></div>
                 <div class="card"><blockquote>一段足够长的引用原文内容在这里</blockquote><p>笔记 2023-11-02 21:15 补充</p></div>
               </div></body></html>"#,
        );
        let notes = extract_notes(&page, &book(), &ExtractorConfig::default())
            .await
            .unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].note_type, NoteType::Highlight);
        assert_eq!(
            notes[0].create_time,
            Utc.with_ymd_and_hms(2023, 11, 2, 13, 15, 0).unwrap()
        );
        assert_eq!(notes[1].original_text, "一段足够长的引用原文内容在这里");
    }

    #[tokio::test(start_paused = true)]
    async fn footer_clock_is_not_mistaken_for_notes() {
        let page = StaticPage::new(
            reader_url(),
            r#"<html><body><div class="notebook-footer">© 2024 WeRead 版权所有 12:30</div></body></html>"#,
        );
        let config = ExtractorConfig {
            timeout_ms: 200,
            ..Default::default()
        };
        let err = extract_notes(&page, &book(), &config).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Timeout { .. }));
    }

    #[tokio::test]
    async fn duplicate_content_gets_distinct_ids() {
        let item = r#"<div class="noteItem"><div class="abstract">同一句被划了两次的原文</div></div>"#;
        let page = StaticPage::new(reader_url(), format!("<html><body>{item}{item}</body></html>"));
        let notes = extract_notes(&page, &book(), &ExtractorConfig::default())
            .await
            .unwrap();

        assert_eq!(notes.len(), 2);
        assert_ne!(notes[0].id, notes[1].id);
        let hash0 = notes[0].id.trim_end_matches("_0");
        let hash1 = notes[1].id.trim_end_matches("_1");
        assert_eq!(hash0, hash1);
    }

    #[tokio::test]
    async fn repeated_runs_are_identical() {
        let html = format!(
            "{}<div class=\"wr_bookNote_item\"><div class=\"wr_bookNote_abstract\">没有时间的划线内容</div></div>",
            fixture("reader_notes")
        );
        let page = StaticPage::new(reader_url(), html);
        let config = ExtractorConfig::default();

        let first = extract_notes(&page, &book(), &config).await.unwrap();
        let second = extract_notes(&page, &book(), &config).await.unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            let mut a_cmp = a.clone();
            a_cmp.create_time = b.create_time;
            assert_eq!(&a_cmp, b);
            assert!(a.create_time <= b.create_time);
        }
        assert_eq!(first[0].create_time, second[0].create_time);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_notes() {
        let page = StaticPage::new(reader_url(), fixture("empty_reader"));
        let started = Instant::now();

        let err = extract_notes(&page, &book(), &ExtractorConfig::default())
            .await
            .unwrap_err();

        let ExtractionError::Timeout { waited } = err else {
            panic!("expected timeout, got {err}");
        };
        assert!(waited >= Duration::from_millis(5000));
        assert!(waited < Duration::from_millis(5100));
        assert!(started.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_late_render() {
        let page = LateRender {
            location: reader_url(),
            blank_polls: 7,
            calls: AtomicUsize::new(0),
            html: fixture("reader_notes"),
        };
        let started = Instant::now();

        let notes = extract_notes(&page, &book(), &ExtractorConfig::default())
            .await
            .unwrap();

        assert_eq!(notes.len(), 2);
        assert_eq!(page.calls.load(Ordering::SeqCst), 8);
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_timeout() {
        let page = StaticPage::new(reader_url(), "<html><body></body></html>");
        let config = ExtractorConfig {
            timeout_ms: 300,
            ..Default::default()
        };
        let err = extract_notes(&page, &book(), &config).await.unwrap_err();
        assert_eq!(err.to_string(), "notes did not load within 300ms");
    }

    #[tokio::test]
    async fn snapshot_failure_is_reported() {
        let page = FilePage::new(reader_url(), "tests/fixtures/missing.html");
        let err = extract_notes(&page, &book(), &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Snapshot(_)));
        assert!(err.to_string().starts_with("failed to read page"));
    }
}
