use std::sync::LazyLock;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use regex::Regex;
use tracing::debug;

/// "3小时前", "15 分钟前", "2 days ago".
pub static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(分钟|小时|天|minutes?|mins?|hours?|hrs?|days?)\s*(?:前|ago)").unwrap()
});

/// "2024-01-15", "2024/1/5 10:30", "2024年1月15日 10:30:12".
pub static ABSOLUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}\s*[-/.年]\s*\d{1,2}\s*[-/.月]\s*\d{1,2}\s*日?(?:\s*\d{1,2}:\d{2}(?::\d{2})?)?")
        .unwrap()
});

/// Bare clock time, "10:30".
pub static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{1,2}:\d{2}\b").unwrap());

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y年%m月%d日 %H:%M:%S",
    "%Y年%m月%d日 %H:%M",
    "%Y年%m月%d日%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"];

/// Whether `text` contains something that reads as a timestamp.
pub fn has_time_pattern(text: &str) -> bool {
    ABSOLUTE_RE.is_match(text) || CLOCK_RE.is_match(text) || RELATIVE_RE.is_match(text)
}

/// First absolute or relative timestamp inside a longer text.
pub fn find_time(text: &str) -> Option<&str> {
    ABSOLUTE_RE
        .find(text)
        .or_else(|| RELATIVE_RE.find(text))
        .map(|m| m.as_str())
}

/// Turn a displayed timestamp into an instant. Relative phrases are counted
/// back from `now`; naive dates are read in `tz`. Anything unparseable
/// becomes `now`.
pub fn normalize(raw: &str, now: DateTime<Utc>, tz: FixedOffset) -> DateTime<Utc> {
    let raw = raw.trim();
    if let Some(t) = parse_relative(raw, now) {
        return t;
    }
    if let Some(t) = parse_absolute(raw, tz) {
        return t;
    }
    if let Some(t) = ABSOLUTE_RE.find(raw).and_then(|m| parse_absolute(m.as_str(), tz)) {
        return t;
    }
    debug!(raw, "unparseable timestamp, using current time");
    now
}

fn parse_relative(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE_RE.captures(raw)?;
    let n: i64 = caps[1].parse().ok()?;
    let unit = caps[2].to_lowercase();
    let secs_per_unit = match unit.as_str() {
        "分钟" => 60,
        "小时" => 3600,
        "天" => 86_400,
        u if u.starts_with("min") => 60,
        u if u.starts_with('h') => 3600,
        u if u.starts_with("day") => 86_400,
        _ => return None,
    };
    let delta = Duration::try_seconds(n.checked_mul(secs_per_unit)?)?;
    now.checked_sub_signed(delta)
}

fn parse_absolute(raw: &str, tz: FixedOffset) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(raw) {
        return Some(t.with_timezone(&Utc));
    }

    // Dates typed with stray spaces around separators ("2024 年 1 月 5 日").
    let compact = compact_separators(raw);
    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(&compact, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(&compact, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })?;
    tz.from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

fn compact_separators(raw: &str) -> String {
    static SPACED_SEP: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s*([-/.年月日])\s*").unwrap());
    let compact = SPACED_SEP.replace_all(raw, "$1");
    // Keep a single space between the date and the clock time.
    compact.replace('日', "日 ").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cst() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn within(a: DateTime<Utc>, b: DateTime<Utc>, secs: i64) -> bool {
        (a - b).num_seconds().abs() <= secs
    }

    #[test]
    fn hours_ago() {
        let now = Utc::now();
        let t = normalize("3小时前", Utc::now(), cst());
        assert!(within(t, now - Duration::hours(3), 2));
    }

    #[test]
    fn minutes_and_days_ago() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(normalize("15分钟前", now, cst()), now - Duration::minutes(15));
        assert_eq!(normalize("2 天前", now, cst()), now - Duration::days(2));
        assert_eq!(normalize("5 hours ago", now, cst()), now - Duration::hours(5));
    }

    #[test]
    fn absolute_minutes() {
        let now = Utc::now();
        let t = normalize("2024-01-15 10:30", now, cst());
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 15, 2, 30, 0).unwrap());
        assert_eq!(
            t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "2024-01-15T02:30:00Z"
        );
    }

    #[test]
    fn absolute_variants() {
        let now = Utc::now();
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 2, 30, 0).unwrap();
        assert_eq!(normalize("2024/01/15 10:30", now, cst()), expected);
        assert_eq!(normalize("2024年1月15日 10:30", now, cst()), expected);
        assert_eq!(normalize("2024-01-15T02:30:00Z", now, cst()), expected);
        assert_eq!(
            normalize("2024.01.15", now, cst()),
            Utc.with_ymd_and_hms(2024, 1, 14, 16, 0, 0).unwrap()
        );
    }

    #[test]
    fn absolute_inside_label() {
        let now = Utc::now();
        assert_eq!(
            normalize("发表于 2024-01-15 10:30", now, cst()),
            Utc.with_ymd_and_hms(2024, 1, 15, 2, 30, 0).unwrap()
        );
    }

    #[test]
    fn unparseable_is_now() {
        let before = Utc::now();
        let t = normalize("很久以前", Utc::now(), cst());
        assert!(within(t, before, 2));
        let t = normalize("", Utc::now(), cst());
        assert!(within(t, before, 2));
    }

    #[test]
    fn overflowing_relative_is_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(normalize("99999999999999天前", now, cst()), now);
    }

    #[test]
    fn pattern_detection() {
        assert!(has_time_pattern("写于 2023-11-02"));
        assert!(has_time_pattern("今天 09:41"));
        assert!(has_time_pattern("3天前"));
        assert!(!has_time_pattern("第三章 黑暗森林"));
        assert_eq!(find_time("abc 2023/11/02 09:41 xyz"), Some("2023/11/02 09:41"));
    }
}
