use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use config::{Config, Environment};
use serde::Deserialize;

pub const POLL_INTERVAL_MS: u64 = 100;
pub const TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CHAPTER_TITLE: &str = "未知章节";
/// Yellow, the site's default highlighter colour.
pub const DEFAULT_COLOR: &str = "#FFEB3B";
/// WeRead renders timestamps in China Standard Time.
pub const UTC_OFFSET_HOURS: i32 = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    pub default_chapter_title: String,
    pub default_color: String,
    pub utc_offset_hours: i32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: POLL_INTERVAL_MS,
            timeout_ms: TIMEOUT_MS,
            default_chapter_title: DEFAULT_CHAPTER_TITLE.to_string(),
            default_color: DEFAULT_COLOR.to_string(),
            utc_offset_hours: UTC_OFFSET_HOURS,
        }
    }
}

impl ExtractorConfig {
    /// Defaults, overridden by `WEREAD_*` environment variables
    /// (e.g. `WEREAD_TIMEOUT_MS=8000`).
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("poll_interval_ms", POLL_INTERVAL_MS as i64)?
            .set_default("timeout_ms", TIMEOUT_MS as i64)?
            .set_default("default_chapter_title", DEFAULT_CHAPTER_TITLE)?
            .set_default("default_color", DEFAULT_COLOR)?
            .set_default("utc_offset_hours", UTC_OFFSET_HOURS as i64)?
            .add_source(Environment::with_prefix("WEREAD").try_parsing(true))
            .build()
            .context("Failed to read WEREAD_* settings")?;

        let cfg: ExtractorConfig = settings
            .try_deserialize()
            .context("Invalid WEREAD_* settings")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.poll_interval_ms > self.timeout_ms {
            bail!(
                "poll_interval_ms ({}) exceeds timeout_ms ({})",
                self.poll_interval_ms,
                self.timeout_ms
            );
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            bail!("utc_offset_hours out of range: {}", self.utc_offset_hours);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Zone used to anchor naive date/times shown on the page.
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}
