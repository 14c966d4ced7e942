use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;
use url::Url;

/// A page whose rendered DOM can be read repeatedly. Content may change
/// between snapshots while the site renders notes client-side.
#[allow(async_fn_in_trait)]
pub trait DomSource {
    fn location(&self) -> &Url;

    /// Current HTML of the page.
    async fn snapshot(&self) -> Result<String>;
}

/// Fixed HTML that never changes.
#[cfg_attr(not(test), allow(dead_code))]
pub struct StaticPage {
    location: Url,
    html: String,
}

#[cfg_attr(not(test), allow(dead_code))]
impl StaticPage {
    pub fn new(location: Url, html: impl Into<String>) -> Self {
        Self {
            location,
            html: html.into(),
        }
    }
}

impl DomSource for StaticPage {
    fn location(&self) -> &Url {
        &self.location
    }

    async fn snapshot(&self) -> Result<String> {
        Ok(self.html.clone())
    }
}

/// An HTML dump on disk, re-read on every snapshot so a browser can keep
/// overwriting it while we wait for notes to appear.
pub struct FilePage {
    location: Url,
    path: PathBuf,
}

impl FilePage {
    pub fn new(location: Url, path: impl Into<PathBuf>) -> Self {
        Self {
            location,
            path: path.into(),
        }
    }
}

impl DomSource for FilePage {
    fn location(&self) -> &Url {
        &self.location
    }

    async fn snapshot(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }
}

/// Fetches the location over HTTP on every snapshot. Only server-rendered
/// markup is visible this way.
pub struct HttpPage {
    location: Url,
    client: reqwest::Client,
}

impl HttpPage {
    pub fn new(location: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { location, client })
    }
}

impl DomSource for HttpPage {
    fn location(&self) -> &Url {
        &self.location
    }

    async fn snapshot(&self) -> Result<String> {
        let response = self
            .client
            .get(self.location.clone())
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, self.location);
        }
        let body = response.text().await.context("Failed to read response body")?;
        debug!(bytes = body.len(), url = %self.location, "fetched page");
        Ok(body)
    }
}
