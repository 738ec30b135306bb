use super::error::ScrapeError;
use super::PageSource;
use crate::config::ScraperConfig;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// Plain GET client: browser-like User-Agent, bounded timeout, no retries.
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .map_err(|e| ScrapeError::Internal {
                url: String::new(),
                source: Box::new(e),
            })?;

        Ok(Self { inner })
    }

    /// Fetch a URL as text. Timeouts and HTTP error statuses are `Fetch` errors.
    pub async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
        debug!("GET {}", url);

        let fetch_err = |source| ScrapeError::Fetch {
            url: url.to_string(),
            source,
        };

        let resp = self.inner.get(url).send().await.map_err(fetch_err)?;
        let resp = resp.error_for_status().map_err(fetch_err)?;
        debug!("{} → {}", url, resp.status());

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);
        if let Some(kind) = content_type.filter(|k| !is_markup(k)) {
            return Err(ScrapeError::Parse(format!("{} served {}, not a page", url, kind)));
        }

        resp.text().await.map_err(fetch_err)
    }
}

/// HTML, XML and plain text bodies are worth parsing; PDFs, images and JSON are not.
fn is_markup(content_type: &str) -> bool {
    content_type.starts_with("text/") || content_type.contains("html") || content_type.contains("xml")
}

#[async_trait]
impl PageSource for HttpClient {
    async fn fetch_page(&self, url: &str) -> Result<String, ScrapeError> {
        self.get_text(url).await
    }
}
