use thiserror::Error;

/// Failures surfaced by [`super::PaymentScraper`].
///
/// Problems with individual tables or rows never show up here; they are
/// skipped during extraction.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Transport failure, timeout or non-success HTTP status. Not retried.
    #[error("failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response is not markup at all (PDF, image, JSON...).
    #[error("could not interpret page: {0}")]
    Parse(String),

    /// Anything unexpected while processing a fetched page.
    #[error("scrape of {url} failed")]
    Internal {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ScrapeError {
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}
