pub mod cleaner;
pub mod dom;
pub mod error;
pub mod http_client;
pub mod parsers;
pub mod rules;

use crate::config::ScraperConfig;
use crate::models::{ExtractedRecord, Record, RecordSet, RowId};
use async_trait::async_trait;
use chrono::Utc;
use scraper::Html;
use tracing::{debug, info};

pub use self::error::ScrapeError;
pub use self::http_client::HttpClient;

use self::dom::document_root;
use self::parsers::{extract_from_non_tabular, extract_tables};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Where page markup comes from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, ScrapeError>;
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Which path produced the records of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Tables,
    KeyValue,
    Nothing,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: Vec<ExtractedRecord>,
    pub strategy: Strategy,
}

/// Run table extraction over a whole page, falling back to key/value text
/// only when no table yields a record. Broken markup is tolerated.
pub fn extract_document(html: &str) -> Extraction {
    let doc = Html::parse_document(html);
    if !doc.errors.is_empty() {
        debug!("Tolerated {} markup errors", doc.errors.len());
    }
    let root = document_root(&doc);

    let records = extract_tables(&root);
    if !records.is_empty() {
        return Extraction {
            records,
            strategy: Strategy::Tables,
        };
    }

    info!("No payment table found, scanning key/value text");
    let records = extract_from_non_tabular(&root);
    let strategy = if records.is_empty() {
        Strategy::Nothing
    } else {
        Strategy::KeyValue
    };
    Extraction { records, strategy }
}

/// Give each record its row id and default any unset reconciliation field to "0".
pub fn annotate(records: Vec<ExtractedRecord>, stamp_ms: i64) -> RecordSet {
    let records = records
        .into_iter()
        .enumerate()
        .map(|(i, mut record)| {
            record.default_reconciliation("0");
            Record::new(RowId::scraped(stamp_ms, i), record)
        })
        .collect();
    RecordSet::new(records)
}

/// Extract and annotate an already fetched page.
pub fn scrape_html(html: &str) -> RecordSet {
    let extraction = extract_document(html);
    debug!(
        "{} records via {:?}",
        extraction.records.len(),
        extraction.strategy
    );
    annotate(extraction.records, Utc::now().timestamp_millis())
}

// ── Facade ────────────────────────────────────────────────────────────────────

pub struct PaymentScraper<S = HttpClient> {
    source: S,
}

impl PaymentScraper<HttpClient> {
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            source: HttpClient::new(config)?,
        })
    }
}

impl<S: PageSource> PaymentScraper<S> {
    pub fn with_source(source: S) -> Self {
        Self { source }
    }

    /// Fetch `url` and return its payment records in document order.
    ///
    /// An empty set means nothing was found; it is not an error.
    pub async fn scrape(&self, url: &str) -> Result<RecordSet, ScrapeError> {
        info!("Fetching URL: {}", url);
        let html = self.source.fetch_page(url).await?;

        let records = tokio::task::spawn_blocking(move || scrape_html(&html))
            .await
            .map_err(|e| ScrapeError::Internal {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        info!("Extracted {} payment records from {}", records.len(), url);
        Ok(records)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, ReconField, EXPORT_COLUMNS};
    use std::collections::HashSet;

    struct StaticPage(&'static str);

    #[async_trait]
    impl PageSource for StaticPage {
        async fn fetch_page(&self, _url: &str) -> Result<String, ScrapeError> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenPage;

    #[async_trait]
    impl PageSource for BrokenPage {
        async fn fetch_page(&self, _url: &str) -> Result<String, ScrapeError> {
            Err(ScrapeError::Parse("empty body".into()))
        }
    }

    const SINGLE_TABLE: &str = r#"<html><body>
        <table>
          <tr><th>Date</th><th>Principal</th><th>Pen</th><th>Collector</th></tr>
          <tr><td>01/05/2024</td><td>1000</td><td>50</td><td>John</td></tr>
          <tr><td>April</td><td>total</td><td></td><td></td></tr>
        </table>
    </body></html>"#;

    #[test]
    fn scrapes_single_payment_table() {
        let scraper = PaymentScraper::with_source(StaticPage(SINGLE_TABLE));
        let records = tokio_test::block_on(scraper.scrape("https://example.com/loan/1")).unwrap();

        assert_eq!(records.len(), 1);
        let record = records.iter().next().unwrap();
        let f = &record.fields;
        assert_eq!(f.date.as_deref(), Some("01/05/2024"));
        assert_eq!(f.principal.as_deref(), Some("1000"));
        assert_eq!(f.pen.as_deref(), Some("50"));
        assert_eq!(f.collector.as_deref(), Some("John"));
        assert_eq!(f.receipt_no, None);

        for field in ReconField::DEFAULTED {
            assert_eq!(record.reconciliation.get(&field).map(String::as_str), Some(""));
        }
        assert!(record.row_id.as_str().starts_with("scraped_"));
    }

    #[test]
    fn fallback_records_default_to_zero() {
        let set = scrape_html(
            "<div>Date: 03/02/2024</div><div>Principal: 400</div><p>Collector: Ann</p>",
        );
        assert_eq!(set.len(), 2);
        for record in &set {
            for field in ReconField::DEFAULTED {
                assert_eq!(record.value(Column::Recon(field)), "0");
            }
        }
        let first = set.iter().next().unwrap();
        assert_eq!(first.value(EXPORT_COLUMNS[1]), "03/02/2024");
        assert_eq!(first.value(EXPORT_COLUMNS[6]), "");
    }

    #[test]
    fn tables_win_over_key_value_text() {
        let html = format!("<p>Date: 01/01/2020</p><p>Pen: 1</p>{}", SINGLE_TABLE);
        let extraction = extract_document(&html);
        assert_eq!(extraction.strategy, Strategy::Tables);
        assert_eq!(extraction.records.len(), 1);
    }

    #[test]
    fn pages_without_data_yield_empty_set() {
        let extraction = extract_document("<html><body><nav>Home</nav><table><tr><td>x</td></tr>");
        assert_eq!(extraction.strategy, Strategy::Nothing);
        assert!(scrape_html("").is_empty());
    }

    #[test]
    fn row_ids_are_unique_within_a_scrape() {
        let html = SINGLE_TABLE.replace(
            "<tr><td>April</td>",
            "<tr><td>01/05/2024</td><td>1000</td><td>50</td><td>John</td></tr><tr><td>April</td>",
        );
        let set = scrape_html(&html);
        assert_eq!(set.len(), 2);
        let ids: HashSet<&str> = set.iter().map(|r| r.row_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn source_errors_propagate() {
        let scraper = PaymentScraper::with_source(BrokenPage);
        let err = tokio_test::block_on(scraper.scrape("https://example.com")).unwrap_err();
        assert!(matches!(err, ScrapeError::Parse(_)));
        assert!(!err.is_fetch());
    }

    #[test]
    fn invalid_urls_are_fetch_errors() {
        let client = HttpClient::new(&ScraperConfig::default()).unwrap();
        let err = tokio_test::block_on(client.get_text("not a url")).unwrap_err();
        assert!(err.is_fetch());
    }
}
