//! Pipeline orchestrator: ties scraper → session store → export together.
//!
//! Every command works on one session:
//!   1. `scrape_url` / `scrape_file` extract records and open a session
//!   2. `update`, `add_row`, `delete_row` edit the session's record set
//!   3. `export` writes the sheet and, unless told to keep it, closes the session
//!
//! Sessions expire after `storage.session_ttl_secs` without a write.

use crate::config::AppConfig;
use crate::export::write_csv;
use crate::models::{ExtractedRecord, ReconField, RecordSet, RowId};
use crate::scraper::{scrape_html, PaymentScraper};
use crate::storage::{Repository, Session};
use crate::utils::{export_file_name, validate_url};
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    fn repo(&self) -> Result<Repository> {
        let storage = &self.config.storage;
        let repo = Repository::open(&storage.db_path, storage.session_ttl_secs)
            .context("Failed to open session store")?;
        if storage.run_migrations {
            repo.run_migrations()?;
        }
        Ok(repo)
    }

    // ── Scraping ──────────────────────────────────────────────────────────────

    /// Scrape a page into a new session. `None` when the page has no payment data.
    pub async fn scrape_url(&self, input: &str) -> Result<Option<Session>> {
        let url = validate_url(input)
            .ok_or_else(|| anyhow!("Please enter a valid URL with http:// or https://"))?;

        let scraper = PaymentScraper::new(&self.config.scraper)
            .context("Failed to build scraper")?;
        let records = scraper
            .scrape(url.as_str())
            .await
            .with_context(|| format!("Error scraping data from {}", url))?;

        self.open_session(url.as_str(), records)
    }

    /// Same as [`Self::scrape_url`] for a page saved to disk.
    pub fn scrape_file(&self, path: &Path) -> Result<Option<Session>> {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {:?}", path))?;
        let records = scrape_html(&html);
        self.open_session(&format!("file://{}", path.display()), records)
    }

    fn open_session(&self, url: &str, records: RecordSet) -> Result<Option<Session>> {
        if records.is_empty() {
            warn!("No payment data found on {}", url);
            return Ok(None);
        }

        let mut session = Session::new(url, records);
        self.repo()?.put_session(&mut session)?;
        info!(
            "Session {}: {} records from {}",
            session.id,
            session.records.len(),
            url
        );
        Ok(Some(session))
    }

    // ── Editing ───────────────────────────────────────────────────────────────

    pub fn load(&self, session_id: &str) -> Result<Session> {
        self.repo()?
            .get_session(session_id)?
            .ok_or_else(|| anyhow!("Session {} expired or invalid. Please scrape again.", session_id))
    }

    /// Set reconciliation fields on one row.
    pub fn update(
        &self,
        session_id: &str,
        row_id: &RowId,
        edits: &[(ReconField, String)],
    ) -> Result<Session> {
        let repo = self.repo()?;
        let mut session = self.load_from(&repo, session_id)?;
        session.records.update(row_id, edits)?;
        repo.put_session(&mut session)?;
        info!("Updated {} field(s) on row {}", edits.len(), row_id);
        Ok(session)
    }

    /// Add a hand-entered row; the set is re-sorted by date.
    pub fn add_row(&self, session_id: &str, record: ExtractedRecord) -> Result<(RowId, Session)> {
        let repo = self.repo()?;
        let mut session = self.load_from(&repo, session_id)?;
        let row_id = session
            .records
            .add(Utc::now().timestamp_millis(), record);
        repo.put_session(&mut session)?;
        info!(
            "Added row {} and sorted data. Total records: {}",
            row_id,
            session.records.len()
        );
        Ok((row_id, session))
    }

    pub fn delete_row(&self, session_id: &str, row_id: &RowId) -> Result<Session> {
        let repo = self.repo()?;
        let mut session = self.load_from(&repo, session_id)?;
        if !session.records.remove(row_id) {
            bail!("Row {} not found", row_id);
        }
        repo.put_session(&mut session)?;
        info!(
            "Deleted row {}. Total records: {}",
            row_id,
            session.records.len()
        );
        Ok(session)
    }

    fn load_from(&self, repo: &Repository, session_id: &str) -> Result<Session> {
        repo.get_session(session_id)?
            .ok_or_else(|| anyhow!("Session {} expired or invalid. Please scrape again.", session_id))
    }

    // ── Export ────────────────────────────────────────────────────────────────

    /// Write the session's sheet. The session is closed afterwards unless `keep`.
    pub fn export(&self, session_id: &str, out_dir: Option<&Path>, keep: bool) -> Result<PathBuf> {
        let repo = self.repo()?;
        let session = self.load_from(&repo, session_id)?;

        let dir = out_dir.unwrap_or(self.config.export.out_dir.as_path());
        let path = dir.join(export_file_name(&session.url, &session.id));
        write_csv(&session.records, &path)?;

        if !keep {
            repo.delete_session(&session.id)?;
        }
        Ok(path)
    }

    /// Drop every expired session now.
    pub fn purge(&self) -> Result<usize> {
        self.repo()?.evict_expired()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
