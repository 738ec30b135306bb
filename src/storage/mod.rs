use crate::models::RecordSet;
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime, Utc};
use duckdb::{params, Connection, OptionalExt};
use std::path::Path;
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id  VARCHAR PRIMARY KEY,
    source_url  VARCHAR NOT NULL,
    -- RecordSet as JSON, row order preserved
    records     VARCHAR NOT NULL,
    updated_at  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions (updated_at);
"#;

// ── Session ───────────────────────────────────────────────────────────────────

/// One scrape's working data, owned by a single session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub url: String,
    pub records: RecordSet,
    pub updated_at: NaiveDateTime,
}

impl Session {
    pub fn new(url: impl Into<String>, records: RecordSet) -> Self {
        Self {
            id: new_session_id(),
            url: url.into(),
            records,
            updated_at: Utc::now().naive_utc(),
        }
    }
}

/// 16 random hex characters.
pub fn new_session_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

// ── Repository ────────────────────────────────────────────────────────────────

/// Keyed session store with time-based expiry.
pub struct Repository {
    conn: Connection,
    ttl: Duration,
}

impl Repository {
    pub fn open(path: &Path, ttl_secs: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self {
            conn,
            ttl: ttl_from_secs(ttl_secs),
        })
    }

    pub fn open_in_memory(ttl_secs: u64) -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            ttl: ttl_from_secs(ttl_secs),
        })
    }

    pub fn run_migrations(&self) -> Result<()> {
        debug!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        Ok(())
    }

    fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_sub_signed(self.ttl).unwrap_or(NaiveDateTime::MIN)
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    /// Insert or replace a session, refreshing its timestamp. Expired
    /// sessions are evicted on every write.
    pub fn put_session(&self, session: &mut Session) -> Result<()> {
        let now = Utc::now().naive_utc();
        self.evict_expired_at(now)?;

        session.updated_at = now;
        let json = serde_json::to_string(&session.records)
            .with_context(|| format!("serialise session {}", session.id))?;

        self.conn
            .execute(
                r#"INSERT INTO sessions (session_id, source_url, records, updated_at)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT (session_id) DO UPDATE SET
                       source_url = excluded.source_url,
                       records    = excluded.records,
                       updated_at = excluded.updated_at"#,
                params![session.id, session.url, json, session.updated_at],
            )
            .with_context(|| format!("store session {}", session.id))?;
        Ok(())
    }

    /// Load a live session; expired or unknown ids give `None`.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let row: Option<(String, String, NaiveDateTime)> = self
            .conn
            .query_row(
                "SELECT source_url, records, updated_at FROM sessions WHERE session_id = ?",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .with_context(|| format!("load session {}", id))?;

        let Some((url, json, updated_at)) = row else {
            return Ok(None);
        };

        if updated_at < self.cutoff(Utc::now().naive_utc()) {
            debug!("Session {} expired", id);
            self.delete_session(id)?;
            return Ok(None);
        }

        let records: RecordSet = serde_json::from_str(&json)
            .with_context(|| format!("decode session {}", id))?;

        Ok(Some(Session {
            id: id.to_string(),
            url,
            records,
            updated_at,
        }))
    }

    /// `true` if a session was removed.
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM sessions WHERE session_id = ?", params![id])?;
        Ok(n > 0)
    }

    pub fn evict_expired(&self) -> Result<usize> {
        self.evict_expired_at(Utc::now().naive_utc())
    }

    fn evict_expired_at(&self, now: NaiveDateTime) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM sessions WHERE updated_at < ?",
            params![self.cutoff(now)],
        )?;
        if n > 0 {
            info!("Evicted {} expired sessions", n);
        }
        Ok(n)
    }

    pub fn session_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM sessions")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }
}

fn ttl_from_secs(secs: u64) -> Duration {
    Duration::seconds(secs.min(u64::from(u32::MAX)) as i64)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
