use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Page fetching
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Session store
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Spreadsheet export
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/sessions.duckdb")
}
fn default_session_ttl_secs() -> u64 {
    2 * 60 * 60
}
fn default_true() -> bool {
    true
}
fn default_out_dir() -> PathBuf {
    PathBuf::from("exports")
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            session_ttl_secs: default_session_ttl_secs(),
            run_migrations: true,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("PAYREC").separator("__"))
            .build()?;

        let app_cfg = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Ignoring malformed configuration ({}), using defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_sections_fall_back_to_field_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[scraper]\ntimeout_secs = 5\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.scraper.timeout_secs, 5);
        assert!(cfg.scraper.user_agent.starts_with("Mozilla/5.0"));
        assert_eq!(cfg.storage.session_ttl_secs, 7200);
        assert_eq!(cfg.export.out_dir, PathBuf::from("exports"));
    }
}
