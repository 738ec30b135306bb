use std::time::{Duration, Instant};
use tracing::info;
use url::Url;

/// Logs how long a labelled step took when dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("⏱  Finished: {} (took {:.2?})", self.label, self.elapsed());
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(input: &str) -> Option<Url> {
    let url = Url::parse(input.trim()).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    (web && url.host_str().is_some_and(|h| !h.is_empty())).then_some(url)
}

/// `payment_data_<domain>_<first 8 of session id>.csv`
pub fn export_file_name(source_url: &str, session_id: &str) -> String {
    let domain = Url::parse(source_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    let short: String = session_id.chars().take(8).collect();
    format!("payment_data_{}_{}.csv", domain, short)
}
