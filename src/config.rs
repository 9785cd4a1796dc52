use std::env;
use std::path::PathBuf;

use tracing::info;

use crate::firecrawl;
use crate::utils;

pub const DEFAULT_CALENDAR_URL: &str = "https://luma.com/thehackcollective?k=c";

/// Runtime configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Secret for the Firecrawl content source. Its presence is checked when
    /// a scrape starts, not at load time, so `list` and `parse` work without
    /// it.
    pub firecrawl_api_key: Option<String>,
    pub firecrawl_endpoint: String,
    pub calendar_url: String,
    pub database_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            firecrawl_api_key: env::var("FIRECRAWL_API_KEY").ok(),
            firecrawl_endpoint: env::var("FIRECRAWL_ENDPOINT")
                .unwrap_or_else(|_| firecrawl::DEFAULT_ENDPOINT.to_string()),
            calendar_url: env::var("LUMA_CALENDAR_URL")
                .unwrap_or_else(|_| DEFAULT_CALENDAR_URL.to_string()),
            database_path: env::var("HACK_SCRAPE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| utils::database_path()),
        }
    }

    /// Log the effective configuration without exposing the secret.
    pub fn log_summary(&self) {
        info!(
            calendar_url = %self.calendar_url,
            database = %self.database_path.display(),
            endpoint = %self.firecrawl_endpoint,
            api_key = if self.firecrawl_api_key.is_some() { "set" } else { "missing" },
            "configuration loaded"
        );
    }
}
