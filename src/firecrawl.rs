use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::AppConfig;

pub const DEFAULT_ENDPOINT: &str = "https://api.firecrawl.dev/v1";

#[derive(Debug, Error)]
pub enum FirecrawlError {
    #[error("FIRECRAWL_API_KEY is not set")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("firecrawl api error: {0}")]
    Api(String),
}

/// Anything that can turn a page URL into rendered markdown. The pipeline
/// only sees this seam, so tests can substitute canned documents for the
/// hosted service.
#[async_trait]
pub trait MarkdownSource: Send + Sync {
    /// Fetch the page as markdown. `Ok(None)` means the request succeeded
    /// but the response carried no markdown body.
    async fn fetch_markdown(&self, url: &str) -> Result<Option<String>, FirecrawlError>;
}

/// Client for the hosted Firecrawl scrape API, which renders JavaScript
/// pages and returns their main content as markdown.
pub struct FirecrawlClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
}

impl FirecrawlClient {
    /// Build a client from the loaded configuration. Fails up front when the
    /// API key is absent or blank so no run gets as far as clearing data.
    pub fn from_config(config: &AppConfig) -> Result<Self, FirecrawlError> {
        let api_key = config
            .firecrawl_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(FirecrawlError::MissingApiKey)?
            .to_string();

        Ok(Self {
            api_key,
            base_url: config.firecrawl_endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        })
    }

    async fn scrape_markdown(&self, url: &str) -> Result<Option<String>, FirecrawlError> {
        let endpoint = format!("{}/scrape", self.base_url);
        let payload = serde_json::json!({
            "url": url,
            "formats": ["markdown"],
            "onlyMainContent": true,
        });

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| FirecrawlError::Http(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| FirecrawlError::Http(err.to_string()))?;

        if !status.is_success() {
            return Err(FirecrawlError::Api(format!("HTTP {status}: {body}")));
        }

        let parsed: ScrapeResponse =
            serde_json::from_str(&body).map_err(|err| FirecrawlError::Api(err.to_string()))?;

        if !parsed.success {
            return Err(FirecrawlError::Api(
                parsed
                    .error
                    .unwrap_or_else(|| "scrape reported failure".to_string()),
            ));
        }

        Ok(parsed.data.and_then(|data| data.markdown))
    }
}

#[async_trait]
impl MarkdownSource for FirecrawlClient {
    async fn fetch_markdown(&self, url: &str) -> Result<Option<String>, FirecrawlError> {
        self.scrape_markdown(url).await
    }
}
