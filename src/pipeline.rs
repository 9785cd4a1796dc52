use anyhow::Context;
use chrono::Utc;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::db::Store;
use crate::extract::{self, ExtractorRules};
use crate::firecrawl::{FirecrawlClient, MarkdownSource};
use crate::models::EventCandidate;

/// Serializes scrape runs so a manual trigger cannot interleave its
/// clear-then-upsert sequence with the scheduled one.
static RUN_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Caller-visible result of one scrape run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ScrapeOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            events_count: None,
            timestamp: None,
        }
    }
}

/// What reconciliation did. `processed` counts every candidate handed in,
/// including duplicates that collapsed onto one row.
#[derive(Debug)]
pub struct ReconcileSummary {
    pub processed: usize,
    pub errors: Vec<String>,
}

/// Replace the store's contents with `candidates`: clear everything, then
/// upsert each record in input order. A failed clear aborts the run; a
/// failed upsert is recorded and the rest of the batch still lands.
pub fn reconcile(
    store: &Store,
    candidates: &[EventCandidate],
    scraped_at: i64,
) -> anyhow::Result<ReconcileSummary> {
    let removed = store.clear_events().context("clearing previous events")?;
    if removed > 0 {
        info!(removed, "cleared previous events");
    }

    let mut errors = Vec::new();
    for candidate in candidates {
        if let Err(err) = store.upsert_event(candidate, scraped_at) {
            warn!(url = %candidate.url, %err, "failed to persist event");
            errors.push(format!("{}: {err}", candidate.url));
        }
    }

    Ok(ReconcileSummary {
        processed: candidates.len(),
        errors,
    })
}

/// One full scrape of the configured calendar. Guard failures come back as a
/// failure outcome rather than an error; nothing is cleared until a
/// non-empty document is in hand.
pub async fn run_scrape(config: &AppConfig) -> ScrapeOutcome {
    let client = match FirecrawlClient::from_config(config) {
        Ok(client) => client,
        Err(err) => {
            error!(%err, "firecrawl client unavailable");
            return ScrapeOutcome::failure(format!(
                "{err}. Set it in the environment before running"
            ));
        }
    };
    run_with_source(&client, config).await
}

/// Same as [`run_scrape`] but with the content source injected.
pub async fn run_with_source(source: &dyn MarkdownSource, config: &AppConfig) -> ScrapeOutcome {
    let _guard = RUN_LOCK.lock().await;

    info!(url = %config.calendar_url, "starting calendar scrape");

    let markdown = match source.fetch_markdown(&config.calendar_url).await {
        Ok(markdown) => markdown,
        Err(err) => {
            error!(%err, "content fetch failed");
            return ScrapeOutcome::failure(format!("Scraping failed: {err}"));
        }
    };

    let markdown = match markdown {
        Some(markdown) if !markdown.trim().is_empty() => markdown,
        _ => {
            error!("scrape returned no markdown");
            return ScrapeOutcome::failure("No content scraped");
        }
    };

    info!(bytes = markdown.len(), "fetched calendar markdown");

    let candidates = extract::extract_events(&markdown, &ExtractorRules::default());
    info!(count = candidates.len(), "extracted event candidates");

    let scraped_at = Utc::now().timestamp_millis();
    let db_path = config.database_path.clone();
    let joined = tokio::task::spawn_blocking(move || -> anyhow::Result<ReconcileSummary> {
        let store = Store::open(&db_path).context("opening event store")?;
        reconcile(&store, &candidates, scraped_at)
    })
    .await;

    let summary = match joined {
        Ok(Ok(summary)) => summary,
        Ok(Err(err)) => {
            error!(err = %format!("{err:#}"), "reconciliation failed");
            return ScrapeOutcome::failure(format!("Reconciliation failed: {err:#}"));
        }
        Err(err) => {
            error!(%err, "store task did not complete");
            return ScrapeOutcome::failure(format!("Store task failed: {err}"));
        }
    };

    let message = if summary.errors.is_empty() {
        format!("Scraped and inserted {} events", summary.processed)
    } else {
        format!(
            "Scraped and inserted {} events ({} failed: {})",
            summary.processed - summary.errors.len(),
            summary.errors.len(),
            summary.errors.join("; ")
        )
    };
    info!(
        events = summary.processed,
        errors = summary.errors.len(),
        "scrape complete"
    );

    ScrapeOutcome {
        success: true,
        message,
        events_count: Some(summary.processed),
        timestamp: Some(scraped_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firecrawl::{FirecrawlError, DEFAULT_ENDPOINT};
    use crate::models::{Category, PersistedEvent, SOURCE_LUMA};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};

    enum CannedSource {
        Markdown(&'static str),
        Empty,
        Failing,
    }

    #[async_trait]
    impl MarkdownSource for CannedSource {
        async fn fetch_markdown(&self, _url: &str) -> Result<Option<String>, FirecrawlError> {
            match self {
                CannedSource::Markdown(markdown) => Ok(Some((*markdown).to_string())),
                CannedSource::Empty => Ok(Some(String::new())),
                CannedSource::Failing => {
                    Err(FirecrawlError::Http("connection refused".to_string()))
                }
            }
        }
    }

    fn candidate(url: &str) -> EventCandidate {
        EventCandidate {
            name: "AI Agents Hackathon".to_string(),
            date: Some("December 5, 2025".to_string()),
            time: Some("6:00 PM".to_string()),
            location: Some("Encode Hub".to_string()),
            url: url.to_string(),
            image_url: None,
            category: Category::Hackathon,
            source: SOURCE_LUMA.to_string(),
        }
    }

    fn test_config(db_path: &Path) -> AppConfig {
        AppConfig {
            firecrawl_api_key: Some("fc-test".to_string()),
            firecrawl_endpoint: DEFAULT_ENDPOINT.to_string(),
            calendar_url: "https://luma.com/thehackcollective?k=c".to_string(),
            database_path: db_path.to_path_buf(),
        }
    }

    fn temp_db(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "hack-scrape-test-{tag}-{}.sqlite",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn normalized(store: &Store) -> Vec<PersistedEvent> {
        let mut events = store.list_all().unwrap();
        for event in &mut events {
            event.scraped_at = 0;
        }
        events
    }

    #[test]
    fn reconcile_replaces_previous_contents() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_event(&candidate("https://luma.com/stale-event"), 1)
            .unwrap();

        let fresh = vec![candidate("https://luma.com/fresh-event")];
        let summary = reconcile(&store, &fresh, 2).unwrap();

        assert_eq!(summary.processed, 1);
        assert!(summary.errors.is_empty());
        assert!(store
            .find_by_url("https://luma.com/stale-event")
            .unwrap()
            .is_none());
        assert!(store
            .find_by_url("https://luma.com/fresh-event")
            .unwrap()
            .is_some());
    }

    #[test]
    fn reconcile_twice_leaves_identical_state() {
        let store = Store::open_in_memory().unwrap();
        let batch = vec![
            candidate("https://luma.com/agents-night"),
            candidate("https://luma.com/winter-demo"),
        ];

        reconcile(&store, &batch, 100).unwrap();
        let first_pass = normalized(&store);
        reconcile(&store, &batch, 200).unwrap();
        let second_pass = normalized(&store);

        assert_eq!(first_pass, second_pass);
        assert_eq!(first_pass.len(), 2);
    }

    #[test]
    fn duplicate_urls_collapse_but_count_raw() {
        let store = Store::open_in_memory().unwrap();
        let mut renamed = candidate("https://luma.com/agents-night");
        renamed.name = "AI Agents Hackathon (Final Call)".to_string();
        let batch = vec![candidate("https://luma.com/agents-night"), renamed];

        let summary = reconcile(&store, &batch, 1).unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(store.count_events().unwrap(), 1);
        let row = store
            .find_by_url("https://luma.com/agents-night")
            .unwrap()
            .unwrap();
        assert_eq!(row.name, "AI Agents Hackathon (Final Call)");
    }

    #[test]
    fn failed_upsert_does_not_stop_the_batch() {
        let store = Store::open_in_memory().unwrap();
        store
            .raw_conn()
            .execute_batch(
                "CREATE TRIGGER reject_one BEFORE INSERT ON events
                 WHEN NEW.url = 'https://luma.com/poisoned' BEGIN
                     SELECT RAISE(ABORT, 'rejected by trigger');
                 END;",
            )
            .unwrap();

        let batch = vec![
            candidate("https://luma.com/first"),
            candidate("https://luma.com/poisoned"),
            candidate("https://luma.com/second"),
        ];
        let summary = reconcile(&store, &batch, 1).unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("poisoned"));
        assert_eq!(store.count_events().unwrap(), 2);
        assert!(store
            .find_by_url("https://luma.com/second")
            .unwrap()
            .is_some());
    }

    #[test]
    fn failed_clear_aborts_the_run() {
        let store = Store::open_in_memory().unwrap();
        store.raw_conn().execute_batch("DROP TABLE events;").unwrap();

        let err = reconcile(&store, &[candidate("https://luma.com/x")], 1).unwrap_err();
        assert!(format!("{err:#}").contains("clearing previous events"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_touching_the_store() {
        let db_path = temp_db("missing-key");
        let mut config = test_config(&db_path);
        config.firecrawl_api_key = None;

        let outcome = run_scrape(&config).await;

        assert!(!outcome.success);
        assert!(outcome.message.contains("FIRECRAWL_API_KEY"));
        assert_eq!(outcome.events_count, None);
        assert!(!db_path.exists());
    }

    #[tokio::test]
    async fn empty_document_leaves_existing_events_alone() {
        let db_path = temp_db("empty-doc");
        {
            let store = Store::open(&db_path).unwrap();
            store
                .upsert_event(&candidate("https://luma.com/survivor"), 1)
                .unwrap();
        }

        let config = test_config(&db_path);
        let outcome = run_with_source(&CannedSource::Empty, &config).await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "No content scraped");

        let store = Store::open(&db_path).unwrap();
        assert_eq!(store.count_events().unwrap(), 1);
        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_existing_events_alone() {
        let db_path = temp_db("fetch-fail");
        {
            let store = Store::open(&db_path).unwrap();
            store
                .upsert_event(&candidate("https://luma.com/survivor"), 1)
                .unwrap();
        }

        let config = test_config(&db_path);
        let outcome = run_with_source(&CannedSource::Failing, &config).await;

        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Scraping failed"));

        let store = Store::open(&db_path).unwrap();
        assert_eq!(store.count_events().unwrap(), 1);
        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn full_run_persists_extracted_events() {
        const CALENDAR: &str = "\
Dec 5
[AI Agents Hackathon: London Edition](https://luma.com/ai-agents-london)
6:00 PM
Encode Hub
Hackathon
Dec 7
[Founders & Coffee](https://luma.com/founders-coffee)
9:30 AM
London, England
Non-Hackathon
";
        let db_path = temp_db("full-run");
        let config = test_config(&db_path);

        let outcome = run_with_source(&CannedSource::Markdown(CALENDAR), &config).await;

        assert!(outcome.success);
        assert_eq!(outcome.message, "Scraped and inserted 2 events");
        assert_eq!(outcome.events_count, Some(2));
        assert!(outcome.timestamp.is_some());

        let store = Store::open(&db_path).unwrap();
        assert_eq!(store.count_events().unwrap(), 2);
        let row = store
            .find_by_url("https://luma.com/ai-agents-london")
            .unwrap()
            .unwrap();
        assert_eq!(row.category, Category::Hackathon);
        assert_eq!(row.date.as_deref(), Some("December 5, 2025"));
        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn outcome_serializes_camel_case_without_empty_fields() {
        let failure = ScrapeOutcome::failure("No content scraped");
        assert_eq!(
            serde_json::to_string(&failure).unwrap(),
            r#"{"success":false,"message":"No content scraped"}"#
        );

        let success = ScrapeOutcome {
            success: true,
            message: "Scraped and inserted 2 events".to_string(),
            events_count: Some(2),
            timestamp: Some(1_700_000_000_000),
        };
        let json = serde_json::to_string(&success).unwrap();
        assert!(json.contains("\"eventsCount\":2"));
        assert!(json.contains("\"timestamp\":1700000000000"));
    }
}
