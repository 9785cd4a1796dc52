use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::pipeline;

/// The next occurrence of `hour:minute` UTC strictly after `now`. A call at
/// exactly the scheduled instant rolls over to the next day.
pub fn next_run_after(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let candidate = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .expect("schedule time within a day")
        .and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + chrono::Duration::days(1)
    }
}

/// Scrape once a day at the given UTC time, forever. A failed run is logged
/// and the loop keeps going; a missed slot is not replayed.
pub async fn run_daily(config: AppConfig, hour: u32, minute: u32) -> anyhow::Result<()> {
    anyhow::ensure!(
        hour < 24 && minute < 60,
        "schedule time {hour:02}:{minute:02} is out of range"
    );

    info!(hour, minute, "daily scrape schedule armed");

    loop {
        let now = Utc::now();
        let next = next_run_after(now, hour, minute);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(next_run = %next, wait_secs = wait.as_secs(), "sleeping until next scheduled scrape");
        tokio::time::sleep(wait).await;

        let outcome = pipeline::run_scrape(&config).await;
        if outcome.success {
            info!(message = %outcome.message, "scheduled scrape finished");
        } else {
            error!(message = %outcome.message, "scheduled scrape failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_is_later_today_when_the_slot_is_ahead() {
        let now = Utc.with_ymd_and_hms(2025, 12, 5, 10, 30, 0).unwrap();
        assert_eq!(
            next_run_after(now, 23, 15),
            Utc.with_ymd_and_hms(2025, 12, 5, 23, 15, 0).unwrap()
        );
    }

    #[test]
    fn next_run_rolls_to_tomorrow_at_or_after_the_slot() {
        let at_slot = Utc.with_ymd_and_hms(2025, 12, 5, 0, 0, 0).unwrap();
        assert_eq!(
            next_run_after(at_slot, 0, 0),
            Utc.with_ymd_and_hms(2025, 12, 6, 0, 0, 0).unwrap()
        );

        let past_slot = Utc.with_ymd_and_hms(2025, 12, 5, 0, 0, 1).unwrap();
        assert_eq!(
            next_run_after(past_slot, 0, 0),
            Utc.with_ymd_and_hms(2025, 12, 6, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_run_crosses_month_and_year_ends() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 5, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, 0, 0),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn out_of_range_schedule_is_rejected() {
        let config = crate::config::AppConfig {
            firecrawl_api_key: None,
            firecrawl_endpoint: "https://api.firecrawl.dev/v1".to_string(),
            calendar_url: "https://luma.com/thehackcollective?k=c".to_string(),
            database_path: std::path::PathBuf::from("unused.sqlite"),
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let err = runtime.block_on(run_daily(config, 24, 0)).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
