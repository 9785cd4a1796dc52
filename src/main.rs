use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hack_scrape::config::AppConfig;
use hack_scrape::db::Store;
use hack_scrape::extract::{self, ExtractorRules};
use hack_scrape::models::{Category, PersistedEvent};
use hack_scrape::pipeline;
use hack_scrape::scheduler;

#[derive(Parser)]
#[command(name = "hack-scrape", about = "Luma calendar scraper for hackathon listings", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape the calendar once and replace the stored events.
    Run,
    /// Keep running, scraping once a day at a fixed UTC time.
    Serve {
        /// Hour of day, UTC.
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: u32,
        /// Minute within the hour.
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..60))]
        minute: u32,
    },
    /// Print the stored events.
    List {
        /// Only events in this category.
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
        /// Emit JSON instead of the text listing.
        #[arg(long)]
        json: bool,
    },
    /// Extract events from a saved markdown file and print them as JSON.
    Parse {
        /// Path to a markdown capture of the calendar page.
        file: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CategoryArg {
    Hackathon,
    NonHackathon,
}

impl From<CategoryArg> for Category {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Hackathon => Category::Hackathon,
            CategoryArg::NonHackathon => Category::NonHackathon,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hack_scrape=info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = AppConfig::from_env();

    match cli.command {
        Command::Run => {
            config.log_summary();
            let outcome = pipeline::run_scrape(&config).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Serve { hour, minute } => {
            config.log_summary();
            scheduler::run_daily(config, hour, minute).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List { category, json } => {
            let db_path = config.database_path.clone();
            let events = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
                let store = Store::open(&db_path).context("opening event store")?;
                let events = match category {
                    Some(category) => store.list_by_category(category.into())?,
                    None => store.list_all()?,
                };
                Ok(events)
            })
            .await??;

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("no events stored");
            } else {
                for event in &events {
                    println!("{}", render_event(event));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Parse { file } => {
            let markdown = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let candidates = extract::extract_events(&markdown, &ExtractorRules::default());
            println!("{}", serde_json::to_string_pretty(&candidates)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn render_event(event: &PersistedEvent) -> String {
    let mut parts = vec![format!("[{}] {}", event.category, event.name)];
    if let Some(date) = &event.date {
        parts.push(date.clone());
    }
    if let Some(time) = &event.time {
        parts.push(time.clone());
    }
    if let Some(location) = &event.location {
        parts.push(location.clone());
    }
    parts.push(event.url.clone());
    parts.join(" | ")
}
