use std::collections::HashSet;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use football_etl::config::{ApiConfig, StoreConfig};
use football_etl::extract::{
    self, ExtractionSummary, MAJOR_COMPETITION_IDS, PipelineSummary,
};
use football_etl::football_api::FootballApiClient;
use football_etl::loader::Loader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Competitions,
    CompetitionData,
    All,
}

impl Task {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "competitions" => Some(Task::Competitions),
            "competition-data" | "major-competitions" => Some(Task::CompetitionData),
            "all" => Some(Task::All),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "data extraction failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let task = match arg_value("--task") {
        Some(raw) => Task::parse(&raw).ok_or_else(|| anyhow!("unknown task {raw:?}"))?,
        None => Task::All,
    };
    let json = std::env::args().skip(1).any(|arg| arg == "--json");

    let api_config = ApiConfig::from_env().context("read api configuration")?;
    let store_config = arg_value("--db")
        .map(StoreConfig::file)
        .unwrap_or_else(StoreConfig::from_env);
    let competition_ids = arg_value("--competition-ids")
        .or_else(|| std::env::var("FOOTBALL_COMPETITION_IDS").ok())
        .map(|raw| parse_ids(&raw))
        .filter(|ids| !ids.is_empty())
        .unwrap_or_else(|| MAJOR_COMPETITION_IDS.to_vec());

    let client = FootballApiClient::new(&api_config).context("build api client")?;
    let mut loader = Loader::open(&store_config).context("open raw store")?;

    match task {
        Task::Competitions => {
            let count = extract::extract_competitions(&client, &mut loader)?;
            println!("Competitions loaded: {count}");
        }
        Task::CompetitionData => {
            let details = extract::extract_competition_data(&client, &mut loader, &competition_ids);
            report_details(&details, json)?;
        }
        Task::All => {
            let summary = extract::run_pipeline(&client, &mut loader, &competition_ids)?;
            report_pipeline(&summary, json)?;
        }
    }

    info!("data extraction completed");
    Ok(())
}

fn report_pipeline(summary: &PipelineSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("Competitions loaded: {}", summary.competitions);
    report_details(&summary.details, false)
}

fn report_details(details: &ExtractionSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(details)?);
        return Ok(());
    }
    println!(
        "Competition details: {}/{} succeeded",
        details.loaded.len(),
        details.attempted()
    );
    for item in &details.loaded {
        println!(
            "competition {}: teams={} standings={} matches={}",
            item.competition_id, item.teams, item.standings, item.matches
        );
    }
    if !details.failed.is_empty() {
        println!("Errors: {}", details.failed.len());
        for failure in &details.failed {
            println!(" - competition {}: {}", failure.competition_id, failure.error);
        }
    }
    Ok(())
}

fn arg_value(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_ids(raw: &str) -> Vec<u32> {
    let mut seen = HashSet::new();
    raw.split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .filter(|id| *id != 0 && seen.insert(*id))
        .collect()
}
