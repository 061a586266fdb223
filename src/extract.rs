//! Sequencing of API fetches into loader writes.
//!
//! `extract_competitions` loads the catalog and fails loudly.
//! `extract_competition_data` walks competition ids one at a time; whatever
//! goes wrong for one id is logged, recorded in the summary, and the loop
//! moves on.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::error::FetchError;
use crate::football_api::{FootballApiClient, MatchFilter};
use crate::loader::Loader;

/// Premier League, La Liga, Bundesliga, Serie A, Ligue 1, Champions League,
/// Europa League.
pub const MAJOR_COMPETITION_IDS: &[u32] = &[2021, 2014, 2002, 2019, 2015, 2001, 2146];

pub const MATCH_WINDOW_DAYS: i64 = 30;

/// The subset of the API the orchestrator needs.
pub trait FootballSource {
    fn competitions(&self) -> Result<Vec<Value>, FetchError>;
    fn teams(&self, competition_id: u32) -> Result<Vec<Value>, FetchError>;
    fn standings(&self, competition_id: u32) -> Result<Value, FetchError>;
    fn matches(&self, competition_id: u32, filter: &MatchFilter) -> Result<Vec<Value>, FetchError>;
}

impl FootballSource for FootballApiClient {
    fn competitions(&self) -> Result<Vec<Value>, FetchError> {
        self.list_competitions()
    }

    fn teams(&self, competition_id: u32) -> Result<Vec<Value>, FetchError> {
        self.list_teams(competition_id, None)
    }

    fn standings(&self, competition_id: u32) -> Result<Value, FetchError> {
        self.get_standings(competition_id, None)
    }

    fn matches(&self, competition_id: u32, filter: &MatchFilter) -> Result<Vec<Value>, FetchError> {
        self.list_matches(competition_id, filter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchWindow {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

impl MatchWindow {
    /// `days` before through `days` after the date of `now`.
    pub fn around(now: DateTime<Utc>, days: i64) -> Self {
        let today = now.date_naive();
        let span = ChronoDuration::days(days);
        Self {
            date_from: today - span,
            date_to: today + span,
        }
    }

    pub fn filter(&self) -> MatchFilter {
        MatchFilter::between(self.date_from, self.date_to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompetitionLoad {
    pub competition_id: u32,
    pub teams: usize,
    pub standings: usize,
    pub matches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompetitionFailure {
    pub competition_id: u32,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub loaded: Vec<CompetitionLoad>,
    pub failed: Vec<CompetitionFailure>,
}

impl ExtractionSummary {
    pub fn attempted(&self) -> usize {
        self.loaded.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub competitions: usize,
    pub details: ExtractionSummary,
}

pub fn extract_competitions(source: &impl FootballSource, loader: &mut Loader) -> Result<usize> {
    info!("extracting competitions");
    let competitions = source.competitions().context("fetch competitions")?;
    let count = loader
        .load_competitions(&competitions)
        .context("load competitions")?;
    info!(count, "extracted and loaded competitions");
    Ok(count)
}

/// Never fails: per-competition errors end up in `ExtractionSummary::failed`.
pub fn extract_competition_data(
    source: &impl FootballSource,
    loader: &mut Loader,
    competition_ids: &[u32],
) -> ExtractionSummary {
    let window = MatchWindow::around(Utc::now(), MATCH_WINDOW_DAYS);
    let mut summary = ExtractionSummary::default();

    for &competition_id in competition_ids {
        info!(competition_id, "extracting competition data");
        match extract_one(source, loader, competition_id, &window) {
            Ok(load) => summary.loaded.push(load),
            Err(err) => {
                let message = format!("{err:#}");
                error!(competition_id, error = %message, "competition extraction failed");
                summary.failed.push(CompetitionFailure {
                    competition_id,
                    error: message,
                });
            }
        }
    }

    info!(
        loaded = summary.loaded.len(),
        failed = summary.failed.len(),
        "competition data extraction finished"
    );
    summary
}

/// Catalog first, then details. Only a catalog failure is an error.
pub fn run_pipeline(
    source: &impl FootballSource,
    loader: &mut Loader,
    competition_ids: &[u32],
) -> Result<PipelineSummary> {
    let competitions = extract_competitions(source, loader)?;
    let details = extract_competition_data(source, loader, competition_ids);
    Ok(PipelineSummary {
        competitions,
        details,
    })
}

fn extract_one(
    source: &impl FootballSource,
    loader: &mut Loader,
    competition_id: u32,
    window: &MatchWindow,
) -> Result<CompetitionLoad> {
    let db_id = i64::from(competition_id);

    let teams = source.teams(competition_id).context("fetch teams")?;
    let teams = loader.load_teams(&teams).context("load teams")?;
    info!(competition_id, count = teams, "loaded teams");

    let standings = source.standings(competition_id).context("fetch standings")?;
    let standings = loader
        .load_standings(&standings, db_id)
        .context("load standings")?;
    info!(competition_id, count = standings, "loaded standings");

    let matches = source
        .matches(competition_id, &window.filter())
        .context("fetch matches")?;
    let matches = loader.load_matches(&matches).context("load matches")?;
    info!(competition_id, count = matches, "loaded matches");

    Ok(CompetitionLoad {
        competition_id,
        teams,
        standings,
        matches,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::MatchWindow;

    #[test]
    fn match_window_spans_both_directions() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 23, 59, 0).unwrap();
        let window = MatchWindow::around(now, 30);
        assert_eq!(window.date_from, NaiveDate::from_ymd_opt(2024, 2, 14).unwrap());
        assert_eq!(window.date_to, NaiveDate::from_ymd_opt(2024, 4, 14).unwrap());
    }

    #[test]
    fn match_window_filter_has_dates_only() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 6, 0, 0).unwrap();
        let filter = MatchWindow::around(now, 30).filter();
        assert_eq!(filter.date_from, NaiveDate::from_ymd_opt(2023, 12, 11));
        assert_eq!(filter.date_to, NaiveDate::from_ymd_opt(2024, 2, 9));
        assert!(filter.season.is_none());
        assert!(filter.status.is_none());
    }
}
