use std::cell::RefCell;
use std::collections::HashSet;

use chrono::{Duration, Utc};
use serde_json::{Value, json};

use football_etl::config::StoreConfig;
use football_etl::error::FetchError;
use football_etl::extract::{
    FootballSource, extract_competition_data, extract_competitions, run_pipeline,
};
use football_etl::football_api::MatchFilter;
use football_etl::loader::{Loader, Table};

#[derive(Default)]
struct FakeSource {
    failing: HashSet<u32>,
    catalog_down: bool,
    calls: RefCell<Vec<String>>,
    filters: RefCell<Vec<MatchFilter>>,
}

impl FakeSource {
    fn failing(ids: &[u32]) -> Self {
        Self {
            failing: ids.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn check(&self, what: &str, competition_id: u32) -> Result<(), FetchError> {
        self.calls
            .borrow_mut()
            .push(format!("{what}:{competition_id}"));
        if self.failing.contains(&competition_id) {
            return Err(FetchError::Status {
                path: format!("competitions/{competition_id}/{what}"),
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(())
    }
}

impl FootballSource for FakeSource {
    fn competitions(&self) -> Result<Vec<Value>, FetchError> {
        if self.catalog_down {
            return Err(FetchError::Status {
                path: "competitions".to_string(),
                status: 403,
                body: "forbidden".to_string(),
            });
        }
        Ok(vec![
            json!({"id": 2021, "name": "Premier League", "area": {"name": "England"}}),
            json!({"id": 2014, "name": "Primera Division"}),
        ])
    }

    fn teams(&self, competition_id: u32) -> Result<Vec<Value>, FetchError> {
        self.check("teams", competition_id)?;
        let base = i64::from(competition_id) * 10;
        Ok(vec![
            json!({"id": base + 1, "name": format!("Club {}", base + 1)}),
            json!({"id": base + 2, "name": format!("Club {}", base + 2)}),
        ])
    }

    fn standings(&self, competition_id: u32) -> Result<Value, FetchError> {
        self.check("standings", competition_id)?;
        let base = i64::from(competition_id) * 10;
        Ok(json!({
            "season": {"id": 2024},
            "standings": [{
                "stage": "REGULAR_SEASON", "type": "TOTAL", "group": null,
                "table": [
                    {"position": 1, "team": {"id": base + 1}, "points": 30},
                    {"position": 2, "team": {"id": base + 2}, "points": 28}
                ]
            }]
        }))
    }

    fn matches(&self, competition_id: u32, filter: &MatchFilter) -> Result<Vec<Value>, FetchError> {
        self.check("matches", competition_id)?;
        self.filters.borrow_mut().push(filter.clone());
        let base = i64::from(competition_id) * 1000;
        Ok(vec![json!({
            "id": base + 1,
            "competition": {"id": competition_id},
            "status": "SCHEDULED"
        })])
    }
}

fn open() -> Loader {
    Loader::open(&StoreConfig::in_memory()).expect("in-memory store should open")
}

#[test]
fn failing_competition_does_not_abort_the_batch() {
    let source = FakeSource::failing(&[2014]);
    let mut loader = open();

    let summary = extract_competition_data(&source, &mut loader, &[2021, 2014, 2002]);

    assert_eq!(summary.attempted(), 3);
    let loaded = summary
        .loaded
        .iter()
        .map(|l| l.competition_id)
        .collect::<Vec<_>>();
    assert_eq!(loaded, vec![2021, 2002]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].competition_id, 2014);
    assert!(summary.failed[0].error.contains("fetch teams"));

    assert_eq!(loader.row_count(Table::Teams).expect("count"), 4);
    assert_eq!(loader.row_count(Table::Matches).expect("count"), 2);
    assert_eq!(loader.standings_for(2021, Some(2024)).expect("rows").len(), 2);
    assert_eq!(loader.standings_for(2002, Some(2024)).expect("rows").len(), 2);
    assert!(loader.standings_for(2014, Some(2024)).expect("rows").is_empty());

    let calls = source.calls.borrow();
    assert!(calls.contains(&"matches:2002".to_string()));
    assert!(!calls.contains(&"standings:2014".to_string()));
}

#[test]
fn each_competition_loads_teams_standings_and_matches_in_order() {
    let source = FakeSource::default();
    let mut loader = open();

    let summary = extract_competition_data(&source, &mut loader, &[2021]);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.loaded[0].teams, 2);
    assert_eq!(summary.loaded[0].standings, 2);
    assert_eq!(summary.loaded[0].matches, 1);
    assert_eq!(
        source.calls.borrow().as_slice(),
        &["teams:2021", "standings:2021", "matches:2021"]
    );
}

#[test]
fn match_window_is_thirty_days_either_side_of_today() {
    let source = FakeSource::default();
    let mut loader = open();
    let today = Utc::now().date_naive();

    extract_competition_data(&source, &mut loader, &[2021]);

    let filters = source.filters.borrow();
    let filter = &filters[0];
    let from = filter.date_from.expect("date_from set");
    let to = filter.date_to.expect("date_to set");
    assert_eq!(to - from, Duration::days(60));
    // Tolerate a midnight rollover between `today` and the extraction.
    assert!(from == today - Duration::days(30) || from == today - Duration::days(29));
}

#[test]
fn competition_catalog_is_loaded() {
    let source = FakeSource::default();
    let mut loader = open();
    assert_eq!(extract_competitions(&source, &mut loader).expect("catalog"), 2);
    assert_eq!(loader.row_count(Table::Competitions).expect("count"), 2);
}

#[test]
fn catalog_failure_fails_the_pipeline_before_details() {
    let source = FakeSource {
        catalog_down: true,
        ..FakeSource::default()
    };
    let mut loader = open();

    let err = run_pipeline(&source, &mut loader, &[2021]).unwrap_err();
    assert!(format!("{err:#}").contains("fetch competitions"));
    assert!(source.calls.borrow().is_empty());
    assert_eq!(loader.row_count(Table::Teams).expect("count"), 0);
}

#[test]
fn pipeline_swallows_detail_failures() {
    let source = FakeSource::failing(&[2021, 2014]);
    let mut loader = open();

    let summary = run_pipeline(&source, &mut loader, &[2021, 2014]).expect("catalog succeeded");
    assert_eq!(summary.competitions, 2);
    assert!(summary.details.loaded.is_empty());
    assert_eq!(summary.details.failed.len(), 2);
}
