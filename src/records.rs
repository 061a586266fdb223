//! Flattening of raw API objects into table records.
//!
//! Every nested lookup tolerates absence: a missing object or key becomes
//! `None` and ends up as NULL in the table. The only hard requirement is a
//! numeric natural id for competitions, teams and matches.

use serde_json::Value;

/// A flattened record together with the payload it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub record: T,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompetitionRecord {
    pub id: i64,
    pub name: Option<String>,
    pub code: Option<String>,
    pub kind: Option<String>,
    pub emblem: Option<String>,
    pub area_name: Option<String>,
    pub area_code: Option<String>,
    pub current_season: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecord {
    pub id: i64,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub tla: Option<String>,
    pub crest: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub founded: Option<i64>,
    pub club_colors: Option<String>,
    pub venue: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScorePair {
    pub home: Option<i64>,
    pub away: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub id: i64,
    pub competition_id: Option<i64>,
    pub season_id: Option<i64>,
    pub utc_date: Option<String>,
    pub status: Option<MatchStatus>,
    pub matchday: Option<i64>,
    pub stage: Option<String>,
    pub group: Option<String>,
    pub home_team_id: Option<i64>,
    pub home_team_name: Option<String>,
    pub away_team_id: Option<i64>,
    pub away_team_name: Option<String>,
    pub winner: Option<String>,
    pub duration: Option<String>,
    pub full_time: ScorePair,
    pub half_time: ScorePair,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StandingRecord {
    pub competition_id: i64,
    pub season_id: Option<i64>,
    pub stage: Option<String>,
    pub kind: Option<String>,
    pub group: Option<String>,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub position: Option<i64>,
    pub played_games: Option<i64>,
    pub won: Option<i64>,
    pub draw: Option<i64>,
    pub lost: Option<i64>,
    pub points: Option<i64>,
    pub goals_for: Option<i64>,
    pub goals_against: Option<i64>,
    pub goal_difference: Option<i64>,
}

/// All table rows of one standings payload, scoped to a competition and season.
#[derive(Debug, Clone, PartialEq)]
pub struct StandingsSnapshot {
    pub competition_id: i64,
    pub season_id: Option<i64>,
    pub rows: Vec<Extracted<StandingRecord>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    Scheduled,
    Timed,
    Live,
    InPlay,
    Paused,
    ExtraTime,
    PenaltyShootout,
    Finished,
    Suspended,
    Postponed,
    Cancelled,
    Awarded,
    Other(String),
}

impl MatchStatus {
    /// Exact match on the API's spelling; anything else is kept as delivered.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "SCHEDULED" => Self::Scheduled,
            "TIMED" => Self::Timed,
            "LIVE" => Self::Live,
            "IN_PLAY" => Self::InPlay,
            "PAUSED" => Self::Paused,
            "EXTRA_TIME" => Self::ExtraTime,
            "PENALTY_SHOOTOUT" => Self::PenaltyShootout,
            "FINISHED" => Self::Finished,
            "SUSPENDED" => Self::Suspended,
            "POSTPONED" => Self::Postponed,
            "CANCELLED" => Self::Cancelled,
            "AWARDED" => Self::Awarded,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Timed => "TIMED",
            Self::Live => "LIVE",
            Self::InPlay => "IN_PLAY",
            Self::Paused => "PAUSED",
            Self::ExtraTime => "EXTRA_TIME",
            Self::PenaltyShootout => "PENALTY_SHOOTOUT",
            Self::Finished => "FINISHED",
            Self::Suspended => "SUSPENDED",
            Self::Postponed => "POSTPONED",
            Self::Cancelled => "CANCELLED",
            Self::Awarded => "AWARDED",
            Self::Other(raw) => raw,
        }
    }
}

pub fn competition(v: &Value) -> Option<Extracted<CompetitionRecord>> {
    let record = CompetitionRecord {
        id: v.get("id").and_then(as_i64_any)?,
        name: str_at(v, &["name"]),
        code: str_at(v, &["code"]),
        kind: str_at(v, &["type"]),
        emblem: str_at(v, &["emblem"]),
        area_name: str_at(v, &["area", "name"]),
        area_code: str_at(v, &["area", "code"]),
        current_season: v.get("currentSeason").filter(|s| !s.is_null()).cloned(),
    };
    Some(Extracted {
        record,
        raw: v.clone(),
    })
}

pub fn team(v: &Value) -> Option<Extracted<TeamRecord>> {
    let record = TeamRecord {
        id: v.get("id").and_then(as_i64_any)?,
        name: str_at(v, &["name"]),
        short_name: str_at(v, &["shortName"]),
        tla: str_at(v, &["tla"]),
        crest: str_at(v, &["crest"]),
        address: str_at(v, &["address"]),
        website: str_at(v, &["website"]),
        founded: int_at(v, &["founded"]),
        club_colors: str_at(v, &["clubColors"]),
        venue: str_at(v, &["venue"]),
    };
    Some(Extracted {
        record,
        raw: v.clone(),
    })
}

pub fn fixture(v: &Value) -> Option<Extracted<MatchRecord>> {
    let record = MatchRecord {
        id: v.get("id").and_then(as_i64_any)?,
        competition_id: int_at(v, &["competition", "id"]),
        season_id: int_at(v, &["season", "id"]),
        utc_date: str_at(v, &["utcDate"]),
        status: str_at(v, &["status"]).map(|s| MatchStatus::parse(&s)),
        matchday: int_at(v, &["matchday"]),
        stage: str_at(v, &["stage"]),
        group: str_at(v, &["group"]),
        home_team_id: int_at(v, &["homeTeam", "id"]),
        home_team_name: str_at(v, &["homeTeam", "name"]),
        away_team_id: int_at(v, &["awayTeam", "id"]),
        away_team_name: str_at(v, &["awayTeam", "name"]),
        winner: str_at(v, &["score", "winner"]),
        duration: str_at(v, &["score", "duration"]),
        full_time: score_pair(v, "fullTime"),
        half_time: score_pair(v, "halfTime"),
    };
    Some(Extracted {
        record,
        raw: v.clone(),
    })
}

pub fn standings(payload: &Value, competition_id: i64) -> StandingsSnapshot {
    let season_id = int_at(payload, &["season", "id"]);
    let mut rows = Vec::new();
    let blocks = payload
        .get("standings")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    for block in blocks {
        let stage = str_at(block, &["stage"]);
        let kind = str_at(block, &["type"]);
        let group = str_at(block, &["group"]);
        let table = block
            .get("table")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();

        for entry in table {
            let record = StandingRecord {
                competition_id,
                season_id,
                stage: stage.clone(),
                kind: kind.clone(),
                group: group.clone(),
                team_id: int_at(entry, &["team", "id"]),
                team_name: str_at(entry, &["team", "name"]),
                position: int_at(entry, &["position"]),
                played_games: int_at(entry, &["playedGames"]),
                won: int_at(entry, &["won"]),
                draw: int_at(entry, &["draw"]),
                lost: int_at(entry, &["lost"]),
                points: int_at(entry, &["points"]),
                goals_for: int_at(entry, &["goalsFor"]),
                goals_against: int_at(entry, &["goalsAgainst"]),
                goal_difference: int_at(entry, &["goalDifference"]),
            };
            rows.push(Extracted {
                record,
                raw: entry.clone(),
            });
        }
    }

    StandingsSnapshot {
        competition_id,
        season_id,
        rows,
    }
}

fn score_pair(v: &Value, half: &str) -> ScorePair {
    ScorePair {
        home: int_at(v, &["score", half, "home"]),
        away: int_at(v, &["score", half, "away"]),
    }
}

fn lookup<'a>(v: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = v;
    for key in path {
        cur = cur.get(*key)?;
    }
    if cur.is_null() { None } else { Some(cur) }
}

fn str_at(v: &Value, path: &[&str]) -> Option<String> {
    lookup(v, path)?.as_str().map(|s| s.to_string())
}

fn int_at(v: &Value, path: &[&str]) -> Option<i64> {
    lookup(v, path).and_then(as_i64_any)
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{as_i64_any, fixture, standings, team, MatchStatus};

    #[test]
    fn numeric_strings_are_accepted_as_ids() {
        assert_eq!(as_i64_any(&json!("57")), Some(57));
        assert_eq!(as_i64_any(&json!(57)), Some(57));
        assert_eq!(as_i64_any(&json!("abc")), None);
    }

    #[test]
    fn team_without_id_is_skipped() {
        assert!(team(&json!({"name": "Nameless FC"})).is_none());
    }

    #[test]
    fn fixture_scores_flatten() {
        let m = fixture(&json!({
            "id": 10,
            "status": "IN_PLAY",
            "score": {
                "winner": null,
                "duration": "REGULAR",
                "fullTime": {"home": 1, "away": 0},
                "halfTime": {"home": 0}
            }
        }))
        .expect("has id");
        assert_eq!(m.record.status, Some(MatchStatus::InPlay));
        assert_eq!(m.record.full_time.home, Some(1));
        assert_eq!(m.record.full_time.away, Some(0));
        assert_eq!(m.record.half_time.home, Some(0));
        assert_eq!(m.record.half_time.away, None);
        assert_eq!(m.record.winner, None);
        assert_eq!(m.record.duration.as_deref(), Some("REGULAR"));
    }

    #[test]
    fn unknown_status_is_kept_verbatim() {
        let status = MatchStatus::parse("ABANDONED");
        assert_eq!(status, MatchStatus::Other("ABANDONED".to_string()));
        assert_eq!(status.as_str(), "ABANDONED");
    }

    #[test]
    fn status_spelling_is_not_normalized() {
        let status = MatchStatus::parse("finished");
        assert_eq!(status, MatchStatus::Other("finished".to_string()));
        assert_eq!(status.as_str(), "finished");
        assert_eq!(MatchStatus::parse(" FINISHED").as_str(), " FINISHED");
    }

    #[test]
    fn standings_without_blocks_is_empty() {
        let snap = standings(&json!({"season": {"id": 7}}), 2021);
        assert_eq!(snap.season_id, Some(7));
        assert!(snap.rows.is_empty());
    }
}
