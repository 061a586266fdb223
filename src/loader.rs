//! SQLite loader for the four raw tables.
//!
//! The configured database is attached as schema `raw`. Competitions, teams
//! and matches are merged by natural id; standings are replaced wholesale per
//! (competition, season) scope. Each `load_*` call is one transaction.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Statement, params};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{Database, StoreConfig};
use crate::error::LoadError;
use crate::records::{self, Extracted, StandingsSnapshot};

const SCHEMA: &str = r#"
PRAGMA raw.journal_mode = WAL;

CREATE TABLE IF NOT EXISTS raw.competitions (
    id INTEGER PRIMARY KEY,
    name TEXT NULL,
    code TEXT NULL,
    "type" TEXT NULL,
    emblem TEXT NULL,
    area_name TEXT NULL,
    area_code TEXT NULL,
    current_season TEXT NULL,   -- json
    raw_data TEXT NOT NULL,     -- json
    extracted_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS raw.teams (
    id INTEGER PRIMARY KEY,
    name TEXT NULL,
    short_name TEXT NULL,
    tla TEXT NULL,
    crest TEXT NULL,
    address TEXT NULL,
    website TEXT NULL,
    founded INTEGER NULL,
    club_colors TEXT NULL,
    venue TEXT NULL,
    raw_data TEXT NOT NULL,
    extracted_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS raw.matches (
    id INTEGER PRIMARY KEY,
    competition_id INTEGER NULL,
    season_id INTEGER NULL,
    utc_date TEXT NULL,
    status TEXT NULL,
    matchday INTEGER NULL,
    stage TEXT NULL,
    "group" TEXT NULL,
    home_team_id INTEGER NULL,
    home_team_name TEXT NULL,
    away_team_id INTEGER NULL,
    away_team_name TEXT NULL,
    winner TEXT NULL,
    duration TEXT NULL,
    full_time_home INTEGER NULL,
    full_time_away INTEGER NULL,
    half_time_home INTEGER NULL,
    half_time_away INTEGER NULL,
    raw_data TEXT NOT NULL,
    extracted_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS raw.idx_matches_competition ON matches(competition_id);
CREATE INDEX IF NOT EXISTS raw.idx_matches_utc_date ON matches(utc_date);

-- No stable per-row key upstream; rows are replaced per (competition_id, season_id).
CREATE TABLE IF NOT EXISTS raw.standings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    competition_id INTEGER NOT NULL,
    season_id INTEGER NULL,
    stage TEXT NULL,
    "type" TEXT NULL,
    "group" TEXT NULL,
    team_id INTEGER NULL,
    team_name TEXT NULL,
    position INTEGER NULL,
    played_games INTEGER NULL,
    won INTEGER NULL,
    draw INTEGER NULL,
    lost INTEGER NULL,
    points INTEGER NULL,
    goals_for INTEGER NULL,
    goals_against INTEGER NULL,
    goal_difference INTEGER NULL,
    raw_data TEXT NOT NULL,
    extracted_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS raw.idx_standings_scope
    ON standings(competition_id, season_id, stage, "type", "group", team_id);
"#;

const UPSERT_COMPETITION: &str = r#"
INSERT INTO raw.competitions (
    id, name, code, "type", emblem, area_name, area_code,
    current_season, raw_data, extracted_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(id) DO UPDATE SET
    name = excluded.name,
    code = excluded.code,
    "type" = excluded."type",
    emblem = excluded.emblem,
    area_name = excluded.area_name,
    area_code = excluded.area_code,
    current_season = excluded.current_season,
    raw_data = excluded.raw_data,
    extracted_at = max(extracted_at, excluded.extracted_at)
"#;

const UPSERT_TEAM: &str = r#"
INSERT INTO raw.teams (
    id, name, short_name, tla, crest, address, website,
    founded, club_colors, venue, raw_data, extracted_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
ON CONFLICT(id) DO UPDATE SET
    name = excluded.name,
    short_name = excluded.short_name,
    tla = excluded.tla,
    crest = excluded.crest,
    address = excluded.address,
    website = excluded.website,
    founded = excluded.founded,
    club_colors = excluded.club_colors,
    venue = excluded.venue,
    raw_data = excluded.raw_data,
    extracted_at = max(extracted_at, excluded.extracted_at)
"#;

const UPSERT_MATCH: &str = r#"
INSERT INTO raw.matches (
    id, competition_id, season_id, utc_date, status, matchday, stage, "group",
    home_team_id, home_team_name, away_team_id, away_team_name,
    winner, duration, full_time_home, full_time_away, half_time_home, half_time_away,
    raw_data, extracted_at
) VALUES (
    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
    ?9, ?10, ?11, ?12,
    ?13, ?14, ?15, ?16, ?17, ?18,
    ?19, ?20
)
ON CONFLICT(id) DO UPDATE SET
    competition_id = excluded.competition_id,
    season_id = excluded.season_id,
    utc_date = excluded.utc_date,
    status = excluded.status,
    matchday = excluded.matchday,
    stage = excluded.stage,
    "group" = excluded."group",
    home_team_id = excluded.home_team_id,
    home_team_name = excluded.home_team_name,
    away_team_id = excluded.away_team_id,
    away_team_name = excluded.away_team_name,
    winner = excluded.winner,
    duration = excluded.duration,
    full_time_home = excluded.full_time_home,
    full_time_away = excluded.full_time_away,
    half_time_home = excluded.half_time_home,
    half_time_away = excluded.half_time_away,
    raw_data = excluded.raw_data,
    extracted_at = max(extracted_at, excluded.extracted_at)
"#;

const INSERT_STANDING: &str = r#"
INSERT INTO raw.standings (
    competition_id, season_id, stage, "type", "group", team_id, team_name,
    position, played_games, won, draw, lost, points,
    goals_for, goals_against, goal_difference, raw_data, extracted_at
) VALUES (
    ?1, ?2, ?3, ?4, ?5, ?6, ?7,
    ?8, ?9, ?10, ?11, ?12, ?13,
    ?14, ?15, ?16, ?17, ?18
)
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Competitions,
    Teams,
    Matches,
    Standings,
}

impl Table {
    pub fn qualified_name(self) -> &'static str {
        match self {
            Table::Competitions => "raw.competitions",
            Table::Teams => "raw.teams",
            Table::Matches => "raw.matches",
            Table::Standings => "raw.standings",
        }
    }
}

/// A standings row as read back from `raw.standings`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStanding {
    pub competition_id: i64,
    pub season_id: Option<i64>,
    pub stage: Option<String>,
    pub kind: Option<String>,
    pub group: Option<String>,
    pub team_id: Option<i64>,
    pub position: Option<i64>,
    pub points: Option<i64>,
    pub extracted_at: String,
}

pub struct Loader {
    conn: Connection,
    batches_committed: u64,
}

impl Loader {
    pub fn open(config: &StoreConfig) -> Result<Self, LoadError> {
        if let Database::File(path) = &config.database
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| LoadError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let target = config.attach_target();
        let conn = Connection::open_in_memory()?;
        conn.execute("ATTACH DATABASE ?1 AS raw", params![target])
            .map_err(|source| LoadError::Open {
                path: target.clone().into(),
                source,
            })?;
        init_schema(&conn)?;
        info!(database = %target, "raw schema ready");

        Ok(Self {
            conn,
            batches_committed: 0,
        })
    }

    /// Ad-hoc read access for downstream consumers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of `load_*` transactions committed by this loader.
    pub fn batches_committed(&self) -> u64 {
        self.batches_committed
    }

    pub fn load_competitions(&mut self, items: &[Value]) -> Result<usize, LoadError> {
        let rows = flatten("competitions", items, records::competition);
        self.upsert_by_id("competitions", UPSERT_COMPETITION, &rows, |stmt, c, at| {
            let r = &c.record;
            let current_season = r
                .current_season
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            stmt.execute(params![
                r.id,
                r.name,
                r.code,
                r.kind,
                r.emblem,
                r.area_name,
                r.area_code,
                current_season,
                serde_json::to_string(&c.raw)?,
                at,
            ])?;
            Ok(())
        })
    }

    pub fn load_teams(&mut self, items: &[Value]) -> Result<usize, LoadError> {
        let rows = flatten("teams", items, records::team);
        self.upsert_by_id("teams", UPSERT_TEAM, &rows, |stmt, t, at| {
            let r = &t.record;
            stmt.execute(params![
                r.id,
                r.name,
                r.short_name,
                r.tla,
                r.crest,
                r.address,
                r.website,
                r.founded,
                r.club_colors,
                r.venue,
                serde_json::to_string(&t.raw)?,
                at,
            ])?;
            Ok(())
        })
    }

    pub fn load_matches(&mut self, items: &[Value]) -> Result<usize, LoadError> {
        let rows = flatten("matches", items, records::fixture);
        self.upsert_by_id("matches", UPSERT_MATCH, &rows, |stmt, m, at| {
            let r = &m.record;
            stmt.execute(params![
                r.id,
                r.competition_id,
                r.season_id,
                r.utc_date,
                r.status.as_ref().map(|s| s.as_str()),
                r.matchday,
                r.stage,
                r.group,
                r.home_team_id,
                r.home_team_name,
                r.away_team_id,
                r.away_team_name,
                r.winner,
                r.duration,
                r.full_time.home,
                r.full_time.away,
                r.half_time.home,
                r.half_time.away,
                serde_json::to_string(&m.raw)?,
                at,
            ])?;
            Ok(())
        })
    }

    pub fn load_standings(&mut self, payload: &Value, competition_id: i64) -> Result<usize, LoadError> {
        let snapshot = records::standings(payload, competition_id);
        if snapshot.rows.is_empty() {
            warn!(competition_id, "no standings to load");
            return Ok(0);
        }
        self.replace_standings_scope(&snapshot)
    }

    pub fn row_count(&self, table: Table) -> Result<i64, LoadError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.qualified_name());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    pub fn standings_for(
        &self,
        competition_id: i64,
        season_id: Option<i64>,
    ) -> Result<Vec<StoredStanding>, LoadError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT competition_id, season_id, stage, "type", "group",
                   team_id, position, points, extracted_at
            FROM raw.standings
            WHERE competition_id = ?1 AND season_id IS ?2
            ORDER BY stage, "type", "group", position, id
            "#,
        )?;
        let rows = stmt.query_map(params![competition_id, season_id], |row| {
            Ok(StoredStanding {
                competition_id: row.get(0)?,
                season_id: row.get(1)?,
                stage: row.get(2)?,
                kind: row.get(3)?,
                group: row.get(4)?,
                team_id: row.get(5)?,
                position: row.get(6)?,
                points: row.get(7)?,
                extracted_at: row.get(8)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Merge-by-key: insert new ids, overwrite every non-key column of
    /// existing ones. `extracted_at` never moves backwards.
    fn upsert_by_id<T>(
        &mut self,
        entity: &'static str,
        sql: &str,
        rows: &[Extracted<T>],
        mut exec: impl FnMut(&mut Statement<'_>, &Extracted<T>, &str) -> Result<(), LoadError>,
    ) -> Result<usize, LoadError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let extracted_at = load_timestamp();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(sql)?;
            for row in rows {
                exec(&mut stmt, row, &extracted_at)?;
            }
        }
        tx.commit()?;
        self.batches_committed += 1;

        info!(entity, count = rows.len(), "loaded");
        Ok(rows.len())
    }

    /// Replace-by-scope: drop every row of (competition, season) and insert
    /// the snapshot in the same transaction.
    fn replace_standings_scope(&mut self, snapshot: &StandingsSnapshot) -> Result<usize, LoadError> {
        let tx = self.conn.transaction()?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT MAX(extracted_at) FROM raw.standings WHERE competition_id = ?1 AND season_id IS ?2",
                params![snapshot.competition_id, snapshot.season_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
        let now = load_timestamp();
        let extracted_at = match previous {
            Some(prev) if prev > now => prev,
            _ => now,
        };

        let deleted = tx.execute(
            "DELETE FROM raw.standings WHERE competition_id = ?1 AND season_id IS ?2",
            params![snapshot.competition_id, snapshot.season_id],
        )?;
        {
            let mut stmt = tx.prepare_cached(INSERT_STANDING)?;
            for row in &snapshot.rows {
                let r = &row.record;
                stmt.execute(params![
                    r.competition_id,
                    r.season_id,
                    r.stage,
                    r.kind,
                    r.group,
                    r.team_id,
                    r.team_name,
                    r.position,
                    r.played_games,
                    r.won,
                    r.draw,
                    r.lost,
                    r.points,
                    r.goals_for,
                    r.goals_against,
                    r.goal_difference,
                    serde_json::to_string(&row.raw)?,
                    extracted_at,
                ])?;
            }
        }
        tx.commit()?;
        self.batches_committed += 1;

        info!(
            competition_id = snapshot.competition_id,
            season_id = snapshot.season_id,
            replaced = deleted,
            count = snapshot.rows.len(),
            "loaded standings"
        );
        Ok(snapshot.rows.len())
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), LoadError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn flatten<T>(
    entity: &'static str,
    items: &[Value],
    map: impl Fn(&Value) -> Option<Extracted<T>>,
) -> Vec<Extracted<T>> {
    if items.is_empty() {
        warn!(entity, "nothing to load");
        return Vec::new();
    }
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match map(item) {
            Some(row) => out.push(row),
            None => warn!(entity, "skipping record without a numeric id"),
        }
    }
    out
}

/// Fixed-width UTC so stored timestamps order lexically.
fn load_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::{Loader, Table, load_timestamp};
    use crate::config::StoreConfig;

    #[test]
    fn schema_creation_is_idempotent() {
        let loader = Loader::open(&StoreConfig::in_memory()).expect("open");
        super::init_schema(loader.connection()).expect("second init");
        assert_eq!(loader.row_count(Table::Standings).expect("count"), 0);
    }

    #[test]
    fn load_timestamp_is_fixed_width() {
        let ts = load_timestamp();
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000000Z".len());
        assert!(ts.ends_with('Z'));
    }
}
