use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use serde::Deserialize;

use crate::errors::PipelineError;
use crate::odds::{FairOdds, fair_odds};
use crate::registry::{PlayerDirectory, PlayerId, TeamDirectory, TeamId};
use crate::rolling::PointsRule;
use crate::seasons::SeasonTable;

/// Focal-team matches carry ids 1..N in chronological order; the rest of the
/// league lives in a disjoint range starting here.
pub const LEAGUE_ID_BASE: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    HomeWin,
    Draw,
    AwayWin,
}

#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub match_id: u32,
    pub date: NaiveDate,
    pub season: String,
    pub round: Option<i64>,
    pub home_id: TeamId,
    pub away_id: TeamId,
    pub home_goals: u32,
    pub away_goals: u32,
    pub raw_odds: Option<(f64, f64, f64)>,
    pub fair_odds: Option<FairOdds>,
}

impl MatchRecord {
    pub fn result(&self) -> MatchResult {
        if self.home_goals > self.away_goals {
            MatchResult::HomeWin
        } else if self.home_goals < self.away_goals {
            MatchResult::AwayWin
        } else {
            MatchResult::Draw
        }
    }

    pub fn involves(&self, team: TeamId) -> bool {
        self.home_id == team || self.away_id == team
    }

    pub fn is_home(&self, team: TeamId) -> bool {
        self.home_id == team
    }

    pub fn opponent_of(&self, team: TeamId) -> TeamId {
        if self.home_id == team {
            self.away_id
        } else {
            self.home_id
        }
    }

    pub fn goals_for(&self, team: TeamId) -> u32 {
        if self.home_id == team {
            self.home_goals
        } else {
            self.away_goals
        }
    }

    pub fn goals_against(&self, team: TeamId) -> u32 {
        if self.home_id == team {
            self.away_goals
        } else {
            self.home_goals
        }
    }

    pub fn points_for(&self, team: TeamId, rule: PointsRule) -> u32 {
        match (self.result(), self.is_home(team)) {
            (MatchResult::HomeWin, true) | (MatchResult::AwayWin, false) => rule.win,
            (MatchResult::Draw, _) => rule.draw,
            _ => rule.loss,
        }
    }
}

/// One player's line in one focal-team match.
#[derive(Debug, Clone)]
pub struct Appearance {
    pub match_id: u32,
    pub date: NaiveDate,
    pub player_id: PlayerId,
    pub first_squad: bool,
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    pub shots: u32,
    pub shots_on_target: u32,
    pub key_passes: u32,
    pub fouls: u32,
    pub fouled: u32,
    pub editor_rating: Option<f64>,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            match_id INTEGER PRIMARY KEY,
            match_date TEXT NOT NULL,
            season TEXT NOT NULL,
            round INTEGER NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            home_goals INTEGER NOT NULL,
            away_goals INTEGER NOT NULL,
            home_odds REAL NULL,
            draw_odds REAL NULL,
            away_odds REAL NULL,
            home_odds_fair REAL NULL,
            draw_odds_fair REAL NULL,
            away_odds_fair REAL NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(match_date);
        CREATE INDEX IF NOT EXISTS idx_matches_home ON matches(home_team_id);
        CREATE INDEX IF NOT EXISTS idx_matches_away ON matches(away_team_id);

        CREATE TABLE IF NOT EXISTS appearances (
            match_id INTEGER NOT NULL,
            match_date TEXT NOT NULL,
            player_id INTEGER NOT NULL,
            is_first_squad INTEGER NOT NULL,
            player_minutes INTEGER NOT NULL,
            goals INTEGER NOT NULL,
            assists INTEGER NOT NULL,
            shots INTEGER NOT NULL,
            shots_on_target INTEGER NOT NULL,
            key_passes INTEGER NOT NULL,
            fouls INTEGER NOT NULL,
            fouled INTEGER NOT NULL,
            editor_rating REAL NULL,
            PRIMARY KEY (match_id, player_id)
        );
        CREATE INDEX IF NOT EXISTS idx_appearances_player ON appearances(player_id);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_match(conn: &Connection, m: &MatchRecord) -> Result<()> {
    let (ho, dr, ao) = match m.raw_odds {
        Some((h, d, a)) => (Some(h), Some(d), Some(a)),
        None => (None, None, None),
    };
    let (hf, df, af) = match m.fair_odds {
        Some(f) => (Some(f.home), Some(f.draw), Some(f.away)),
        None => (None, None, None),
    };
    conn.execute(
        r#"
        INSERT INTO matches (
            match_id, match_date, season, round,
            home_team_id, away_team_id, home_goals, away_goals,
            home_odds, draw_odds, away_odds,
            home_odds_fair, draw_odds_fair, away_odds_fair
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(match_id) DO UPDATE SET
            match_date = excluded.match_date,
            season = excluded.season,
            round = excluded.round,
            home_team_id = excluded.home_team_id,
            away_team_id = excluded.away_team_id,
            home_goals = excluded.home_goals,
            away_goals = excluded.away_goals,
            home_odds = excluded.home_odds,
            draw_odds = excluded.draw_odds,
            away_odds = excluded.away_odds,
            home_odds_fair = excluded.home_odds_fair,
            draw_odds_fair = excluded.draw_odds_fair,
            away_odds_fair = excluded.away_odds_fair
        "#,
        params![
            m.match_id as i64,
            m.date.to_string(),
            m.season,
            m.round,
            m.home_id as i64,
            m.away_id as i64,
            m.home_goals as i64,
            m.away_goals as i64,
            ho,
            dr,
            ao,
            hf,
            df,
            af,
        ],
    )
    .context("upsert match")?;
    Ok(())
}

pub fn upsert_appearance(conn: &Connection, a: &Appearance) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO appearances (
            match_id, match_date, player_id, is_first_squad, player_minutes,
            goals, assists, shots, shots_on_target, key_passes, fouls, fouled,
            editor_rating
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(match_id, player_id) DO UPDATE SET
            match_date = excluded.match_date,
            is_first_squad = excluded.is_first_squad,
            player_minutes = excluded.player_minutes,
            goals = excluded.goals,
            assists = excluded.assists,
            shots = excluded.shots,
            shots_on_target = excluded.shots_on_target,
            key_passes = excluded.key_passes,
            fouls = excluded.fouls,
            fouled = excluded.fouled,
            editor_rating = excluded.editor_rating
        "#,
        params![
            a.match_id as i64,
            a.date.to_string(),
            a.player_id as i64,
            a.first_squad as i64,
            a.minutes as i64,
            a.goals as i64,
            a.assists as i64,
            a.shots as i64,
            a.shots_on_target as i64,
            a.key_passes as i64,
            a.fouls as i64,
            a.fouled as i64,
            a.editor_rating,
        ],
    )
    .context("upsert appearance")?;
    Ok(())
}

pub fn load_matches(conn: &Connection) -> Result<Vec<MatchRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT match_id, match_date, season, round,
                   home_team_id, away_team_id, home_goals, away_goals,
                   home_odds, draw_odds, away_odds,
                   home_odds_fair, draw_odds_fair, away_odds_fair
            FROM matches
            ORDER BY match_date ASC, match_id ASC
            "#,
        )
        .context("prepare load matches query")?;

    let rows = stmt
        .query_map([], |row| {
            let date_raw: String = row.get(1)?;
            let raw_odds = match (
                row.get::<_, Option<f64>>(8)?,
                row.get::<_, Option<f64>>(9)?,
                row.get::<_, Option<f64>>(10)?,
            ) {
                (Some(h), Some(d), Some(a)) => Some((h, d, a)),
                _ => None,
            };
            let fair = match (
                row.get::<_, Option<f64>>(11)?,
                row.get::<_, Option<f64>>(12)?,
                row.get::<_, Option<f64>>(13)?,
            ) {
                (Some(home), Some(draw), Some(away)) => Some(FairOdds { home, draw, away }),
                _ => None,
            };
            Ok((
                MatchRecord {
                    match_id: row.get::<_, u32>(0)?,
                    date: NaiveDate::default(),
                    season: row.get(2)?,
                    round: row.get(3)?,
                    home_id: row.get::<_, u32>(4)?,
                    away_id: row.get::<_, u32>(5)?,
                    home_goals: row.get::<_, u32>(6)?,
                    away_goals: row.get::<_, u32>(7)?,
                    raw_odds,
                    fair_odds: fair,
                },
                date_raw,
            ))
        })
        .context("query load matches")?;

    let mut out = Vec::new();
    for row in rows {
        let (mut m, date_raw) = row.context("decode match row")?;
        m.date = date_raw
            .parse::<NaiveDate>()
            .with_context(|| format!("bad match_date '{date_raw}' for match {}", m.match_id))?;
        out.push(m);
    }
    Ok(out)
}

pub fn load_appearances(conn: &Connection) -> Result<Vec<Appearance>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT match_id, match_date, player_id, is_first_squad, player_minutes,
                   goals, assists, shots, shots_on_target, key_passes, fouls, fouled,
                   editor_rating
            FROM appearances
            ORDER BY match_date ASC, match_id ASC, player_id ASC
            "#,
        )
        .context("prepare load appearances query")?;

    let rows = stmt
        .query_map([], |row| {
            let date_raw: String = row.get(1)?;
            Ok((
                Appearance {
                    match_id: row.get::<_, u32>(0)?,
                    date: NaiveDate::default(),
                    player_id: row.get::<_, u32>(2)?,
                    first_squad: row.get::<_, i64>(3)? != 0,
                    minutes: row.get::<_, u32>(4)?,
                    goals: row.get::<_, u32>(5)?,
                    assists: row.get::<_, u32>(6)?,
                    shots: row.get::<_, u32>(7)?,
                    shots_on_target: row.get::<_, u32>(8)?,
                    key_passes: row.get::<_, u32>(9)?,
                    fouls: row.get::<_, u32>(10)?,
                    fouled: row.get::<_, u32>(11)?,
                    editor_rating: row.get(12)?,
                },
                date_raw,
            ))
        })
        .context("query load appearances")?;

    let mut out = Vec::new();
    for row in rows {
        let (mut a, date_raw) = row.context("decode appearance row")?;
        a.date = date_raw
            .parse::<NaiveDate>()
            .with_context(|| format!("bad match_date '{date_raw}' in appearances"))?;
        out.push(a);
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct CsvMatchRow {
    #[serde(default)]
    round: Option<i64>,
    match_date: String,
    home_team: String,
    away_team: String,
    home_goals: u32,
    away_goals: u32,
    #[serde(default)]
    home_odds: Option<f64>,
    #[serde(default)]
    draw_odds: Option<f64>,
    #[serde(default)]
    away_odds: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CsvAppearanceRow {
    match_date: String,
    home_team: String,
    away_team: String,
    player_name: String,
    is_first_squad: u8,
    player_minutes: u32,
    goals: u32,
    assists: u32,
    shots: u32,
    shots_on_target: u32,
    key_passes: u32,
    fouls: u32,
    fouled: u32,
    #[serde(default)]
    editor_rating: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestSummary {
    pub matches: usize,
    pub focal_matches: usize,
    pub appearances: usize,
}

/// Parses the ingestion collaborator's match table, resolves names and
/// seasons, derives fair odds, assigns ids (focal 1..N chronologically, the
/// rest from `LEAGUE_ID_BASE`) and upserts everything into sqlite.
pub fn ingest_matches_csv(
    conn: &mut Connection,
    path: &Path,
    teams: &TeamDirectory,
    seasons: &SeasonTable,
    focal_team: TeamId,
) -> Result<IngestSummary> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open match csv {}", path.display()))?;

    let mut parsed: Vec<(CsvMatchRow, NaiveDate, TeamId, TeamId, String)> = Vec::new();
    for row in reader.deserialize::<CsvMatchRow>() {
        let row = row.context("decode match csv row")?;
        let date = row
            .match_date
            .parse::<NaiveDate>()
            .map_err(|_| PipelineError::input(format!("bad match_date '{}'", row.match_date)))?;
        let home = teams.resolve(&row.home_team)?;
        let away = teams.resolve(&row.away_team)?;
        if home == away {
            return Err(PipelineError::input(format!(
                "match on {date} has identical home and away team '{}'",
                row.home_team
            ))
            .into());
        }
        let season = seasons
            .season_of(date)
            .ok_or_else(|| {
                PipelineError::input(format!("match date {date} falls outside every season"))
            })?
            .tag
            .clone();
        parsed.push((row, date, home, away, season));
    }

    // Ids are only meaningful once the whole table is in chronological order.
    parsed.sort_by(|a, b| a.1.cmp(&b.1));

    let mut summary = IngestSummary::default();
    let mut next_focal: u32 = 1;
    let mut next_league: u32 = LEAGUE_ID_BASE;

    let tx = conn.transaction().context("begin ingest transaction")?;
    for (row, date, home, away, season) in parsed {
        let is_focal = home == focal_team || away == focal_team;
        let match_id = if is_focal {
            let id = next_focal;
            next_focal += 1;
            id
        } else {
            let id = next_league;
            next_league += 1;
            id
        };

        let raw = match (row.home_odds, row.draw_odds, row.away_odds) {
            (Some(h), Some(d), Some(a)) => Some((h, d, a)),
            _ if is_focal => {
                return Err(PipelineError::data(
                    match_id,
                    format!("focal-team match on {date} is missing raw odds"),
                )
                .into());
            }
            _ => None,
        };
        let fair = match raw {
            Some((h, d, a)) => Some(fair_odds(h, d, a).map_err(|e| match e {
                PipelineError::Input { reason } => PipelineError::Data { match_id, reason },
                other => other,
            })?),
            None => None,
        };

        let record = MatchRecord {
            match_id,
            date,
            season,
            round: row.round,
            home_id: home,
            away_id: away,
            home_goals: row.home_goals,
            away_goals: row.away_goals,
            raw_odds: raw,
            fair_odds: fair,
        };
        upsert_match(&tx, &record)?;
        summary.matches += 1;
        if is_focal {
            summary.focal_matches += 1;
        }
    }
    tx.commit().context("commit ingest transaction")?;
    Ok(summary)
}

/// Parses the per-player appearance table and joins each row to its focal
/// match by (date, home, away). Appearances for unknown fixtures are a hard
/// error: an orphaned line means the two input tables disagree.
pub fn ingest_appearances_csv(
    conn: &mut Connection,
    path: &Path,
    teams: &TeamDirectory,
    players: &PlayerDirectory,
) -> Result<usize> {
    let matches = load_matches(conn)?;
    let mut by_fixture: HashMap<(NaiveDate, TeamId, TeamId), u32> = HashMap::new();
    for m in &matches {
        by_fixture.insert((m.date, m.home_id, m.away_id), m.match_id);
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open appearance csv {}", path.display()))?;

    let mut count = 0usize;
    let tx = conn.transaction().context("begin appearance transaction")?;
    for row in reader.deserialize::<CsvAppearanceRow>() {
        let row = row.context("decode appearance csv row")?;
        let date = row
            .match_date
            .parse::<NaiveDate>()
            .map_err(|_| PipelineError::input(format!("bad match_date '{}'", row.match_date)))?;
        let home = teams.resolve(&row.home_team)?;
        let away = teams.resolve(&row.away_team)?;
        let match_id = by_fixture.get(&(date, home, away)).copied().ok_or_else(|| {
            PipelineError::input(format!(
                "appearance row for unknown fixture {} vs {} on {date}",
                row.home_team, row.away_team
            ))
        })?;
        let appearance = Appearance {
            match_id,
            date,
            player_id: players.resolve(&row.player_name)?,
            first_squad: row.is_first_squad != 0,
            minutes: row.player_minutes,
            goals: row.goals,
            assists: row.assists,
            shots: row.shots,
            shots_on_target: row.shots_on_target,
            key_passes: row.key_passes,
            fouls: row.fouls,
            fouled: row.fouled,
            editor_rating: row.editor_rating,
        };
        upsert_appearance(&tx, &appearance)?;
        count += 1;
    }
    tx.commit().context("commit appearance transaction")?;
    Ok(count)
}

/// Immutable, chronologically ordered view of everything the pipeline may
/// read. Built once after loading completes; no mutation afterwards, so the
/// per-row feature computations can fan out freely over shared references.
#[derive(Debug)]
pub struct Snapshot {
    matches: Vec<MatchRecord>,
    appearances: Vec<Appearance>,
    by_team: HashMap<TeamId, Vec<usize>>,
    by_player: HashMap<PlayerId, Vec<usize>>,
    pub seasons: SeasonTable,
    pub teams: TeamDirectory,
    pub players: PlayerDirectory,
}

impl Snapshot {
    pub fn new(
        mut matches: Vec<MatchRecord>,
        mut appearances: Vec<Appearance>,
        seasons: SeasonTable,
        teams: TeamDirectory,
        players: PlayerDirectory,
        focal_team: TeamId,
    ) -> Result<Self, PipelineError> {
        matches.sort_by(|a, b| a.date.cmp(&b.date).then(a.match_id.cmp(&b.match_id)));
        appearances.sort_by(|a, b| a.date.cmp(&b.date).then(a.match_id.cmp(&b.match_id)));

        let mut seen_ids = HashSet::new();
        let mut expected_focal: u32 = 1;
        for m in &matches {
            if !seen_ids.insert(m.match_id) {
                return Err(PipelineError::data(m.match_id, "duplicate match id"));
            }
            if m.home_id == m.away_id {
                return Err(PipelineError::data(
                    m.match_id,
                    "home and away team ids are identical",
                ));
            }
            if m.match_id < LEAGUE_ID_BASE {
                if !m.involves(focal_team) {
                    return Err(PipelineError::data(
                        m.match_id,
                        "focal id range used by a non-focal match",
                    ));
                }
                if m.match_id != expected_focal {
                    return Err(PipelineError::data(
                        m.match_id,
                        format!("focal match ids not 1..N chronological (expected {expected_focal})"),
                    ));
                }
                expected_focal += 1;
            } else if m.involves(focal_team) {
                return Err(PipelineError::data(
                    m.match_id,
                    "focal-team match assigned to league id range",
                ));
            }
        }

        let mut by_team: HashMap<TeamId, Vec<usize>> = HashMap::new();
        for (idx, m) in matches.iter().enumerate() {
            by_team.entry(m.home_id).or_default().push(idx);
            by_team.entry(m.away_id).or_default().push(idx);
        }
        let mut by_player: HashMap<PlayerId, Vec<usize>> = HashMap::new();
        for (idx, a) in appearances.iter().enumerate() {
            by_player.entry(a.player_id).or_default().push(idx);
        }

        Ok(Self {
            matches,
            appearances,
            by_team,
            by_player,
            seasons,
            teams,
            players,
        })
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn appearances(&self) -> &[Appearance] {
        &self.appearances
    }

    /// All of `team`'s matches strictly before `before`, ascending.
    pub fn team_matches_before(&self, team: TeamId, before: NaiveDate) -> Vec<&MatchRecord> {
        let Some(indexes) = self.by_team.get(&team) else {
            return Vec::new();
        };
        indexes
            .iter()
            .map(|&i| &self.matches[i])
            .filter(|m| m.date < before)
            .collect()
    }

    /// The last `n` of `team`'s matches strictly before `before`, most recent
    /// first. Fewer than `n` exist: returns what is there.
    pub fn last_n_for(&self, team: TeamId, before: NaiveDate, n: usize) -> Vec<&MatchRecord> {
        let mut prior = self.team_matches_before(team, before);
        prior.reverse();
        prior.truncate(n);
        prior
    }

    /// All of `team`'s matches in `[window_start, before)`, ascending.
    pub fn team_matches_in(
        &self,
        team: TeamId,
        window_start: NaiveDate,
        before: NaiveDate,
    ) -> Vec<&MatchRecord> {
        self.team_matches_before(team, before)
            .into_iter()
            .filter(|m| m.date >= window_start)
            .collect()
    }

    /// Focal-team matches in chronological order.
    pub fn focal_matches(&self) -> impl Iterator<Item = &MatchRecord> {
        self.matches.iter().filter(|m| m.match_id < LEAGUE_ID_BASE)
    }

    pub fn appearances_for_match(&self, match_id: u32) -> Vec<&Appearance> {
        self.appearances
            .iter()
            .filter(|a| a.match_id == match_id)
            .collect()
    }

    /// A player's appearances strictly before `before`, ascending.
    pub fn player_apps_before(&self, player: PlayerId, before: NaiveDate) -> Vec<&Appearance> {
        let Some(indexes) = self.by_player.get(&player) else {
            return Vec::new();
        };
        indexes
            .iter()
            .map(|&i| &self.appearances[i])
            .filter(|a| a.date < before)
            .collect()
    }

    pub fn player_apps_in(
        &self,
        player: PlayerId,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Vec<&Appearance> {
        let Some(indexes) = self.by_player.get(&player) else {
            return Vec::new();
        };
        indexes
            .iter()
            .map(|&i| &self.appearances[i])
            .filter(|a| a.date >= window_start && a.date <= window_end)
            .collect()
    }

    /// Teams that played at least one match with the given season tag.
    pub fn teams_in_season(&self, tag: &str) -> HashSet<TeamId> {
        let mut out = HashSet::new();
        for m in self.matches.iter().filter(|m| m.season == tag) {
            out.insert(m.home_id);
            out.insert(m.away_id);
        }
        out
    }

    pub fn match_by_id(&self, match_id: u32) -> Option<&MatchRecord> {
        self.matches.iter().find(|m| m.match_id == match_id)
    }
}
