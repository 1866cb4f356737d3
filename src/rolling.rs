use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::registry::TeamId;
use crate::store::{MatchRecord, Snapshot};

/// League scoring rule. La Liga's 3/1/0 is the default; the rule is threaded
/// through explicitly so a historical two-point league can reuse the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PointsRule {
    pub win: u32,
    pub draw: u32,
    pub loss: u32,
}

impl Default for PointsRule {
    fn default() -> Self {
        Self {
            win: 3,
            draw: 1,
            loss: 0,
        }
    }
}

/// What a rolling window averages per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    GoalsScored,
    GoalsConceded,
    Points,
    GoalDiff,
    /// The opponent's season-to-date points per match, judged as of each
    /// window match's own date. Measures schedule strength without peeking.
    OpponentPpm,
}

fn metric_value(
    snapshot: &Snapshot,
    team: TeamId,
    m: &MatchRecord,
    metric: Metric,
    rule: PointsRule,
) -> Option<f64> {
    match metric {
        Metric::GoalsScored => Some(m.goals_for(team) as f64),
        Metric::GoalsConceded => Some(m.goals_against(team) as f64),
        Metric::Points => Some(m.points_for(team, rule) as f64),
        Metric::GoalDiff => Some(m.goals_for(team) as f64 - m.goals_against(team) as f64),
        Metric::OpponentPpm => season_to_date(snapshot, m.opponent_of(team), m.date, Metric::Points, rule),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean of `metric` over up to `n` of `team`'s matches strictly before
/// `as_of`. `None` only when the team has no prior matches at all; fewer than
/// `n` prior matches average over what exists.
pub fn last_n(
    snapshot: &Snapshot,
    team: TeamId,
    as_of: NaiveDate,
    n: usize,
    metric: Metric,
    rule: PointsRule,
) -> Option<f64> {
    let window = snapshot.last_n_for(team, as_of, n);
    let values: Vec<f64> = window
        .iter()
        .filter_map(|m| metric_value(snapshot, team, m, metric, rule))
        .collect();
    mean(&values)
}

/// Mean of `metric` over `team`'s strictly-prior matches within the season
/// containing `as_of`. Resets fully at the season boundary: a match on the
/// opening day sees an empty window and returns `None`.
pub fn season_to_date(
    snapshot: &Snapshot,
    team: TeamId,
    as_of: NaiveDate,
    metric: Metric,
    rule: PointsRule,
) -> Option<f64> {
    let season = snapshot.seasons.season_of(as_of)?;
    let window = snapshot.team_matches_in(team, season.start, as_of);
    let values: Vec<f64> = window
        .iter()
        .filter_map(|m| metric_value(snapshot, team, m, metric, rule))
        .collect();
    mean(&values)
}

/// Points per match from the start of the season before `as_of`'s season up to
/// (strictly before) `as_of`. This long window is what tier classification and
/// the season-opener fallback read.
pub fn prior_season_ppm(
    snapshot: &Snapshot,
    team: TeamId,
    as_of: NaiveDate,
    rule: PointsRule,
) -> Option<f64> {
    let season = snapshot.seasons.season_of(as_of)?;
    let prev = snapshot.seasons.previous(&season.tag)?;
    let window = snapshot.team_matches_in(team, prev.start, as_of);
    let values: Vec<f64> = window
        .iter()
        .map(|m| m.points_for(team, rule) as f64)
        .collect();
    mean(&values)
}

/// PPM over exactly the matches carrying `tag`'s season label and dated
/// strictly before `as_of`. Unlike `prior_season_ppm` this never crosses a
/// season boundary.
pub fn season_ppm_of(
    snapshot: &Snapshot,
    team: TeamId,
    tag: &str,
    as_of: NaiveDate,
    rule: PointsRule,
) -> Option<f64> {
    let values: Vec<f64> = snapshot
        .team_matches_before(team, as_of)
        .into_iter()
        .filter(|m| m.season == tag)
        .map(|m| m.points_for(team, rule) as f64)
        .collect();
    mean(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PlayerDirectory, TeamDirectory, TeamEntry};
    use crate::seasons::SeasonTable;
    use crate::store::MatchRecord;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rec(id: u32, date: NaiveDate, home: TeamId, away: TeamId, hg: u32, ag: u32) -> MatchRecord {
        MatchRecord {
            match_id: id,
            date,
            season: "2023-2024".into(),
            round: None,
            home_id: home,
            away_id: away,
            home_goals: hg,
            away_goals: ag,
            raw_odds: None,
            fair_odds: None,
        }
    }

    fn snapshot(matches: Vec<MatchRecord>) -> Snapshot {
        let teams = TeamDirectory::new(vec![
            TeamEntry {
                id: 1,
                name: "A".into(),
                aliases: vec![],
            },
            TeamEntry {
                id: 2,
                name: "B".into(),
                aliases: vec![],
            },
            TeamEntry {
                id: 3,
                name: "C".into(),
                aliases: vec![],
            },
        ])
        .unwrap();
        Snapshot::new(
            matches,
            vec![],
            SeasonTable::tracked_la_liga(),
            teams,
            PlayerDirectory::new(vec![]).unwrap(),
            1,
        )
        .unwrap()
    }

    #[test]
    fn last_n_points_scenario() {
        // Win 2-0, lose 0-1, draw 1-1, all in January of the 2023-24 season.
        let snap = snapshot(vec![
            rec(1, d(2024, 1, 1), 1, 2, 2, 0),
            rec(2, d(2024, 1, 8), 2, 1, 1, 0),
            rec(3, d(2024, 1, 15), 1, 3, 1, 1),
        ]);
        let rule = PointsRule::default();
        let v = last_n(&snap, 1, d(2024, 1, 22), 5, Metric::Points, rule).unwrap();
        assert!((v - 4.0 / 3.0).abs() < 1e-12);
        let v = last_n(&snap, 1, d(2024, 1, 5), 5, Metric::Points, rule).unwrap();
        assert!((v - 3.0).abs() < 1e-12);
        assert!(last_n(&snap, 1, d(2024, 1, 1), 5, Metric::Points, rule).is_none());
    }

    #[test]
    fn goal_metrics_follow_perspective() {
        let snap = snapshot(vec![
            rec(1, d(2024, 1, 1), 1, 2, 2, 0),
            rec(2, d(2024, 1, 8), 2, 1, 3, 1),
        ]);
        let rule = PointsRule::default();
        let scored = last_n(&snap, 1, d(2024, 1, 15), 5, Metric::GoalsScored, rule).unwrap();
        assert!((scored - 1.5).abs() < 1e-12);
        let conceded = last_n(&snap, 1, d(2024, 1, 15), 5, Metric::GoalsConceded, rule).unwrap();
        assert!((conceded - 1.5).abs() < 1e-12);
        let gdif = last_n(&snap, 1, d(2024, 1, 15), 5, Metric::GoalDiff, rule).unwrap();
        assert!(gdif.abs() < 1e-12);
    }

    #[test]
    fn season_to_date_resets_at_boundary() {
        let mut prior = rec(1, d(2023, 5, 1), 1, 2, 2, 0);
        prior.season = "2022-2023".into();
        let snap = snapshot(vec![prior, rec(2, d(2023, 8, 20), 1, 3, 1, 0)]);
        let rule = PointsRule::default();
        // Opening-day as-of: no prior matches inside 2023-24 yet.
        assert!(season_to_date(&snap, 1, d(2023, 8, 20), Metric::Points, rule).is_none());
        let v = season_to_date(&snap, 1, d(2023, 9, 1), Metric::Points, rule).unwrap();
        assert!((v - 3.0).abs() < 1e-12);
    }

    #[test]
    fn prior_season_window_spans_back_a_season() {
        let mut prior = rec(1, d(2023, 5, 1), 1, 2, 2, 0);
        prior.season = "2022-2023".into();
        let snap = snapshot(vec![prior, rec(2, d(2023, 8, 20), 1, 3, 0, 1)]);
        let rule = PointsRule::default();
        // Window opens at the 2022-23 start, so both matches count.
        let v = prior_season_ppm(&snap, 1, d(2023, 9, 1), rule).unwrap();
        assert!((v - 1.5).abs() < 1e-12);
        // 2019-20 has no previous season.
        assert!(prior_season_ppm(&snap, 1, d(2019, 9, 1), rule).is_none());
    }

    #[test]
    fn opponent_ppm_reads_season_to_date_at_match_dates() {
        // Team 2 beats team 3 on Jan 1, then hosts team 1 on Jan 15. At that
        // point team 2's season-to-date PPM is 3.0, and that is what team 1's
        // OpponentPpm window over the Jan 15 match must see.
        let snap = snapshot(vec![
            rec(100_000, d(2024, 1, 1), 2, 3, 1, 0),
            rec(1, d(2024, 1, 15), 2, 1, 0, 0),
        ]);
        let rule = PointsRule::default();
        let v = last_n(&snap, 1, d(2024, 2, 1), 5, Metric::OpponentPpm, rule).unwrap();
        assert!((v - 3.0).abs() < 1e-12);
    }
}
