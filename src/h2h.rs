use chrono::NaiveDate;

use crate::registry::TeamId;
use crate::rolling::PointsRule;
use crate::store::{MatchRecord, Snapshot};

/// Head-to-head aggregates from `a`'s perspective.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct H2hStats {
    pub win_ratio: f64,
    pub points_per_match: f64,
    /// Summed, not averaged: a long-run goal superiority signal.
    pub goal_diff: f64,
}

/// The meetings of `a` and `b` strictly before `before`, most recent first,
/// capped at `limit`.
pub fn h2h_matches<'a>(
    snapshot: &'a Snapshot,
    a: TeamId,
    b: TeamId,
    before: NaiveDate,
    limit: usize,
) -> Vec<&'a MatchRecord> {
    let mut out: Vec<&MatchRecord> = snapshot
        .team_matches_before(a, before)
        .into_iter()
        .filter(|m| m.involves(b))
        .collect();
    out.reverse();
    out.truncate(limit);
    out
}

pub fn exists(snapshot: &Snapshot, a: TeamId, b: TeamId, before: NaiveDate) -> bool {
    snapshot
        .team_matches_before(a, before)
        .iter()
        .any(|m| m.involves(b))
}

/// Aggregates over the last `n` meetings. An empty history is `None`, never a
/// fabricated zero: "never played" and "always lost" are different facts, and
/// conflating them at compute time would poison the feature. The caller
/// records an explicit exists flag and substitutes neutral values later.
pub fn h2h_stats(
    snapshot: &Snapshot,
    a: TeamId,
    b: TeamId,
    before: NaiveDate,
    n: usize,
    rule: PointsRule,
) -> Option<H2hStats> {
    let window = h2h_matches(snapshot, a, b, before, n);
    if window.is_empty() {
        return None;
    }
    let count = window.len() as f64;
    let mut wins = 0.0;
    let mut points = 0.0;
    let mut goal_diff = 0.0;
    for m in &window {
        let pts = m.points_for(a, rule);
        points += pts as f64;
        if pts == rule.win {
            wins += 1.0;
        }
        goal_diff += m.goals_for(a) as f64 - m.goals_against(a) as f64;
    }
    Some(H2hStats {
        win_ratio: wins / count,
        points_per_match: points / count,
        goal_diff,
    })
}

/// PPM over the entire prior head-to-head history, not just the last `n`.
pub fn h2h_overall_ppm(
    snapshot: &Snapshot,
    a: TeamId,
    b: TeamId,
    before: NaiveDate,
    rule: PointsRule,
) -> Option<f64> {
    let meetings = h2h_matches(snapshot, a, b, before, usize::MAX);
    if meetings.is_empty() {
        return None;
    }
    let total: f64 = meetings
        .iter()
        .map(|m| m.points_for(a, rule) as f64)
        .sum();
    Some(total / meetings.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PlayerDirectory, TeamDirectory, TeamEntry};
    use crate::seasons::SeasonTable;

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
        let teams = (1..=3)
            .map(|id| TeamEntry {
                id,
                name: format!("T{id}"),
                aliases: vec![],
            })
            .collect();
        Snapshot::new(
            matches,
            vec![],
            SeasonTable::tracked_la_liga(),
            TeamDirectory::new(teams).unwrap(),
            PlayerDirectory::new(vec![]).unwrap(),
            1,
        )
        .unwrap()
    }

    #[test]
    fn empty_history_is_none_not_zero() {
        let snap = snapshot(vec![rec(1, d(2023, 9, 1), 1, 2, 2, 0)]);
        assert!(!exists(&snap, 1, 3, d(2023, 10, 1)));
        assert!(h2h_stats(&snap, 1, 3, d(2023, 10, 1), 5, PointsRule::default()).is_none());
        assert!(h2h_overall_ppm(&snap, 1, 3, d(2023, 10, 1), PointsRule::default()).is_none());
        // Same pairing but before the only meeting.
        assert!(!exists(&snap, 1, 2, d(2023, 9, 1)));
    }

    #[test]
    fn stats_take_a_perspective() {
        // 1 beats 2, then 2 beats 1, then they draw.
        let snap = snapshot(vec![
            rec(1, d(2023, 9, 1), 1, 2, 3, 0),
            rec(2, d(2023, 10, 1), 2, 1, 1, 0),
            rec(3, d(2023, 11, 1), 1, 2, 2, 2),
        ]);
        let rule = PointsRule::default();
        let s = h2h_stats(&snap, 1, 2, d(2023, 12, 1), 5, rule).unwrap();
        assert!((s.win_ratio - 1.0 / 3.0).abs() < 1e-12);
        assert!((s.points_per_match - 4.0 / 3.0).abs() < 1e-12);
        // +3 -1 +0 summed.
        assert!((s.goal_diff - 2.0).abs() < 1e-12);
        let s2 = h2h_stats(&snap, 2, 1, d(2023, 12, 1), 5, rule).unwrap();
        assert!((s2.goal_diff + 2.0).abs() < 1e-12);
    }

    #[test]
    fn window_takes_most_recent_meetings() {
        let snap = snapshot(vec![
            rec(1, d(2023, 9, 1), 1, 2, 1, 0),
            rec(2, d(2023, 10, 1), 1, 2, 0, 1),
            rec(3, d(2023, 11, 1), 1, 2, 2, 0),
        ]);
        let window = h2h_matches(&snap, 1, 2, d(2023, 12, 1), 2);
        assert_eq!(
            window.iter().map(|m| m.match_id).collect::<Vec<_>>(),
            vec![3, 2]
        );
        // Overall PPM still sees all three.
        let ppm = h2h_overall_ppm(&snap, 1, 2, d(2023, 12, 1), PointsRule::default()).unwrap();
        assert!((ppm - 2.0).abs() < 1e-12);
    }
}
