use chrono::NaiveDate;

use rm_features::registry::{PlayerDirectory, TeamDirectory, TeamEntry, TeamId};
use rm_features::rolling::{self, Metric, PointsRule};
use rm_features::seasons::SeasonTable;
use rm_features::store::{MatchRecord, Snapshot};
use rm_features::tiers::{self, Tier, TierThresholds};

const FOCAL: TeamId = 1;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn rec(
    id: u32,
    date: NaiveDate,
    season: &str,
    home: TeamId,
    away: TeamId,
    hg: u32,
    ag: u32,
) -> MatchRecord {
    MatchRecord {
        match_id: id,
        date,
        season: season.into(),
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
    let teams = (1..=6)
        .map(|id| TeamEntry {
            id,
            name: format!("Team {id}"),
            aliases: vec![],
        })
        .collect();
    Snapshot::new(
        matches,
        vec![],
        SeasonTable::tracked_la_liga(),
        TeamDirectory::new(teams).unwrap(),
        PlayerDirectory::new(vec![]).unwrap(),
        FOCAL,
    )
    .unwrap()
}

#[test]
fn form_window_averages_points_over_available_history() {
    // Win, loss, draw across three January weeks.
    let snap = snapshot(vec![
        rec(1, d(2024, 1, 1), "2023-2024", FOCAL, 2, 2, 0),
        rec(2, d(2024, 1, 8), "2023-2024", 2, FOCAL, 1, 0),
        rec(3, d(2024, 1, 15), "2023-2024", FOCAL, 3, 1, 1),
    ]);
    let rule = PointsRule::default();

    let after_all = rolling::last_n(&snap, FOCAL, d(2024, 1, 22), 5, Metric::Points, rule).unwrap();
    assert!((after_all - 4.0 / 3.0).abs() < 1e-12);

    let after_one = rolling::last_n(&snap, FOCAL, d(2024, 1, 5), 5, Metric::Points, rule).unwrap();
    assert!((after_one - 3.0).abs() < 1e-12);

    assert!(rolling::last_n(&snap, FOCAL, d(2024, 1, 1), 5, Metric::Points, rule).is_none());
}

#[test]
fn season_to_date_ignores_prior_seasons() {
    let snap = snapshot(vec![
        rec(1, d(2023, 4, 1), "2022-2023", FOCAL, 2, 5, 0),
        rec(2, d(2023, 8, 20), "2023-2024", FOCAL, 3, 1, 0),
        rec(3, d(2023, 9, 3), "2023-2024", 2, FOCAL, 0, 0),
    ]);
    let rule = PointsRule::default();

    // First match of 2023-24: the 5-0 from last season does not leak in.
    assert!(rolling::season_to_date(&snap, FOCAL, d(2023, 8, 20), Metric::Points, rule).is_none());

    let mid = rolling::season_to_date(&snap, FOCAL, d(2023, 9, 10), Metric::Points, rule).unwrap();
    assert!((mid - 2.0).abs() < 1e-12);

    let goals =
        rolling::season_to_date(&snap, FOCAL, d(2023, 9, 10), Metric::GoalsScored, rule).unwrap();
    assert!((goals - 0.5).abs() < 1e-12);
}

#[test]
fn opponent_strength_is_judged_at_each_match_date() {
    // Team 2 starts 2023-24 with two wins, then hosts the focal team. The
    // schedule-strength window must record team 2 at PPM 3.0, not whatever it
    // ends the season on.
    let snap = snapshot(vec![
        rec(100_000, d(2023, 8, 20), "2023-2024", 2, 3, 2, 0),
        rec(100_001, d(2023, 8, 27), "2023-2024", 4, 2, 0, 1),
        rec(1, d(2023, 9, 3), "2023-2024", 2, FOCAL, 0, 2),
        rec(100_002, d(2023, 9, 10), "2023-2024", 2, 5, 0, 7),
    ]);
    let rule = PointsRule::default();
    let v = rolling::last_n(&snap, FOCAL, d(2023, 9, 17), 5, Metric::OpponentPpm, rule).unwrap();
    assert!((v - 3.0).abs() < 1e-12);
}

#[test]
fn tiers_come_from_the_prior_season_only() {
    let thresholds = TierThresholds::default();
    let rule = PointsRule::default();
    let snap = snapshot(vec![
        // 2022-23: team 2 strong, team 3 weak, team 4 mid.
        rec(100_000, d(2022, 9, 1), "2022-2023", 2, 3, 3, 0),
        rec(100_001, d(2022, 10, 1), "2022-2023", 3, 2, 0, 2),
        rec(100_002, d(2022, 11, 1), "2022-2023", 4, 3, 2, 1),
        rec(100_003, d(2022, 12, 1), "2022-2023", 2, 4, 0, 0),
        rec(100_004, d(2023, 1, 15), "2022-2023", 4, 2, 0, 1),
        // 2023-24 results must not affect 2023-24 tier judgments.
        rec(100_005, d(2023, 9, 1), "2023-2024", 3, 2, 9, 0),
    ]);

    assert_eq!(
        tiers::tier_of(&snap, 2, "2023-2024", thresholds, rule),
        Some(Tier::Top)
    );
    assert_eq!(
        tiers::tier_of(&snap, 3, "2023-2024", thresholds, rule),
        Some(Tier::Low)
    );
    assert_eq!(
        tiers::tier_of(&snap, 4, "2023-2024", thresholds, rule),
        Some(Tier::Mid)
    );
    // Team 5 never played in 2022-23: promoted, no tier.
    assert!(tiers::tier_of(&snap, 5, "2023-2024", thresholds, rule).is_none());
}

#[test]
fn prior_season_ppm_covers_the_long_window() {
    let rule = PointsRule::default();
    let snap = snapshot(vec![
        rec(1, d(2023, 5, 1), "2022-2023", FOCAL, 2, 2, 0),
        rec(2, d(2023, 8, 20), "2023-2024", FOCAL, 3, 1, 1),
    ]);
    // Both the prior-season win and the current-season draw fall inside the
    // window anchored at the 2022-23 start.
    let v = rolling::prior_season_ppm(&snap, FOCAL, d(2023, 9, 1), rule).unwrap();
    assert!((v - 2.0).abs() < 1e-12);
}
