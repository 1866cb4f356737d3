use chrono::NaiveDate;

use crate::registry::{CoachBook, CoachId, PlayerId, TeamId};
use crate::rolling::PointsRule;
use crate::store::{Appearance, Snapshot};

/// Fixed width of the per-match squad block. Shorter squads leave trailing
/// slots empty; longer listings keep the first sixteen after ordering.
pub const SQUAD_SLOTS: usize = 16;

/// A prior-season rating mean needs this many minutes behind it before it is
/// trusted over the league-wide fallback.
pub const MIN_RATED_MINUTES: u32 = 200;

/// One squad slot's features, all undefined until proven otherwise. `None`
/// cells survive to the imputation pass; nothing here invents a value.
#[derive(Debug, Clone, Default)]
pub struct SlotFeatures {
    pub player_id: Option<PlayerId>,
    pub first_squad: Option<f64>,
    pub rated: Option<f64>,
    pub position: Option<String>,
    pub last_rating: Option<f64>,
    pub prior_season_rating: Option<f64>,
    pub form5: Option<f64>,
    pub win_rate: Option<f64>,
    pub goals_per90: Option<f64>,
    pub assists_per90: Option<f64>,
    pub key_passes_per90: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct CoachFeatures {
    pub coach_id: Option<CoachId>,
    pub prior_season_rating: Option<f64>,
    pub form5: Option<f64>,
}

/// Orders a match's squad into its slot sequence: starters first, then bench,
/// each group by minutes descending, ties by player id. The ordering must be
/// total and deterministic or slot columns would shuffle between runs.
pub fn order_squad<'a>(mut squad: Vec<&'a Appearance>) -> Vec<&'a Appearance> {
    squad.sort_by(|a, b| {
        b.first_squad
            .cmp(&a.first_squad)
            .then(b.minutes.cmp(&a.minutes))
            .then(a.player_id.cmp(&b.player_id))
    });
    squad.truncate(SQUAD_SLOTS);
    squad
}

fn mean_ratings(apps: &[&Appearance]) -> Option<f64> {
    let rated: Vec<f64> = apps.iter().filter_map(|a| a.editor_rating).collect();
    if rated.is_empty() {
        None
    } else {
        Some(rated.iter().sum::<f64>() / rated.len() as f64)
    }
}

fn per90(total: u32, minutes: u32) -> Option<f64> {
    if minutes == 0 {
        None
    } else {
        Some(total as f64 / minutes as f64 * 90.0)
    }
}

/// Mean editor rating over the player's prior-season appearances, honored only
/// past `MIN_RATED_MINUTES` of pitch time. Thin samples fall through to the
/// league-wide fallback at imputation.
pub fn prior_season_rating(
    snapshot: &Snapshot,
    player: PlayerId,
    as_of: NaiveDate,
) -> Option<f64> {
    let season = snapshot.seasons.season_of(as_of)?;
    let prev = snapshot.seasons.previous(&season.tag)?;
    let apps = snapshot.player_apps_in(player, prev.start, prev.end);
    let minutes: u32 = apps.iter().map(|a| a.minutes).sum();
    if minutes < MIN_RATED_MINUTES {
        return None;
    }
    mean_ratings(&apps)
}

/// Mean editor rating over every rated appearance in the prior season, across
/// the whole squad. The fallback for players without their own history.
pub fn league_prior_mean_rating(snapshot: &Snapshot, as_of: NaiveDate) -> Option<f64> {
    let season = snapshot.seasons.season_of(as_of)?;
    let prev = snapshot.seasons.previous(&season.tag)?;
    let rated: Vec<f64> = snapshot
        .appearances()
        .iter()
        .filter(|a| a.date >= prev.start && a.date <= prev.end)
        .filter_map(|a| a.editor_rating)
        .collect();
    if rated.is_empty() {
        None
    } else {
        Some(rated.iter().sum::<f64>() / rated.len() as f64)
    }
}

/// Pooled prior per-90 (goals, assists, key passes) of everyone else listed at
/// `position`. The rate fallback for debutants.
pub fn position_mates_per90(
    snapshot: &Snapshot,
    position: &str,
    exclude: PlayerId,
    as_of: NaiveDate,
) -> Option<(f64, f64, f64)> {
    let mates = snapshot.players.position_mates(position, exclude);
    let mut minutes = 0u32;
    let mut goals = 0u32;
    let mut assists = 0u32;
    let mut key_passes = 0u32;
    for mate in mates {
        for a in snapshot.player_apps_before(mate, as_of) {
            minutes += a.minutes;
            goals += a.goals;
            assists += a.assists;
            key_passes += a.key_passes;
        }
    }
    if minutes == 0 {
        return None;
    }
    Some((
        goals as f64 / minutes as f64 * 90.0,
        assists as f64 / minutes as f64 * 90.0,
        key_passes as f64 / minutes as f64 * 90.0,
    ))
}

/// Features for one listed player, computed from strictly-prior appearances
/// only. The current match contributes its squad flags, nothing else.
pub fn slot_features(
    snapshot: &Snapshot,
    focal_team: TeamId,
    app: &Appearance,
    as_of: NaiveDate,
    rule: PointsRule,
) -> SlotFeatures {
    let prior = snapshot.player_apps_before(app.player_id, as_of);

    let last_rating = prior.iter().rev().find_map(|a| a.editor_rating);

    let recent: Vec<&Appearance> = prior.iter().rev().take(5).copied().collect();
    let form5 = mean_ratings(&recent);

    let started: Vec<&Appearance> = prior.iter().filter(|a| a.first_squad).copied().collect();
    let win_rate = if started.is_empty() {
        None
    } else {
        let wins = started
            .iter()
            .filter(|a| {
                snapshot
                    .match_by_id(a.match_id)
                    .is_some_and(|m| m.points_for(focal_team, rule) == rule.win)
            })
            .count();
        Some(wins as f64 / started.len() as f64)
    };

    let minutes: u32 = prior.iter().map(|a| a.minutes).sum();
    let goals: u32 = prior.iter().map(|a| a.goals).sum();
    let assists: u32 = prior.iter().map(|a| a.assists).sum();
    let key_passes: u32 = prior.iter().map(|a| a.key_passes).sum();

    SlotFeatures {
        player_id: Some(app.player_id),
        first_squad: Some(if app.first_squad { 1.0 } else { 0.0 }),
        rated: Some(if app.editor_rating.is_some() { 1.0 } else { 0.0 }),
        position: snapshot
            .players
            .position(app.player_id)
            .map(str::to_string),
        last_rating,
        prior_season_rating: prior_season_rating(snapshot, app.player_id, as_of),
        form5,
        win_rate,
        goals_per90: per90(goals, minutes),
        assists_per90: per90(assists, minutes),
        key_passes_per90: per90(key_passes, minutes),
    }
}

/// The full slot block for one focal match, padded with defaults to
/// `SQUAD_SLOTS` entries.
pub fn squad_block(
    snapshot: &Snapshot,
    focal_team: TeamId,
    match_id: u32,
    as_of: NaiveDate,
    rule: PointsRule,
) -> Vec<SlotFeatures> {
    let squad = order_squad(snapshot.appearances_for_match(match_id));
    let mut slots: Vec<SlotFeatures> = squad
        .iter()
        .map(|app| slot_features(snapshot, focal_team, app, as_of, rule))
        .collect();
    slots.resize_with(SQUAD_SLOTS, SlotFeatures::default);
    slots
}

/// Coach block for the match date. Form is read off the squad's editor
/// ratings under that coach: the input carries no per-coach marks, so the
/// squad's collective rating stands in for the bench's.
pub fn coach_features(
    snapshot: &Snapshot,
    coaches: &CoachBook,
    focal_team: TeamId,
    as_of: NaiveDate,
) -> CoachFeatures {
    let Some(spell) = coaches.coach_on(as_of) else {
        return CoachFeatures::default();
    };

    // Focal matches under this spell, strictly prior, most recent first.
    let tenure: Vec<u32> = snapshot
        .team_matches_before(focal_team, as_of)
        .into_iter()
        .filter(|m| m.date >= spell.start)
        .rev()
        .map(|m| m.match_id)
        .collect();

    let match_mean = |id: u32| -> Option<f64> {
        let apps = snapshot.appearances_for_match(id);
        mean_ratings(&apps)
    };

    let recent: Vec<f64> = tenure.iter().take(5).filter_map(|&id| match_mean(id)).collect();
    let form5 = if recent.is_empty() {
        None
    } else {
        Some(recent.iter().sum::<f64>() / recent.len() as f64)
    };

    let prior_season_rating = snapshot.seasons.season_of(as_of).and_then(|season| {
        let prev = snapshot.seasons.previous(&season.tag)?;
        let marks: Vec<f64> = snapshot
            .team_matches_before(focal_team, as_of)
            .into_iter()
            .filter(|m| m.season == prev.tag && m.date >= spell.start)
            .filter_map(|m| match_mean(m.match_id))
            .collect();
        if marks.is_empty() {
            None
        } else {
            Some(marks.iter().sum::<f64>() / marks.len() as f64)
        }
    });

    CoachFeatures {
        coach_id: Some(spell.coach_id),
        prior_season_rating,
        form5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        CoachSpell, PlayerDirectory, PlayerEntry, TeamDirectory, TeamEntry,
    };
    use crate::seasons::SeasonTable;
    use crate::store::MatchRecord;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn app(match_id: u32, date: NaiveDate, player: PlayerId, fsq: bool, minutes: u32) -> Appearance {
        Appearance {
            match_id,
            date,
            player_id: player,
            first_squad: fsq,
            minutes,
            goals: 0,
            assists: 0,
            shots: 0,
            shots_on_target: 0,
            key_passes: 0,
            fouls: 0,
            fouled: 0,
            editor_rating: None,
        }
    }

    fn rec(id: u32, date: NaiveDate, season: &str, hg: u32, ag: u32) -> MatchRecord {
        MatchRecord {
            match_id: id,
            date,
            season: season.into(),
            round: None,
            home_id: 1,
            away_id: 2,
            home_goals: hg,
            away_goals: ag,
            raw_odds: None,
            fair_odds: None,
        }
    }

    fn snapshot(matches: Vec<MatchRecord>, apps: Vec<Appearance>) -> Snapshot {
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
        ])
        .unwrap();
        let players = PlayerDirectory::new(vec![
            PlayerEntry {
                id: 10,
                name: "Ten".into(),
                position: "FW".into(),
            },
            PlayerEntry {
                id: 11,
                name: "Eleven".into(),
                position: "FW".into(),
            },
            PlayerEntry {
                id: 12,
                name: "Twelve".into(),
                position: "GK".into(),
            },
        ])
        .unwrap();
        Snapshot::new(
            matches,
            apps,
            SeasonTable::tracked_la_liga(),
            teams,
            players,
            1,
        )
        .unwrap()
    }

    #[test]
    fn squad_order_is_starters_then_minutes_then_id() {
        let date = d(2023, 9, 1);
        let a = app(1, date, 10, false, 90);
        let b = app(1, date, 11, true, 60);
        let c = app(1, date, 12, true, 60);
        let ordered = order_squad(vec![&a, &b, &c]);
        let ids: Vec<PlayerId> = ordered.iter().map(|x| x.player_id).collect();
        assert_eq!(ids, vec![11, 12, 10]);
    }

    #[test]
    fn squad_block_pads_to_sixteen() {
        let date = d(2023, 9, 1);
        let snap = snapshot(
            vec![rec(1, date, "2023-2024", 2, 0)],
            vec![app(1, date, 10, true, 90)],
        );
        let block = squad_block(&snap, 1, 1, date, PointsRule::default());
        assert_eq!(block.len(), SQUAD_SLOTS);
        assert_eq!(block[0].player_id, Some(10));
        assert!(block[1].player_id.is_none());
        assert!(block[15].position.is_none());
    }

    #[test]
    fn per_match_features_use_only_prior_appearances() {
        let mut first = app(1, d(2023, 9, 1), 10, true, 90);
        first.goals = 2;
        first.editor_rating = Some(8.0);
        let mut second = app(2, d(2023, 9, 8), 10, true, 90);
        second.goals = 1;
        second.editor_rating = Some(6.0);
        let snap = snapshot(
            vec![
                rec(1, d(2023, 9, 1), "2023-2024", 2, 0),
                rec(2, d(2023, 9, 8), "2023-2024", 0, 1),
            ],
            vec![first, second.clone()],
        );
        let rule = PointsRule::default();
        let f = slot_features(&snap, 1, &second, d(2023, 9, 8), rule);
        // Only the Sep 1 appearance is prior: 2 goals in 90 minutes.
        assert!((f.goals_per90.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(f.last_rating, Some(8.0));
        assert_eq!(f.form5, Some(8.0));
        // Started one prior match, which the team won.
        assert!((f.win_rate.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn prior_season_rating_needs_minutes() {
        let mut thin = app(1, d(2023, 2, 1), 10, true, 100);
        thin.editor_rating = Some(9.0);
        let mut deep1 = app(1, d(2023, 2, 1), 11, true, 150);
        deep1.editor_rating = Some(7.0);
        let mut deep2 = app(2, d(2023, 3, 1), 11, true, 150);
        deep2.editor_rating = Some(8.0);
        let snap = snapshot(
            vec![
                rec(1, d(2023, 2, 1), "2022-2023", 1, 0),
                rec(2, d(2023, 3, 1), "2022-2023", 1, 0),
            ],
            vec![thin, deep1, deep2],
        );
        assert!(prior_season_rating(&snap, 10, d(2023, 9, 1)).is_none());
        let v = prior_season_rating(&snap, 11, d(2023, 9, 1)).unwrap();
        assert!((v - 7.5).abs() < 1e-12);
        // League-wide prior mean pools every rated appearance.
        let league = league_prior_mean_rating(&snap, d(2023, 9, 1)).unwrap();
        assert!((league - 8.0).abs() < 1e-12);
    }

    #[test]
    fn coach_features_follow_the_spell() {
        let book = CoachBook::new(vec![CoachSpell {
            coach_id: 7,
            name: "C".into(),
            start: d(2023, 7, 1),
            end: d(2024, 6, 30),
        }])
        .unwrap();
        let mut a1 = app(1, d(2023, 9, 1), 10, true, 90);
        a1.editor_rating = Some(7.0);
        let mut a2 = app(1, d(2023, 9, 1), 11, true, 90);
        a2.editor_rating = Some(9.0);
        let snap = snapshot(vec![rec(1, d(2023, 9, 1), "2023-2024", 2, 0)], vec![a1, a2]);
        let f = coach_features(&snap, &book, 1, d(2023, 9, 8));
        assert_eq!(f.coach_id, Some(7));
        assert!((f.form5.unwrap() - 8.0).abs() < 1e-12);
        // No prior-season matches under this spell.
        assert!(f.prior_season_rating.is_none());
        // Date outside every spell: everything undefined.
        let none = coach_features(&snap, &book, 1, d(2020, 1, 1));
        assert!(none.coach_id.is_none());
    }
}
