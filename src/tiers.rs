use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::registry::TeamId;
use crate::rolling::{self, PointsRule};
use crate::store::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Top,
    Mid,
    Low,
}

/// PPM cut points for tier classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierThresholds {
    pub top_min_ppm: f64,
    pub mid_min_ppm: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            top_min_ppm: 1.9,
            mid_min_ppm: 1.2,
        }
    }
}

impl TierThresholds {
    pub fn classify(&self, ppm: f64) -> Tier {
        if ppm > self.top_min_ppm {
            Tier::Top
        } else if ppm >= self.mid_min_ppm {
            Tier::Mid
        } else {
            Tier::Low
        }
    }
}

/// A team's tier judged from its full PPM in the season before
/// `reference_season`. `None` means the team has no prior top-flight record
/// (promoted, or the reference season is the earliest tracked one).
pub fn tier_of(
    snapshot: &Snapshot,
    team: TeamId,
    reference_season: &str,
    thresholds: TierThresholds,
    rule: PointsRule,
) -> Option<Tier> {
    let prev = snapshot.seasons.previous(reference_season)?;
    // The day after the prior season's end, so the whole season counts.
    let cutoff = prev.end.succ_opt()?;
    let ppm = rolling::season_ppm_of(snapshot, team, &prev.tag, cutoff, rule)?;
    Some(thresholds.classify(ppm))
}

/// Teams relegated out before `reference_season`: present in the prior season,
/// absent from the reference season. The pooled PPM of that group stands in
/// for a promoted side's missing history, since promoted clubs tend to perform
/// like the clubs they replaced. Reads only prior-season matches.
pub fn relegated_teams(snapshot: &Snapshot, reference_season: &str) -> Vec<TeamId> {
    let Some(prev) = snapshot.seasons.previous(reference_season) else {
        return Vec::new();
    };
    let prior: HashSet<TeamId> = snapshot.teams_in_season(&prev.tag);
    let current: HashSet<TeamId> = snapshot.teams_in_season(reference_season);
    let mut out: Vec<TeamId> = prior.difference(&current).copied().collect();
    out.sort_unstable();
    out
}

/// Pooled prior-season (goals-per-match, points-per-match) over the relegated
/// group. `None` when there is no prior season or the group is empty.
pub fn relegated_proxy(
    snapshot: &Snapshot,
    reference_season: &str,
    rule: PointsRule,
) -> Option<(f64, f64)> {
    let prev = snapshot.seasons.previous(reference_season)?;
    let cutoff = prev.end.succ_opt()?;
    let group = relegated_teams(snapshot, reference_season);
    let mut goals = 0.0;
    let mut points = 0.0;
    let mut count = 0usize;
    for team in group {
        for m in snapshot
            .team_matches_before(team, cutoff)
            .into_iter()
            .filter(|m| m.season == prev.tag)
        {
            goals += m.goals_for(team) as f64;
            points += m.points_for(team, rule) as f64;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some((goals / count as f64, points / count as f64))
    }
}

/// (goals-per-match, points-per-match) over `team`'s matches from the prior
/// season's start to strictly before `as_of`, restricted to opponents whose
/// tier (judged against each match's own season) equals `tier`. `None` when no
/// such match exists yet.
pub fn stats_vs_tier(
    snapshot: &Snapshot,
    team: TeamId,
    as_of: NaiveDate,
    tier: Tier,
    thresholds: TierThresholds,
    rule: PointsRule,
) -> Option<(f64, f64)> {
    let season = snapshot.seasons.season_of(as_of)?;
    let start = snapshot
        .seasons
        .previous(&season.tag)
        .map(|p| p.start)
        .unwrap_or(season.start);
    let mut goals = 0.0;
    let mut points = 0.0;
    let mut count = 0usize;
    for m in snapshot.team_matches_in(team, start, as_of) {
        let opp = m.opponent_of(team);
        let opp_tier = tier_of(snapshot, opp, &m.season, thresholds, rule);
        if opp_tier == Some(tier) {
            goals += m.goals_for(team) as f64;
            points += m.points_for(team, rule) as f64;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some((goals / count as f64, points / count as f64))
    }
}
