use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset;
use crate::errors::PipelineError;
use crate::h2h;
use crate::players::{self, CoachFeatures, SlotFeatures};
use crate::registry::{CoachBook, TeamId};
use crate::rolling::{self, Metric, PointsRule};
use crate::store::{MatchRecord, Snapshot};
use crate::tiers::{self, Tier, TierThresholds};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub focal_team: TeamId,
    pub form_window: usize,
    pub h2h_window: usize,
    pub points: PointsRule,
    pub tiers: TierThresholds,
}

impl PipelineConfig {
    pub fn new(focal_team: TeamId) -> Self {
        Self {
            focal_team,
            form_window: 5,
            h2h_window: 5,
            points: PointsRule::default(),
            tiers: TierThresholds::default(),
        }
    }
}

/// Lifecycle of one row. Rows only ever move forward; a failure anywhere
/// aborts the batch rather than leaving a half-staged row behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Loaded,
    Resolved,
    Computed,
    Imputed,
    Validated,
    Committed,
}

fn trace_stage(match_id: u32, stage: Stage) {
    debug!(match_id, stage = ?stage, "row stage");
}

#[derive(Debug, Clone)]
pub struct MatchBlock {
    pub match_id: u32,
    pub date: NaiveDate,
    pub season: String,
    pub is_home: bool,
    pub opponent_id: TeamId,
    pub round: Option<i64>,
}

/// Rolling/tier features for one side of the fixture. Shared between the
/// focal team and the opponent; `None` means undefined until imputation.
#[derive(Debug, Clone, Default)]
pub struct TeamBlock {
    pub g_sco_l5: Option<f64>,
    pub g_con_l5: Option<f64>,
    pub gdif_l5: Option<f64>,
    pub ppm_l5: Option<f64>,
    pub opp_ppm_l5: Option<f64>,
    pub ppm_sea: Option<f64>,
    pub gpm_vs_top: Option<f64>,
    pub gpm_vs_mid: Option<f64>,
    pub gpm_vs_low: Option<f64>,
    pub ppm_vs_top: Option<f64>,
    pub ppm_vs_mid: Option<f64>,
    pub ppm_vs_low: Option<f64>,
}

/// Opponent-only extras: season goal rates, their ratio, and recent fair-odds
/// form.
#[derive(Debug, Clone, Default)]
pub struct OppExtras {
    pub g_sco_all: Option<f64>,
    pub g_con_all: Option<f64>,
    pub sco_con_rat: Option<f64>,
    pub odd_w_l5: Option<f64>,
    pub odd_l_l5: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct H2hBlock {
    pub exists: bool,
    pub win_l5: Option<f64>,
    pub gdif_l5: Option<f64>,
    pub ppm_l5: Option<f64>,
    pub ppm_all: Option<f64>,
}

/// One focal match's feature row. Typed blocks until serialization; the flat
/// column view only exists at the output boundary.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub block: MatchBlock,
    pub squad: Vec<SlotFeatures>,
    pub coach: CoachFeatures,
    pub focal: TeamBlock,
    pub opponent: TeamBlock,
    pub opp_extras: OppExtras,
    pub h2h: H2hBlock,
    pub target_odds: Option<f64>,
}

fn team_block(
    snapshot: &Snapshot,
    team: TeamId,
    as_of: NaiveDate,
    config: &PipelineConfig,
) -> TeamBlock {
    let n = config.form_window;
    let rule = config.points;
    let th = config.tiers;
    let vs = |tier: Tier| tiers::stats_vs_tier(snapshot, team, as_of, tier, th, rule);
    let (top, mid, low) = (vs(Tier::Top), vs(Tier::Mid), vs(Tier::Low));
    TeamBlock {
        g_sco_l5: rolling::last_n(snapshot, team, as_of, n, Metric::GoalsScored, rule),
        g_con_l5: rolling::last_n(snapshot, team, as_of, n, Metric::GoalsConceded, rule),
        gdif_l5: rolling::last_n(snapshot, team, as_of, n, Metric::GoalDiff, rule),
        ppm_l5: rolling::last_n(snapshot, team, as_of, n, Metric::Points, rule),
        opp_ppm_l5: rolling::last_n(snapshot, team, as_of, n, Metric::OpponentPpm, rule),
        ppm_sea: rolling::season_to_date(snapshot, team, as_of, Metric::Points, rule),
        gpm_vs_top: top.map(|(g, _)| g),
        gpm_vs_mid: mid.map(|(g, _)| g),
        gpm_vs_low: low.map(|(g, _)| g),
        ppm_vs_top: top.map(|(_, p)| p),
        ppm_vs_mid: mid.map(|(_, p)| p),
        ppm_vs_low: low.map(|(_, p)| p),
    }
}

fn opp_extras(
    snapshot: &Snapshot,
    opponent: TeamId,
    as_of: NaiveDate,
    config: &PipelineConfig,
) -> OppExtras {
    let rule = config.points;
    let g_sco_all = rolling::season_to_date(snapshot, opponent, as_of, Metric::GoalsScored, rule);
    let g_con_all = rolling::season_to_date(snapshot, opponent, as_of, Metric::GoalsConceded, rule);
    let sco_con_rat = match (g_sco_all, g_con_all) {
        (Some(s), Some(c)) if c > 0.0 => Some(s / c),
        (Some(s), Some(_)) => Some(s),
        _ => None,
    };

    // Fair-odds form over the opponent's last matches that carry odds.
    let with_odds: Vec<&MatchRecord> = snapshot
        .last_n_for(opponent, as_of, config.form_window)
        .into_iter()
        .filter(|m| m.fair_odds.is_some())
        .collect();
    let (odd_w_l5, odd_l_l5) = if with_odds.is_empty() {
        (None, None)
    } else {
        let mut w = 0.0;
        let mut l = 0.0;
        for m in &with_odds {
            if let Some(fair) = m.fair_odds {
                let home = m.is_home(opponent);
                w += fair.win_for(home);
                l += fair.loss_for(home);
            }
        }
        let count = with_odds.len() as f64;
        (Some(w / count), Some(l / count))
    };

    OppExtras {
        g_sco_all,
        g_con_all,
        sco_con_rat,
        odd_w_l5,
        odd_l_l5,
    }
}

fn h2h_block(
    snapshot: &Snapshot,
    focal: TeamId,
    opponent: TeamId,
    as_of: NaiveDate,
    config: &PipelineConfig,
) -> H2hBlock {
    let rule = config.points;
    let exists = h2h::exists(snapshot, focal, opponent, as_of);
    let stats = h2h::h2h_stats(snapshot, focal, opponent, as_of, config.h2h_window, rule);
    H2hBlock {
        exists,
        win_l5: stats.map(|s| s.win_ratio),
        gdif_l5: stats.map(|s| s.goal_diff),
        ppm_l5: stats.map(|s| s.points_per_match),
        ppm_all: h2h::h2h_overall_ppm(snapshot, focal, opponent, as_of, rule),
    }
}

/// Computes one focal match's row against the immutable snapshot. Pure: no
/// state is written anywhere, so the four feature categories fan out in
/// parallel. Every cell that lacks prior data comes back `None`.
pub fn compute_row(
    snapshot: &Snapshot,
    coaches: &CoachBook,
    config: &PipelineConfig,
    m: &MatchRecord,
) -> FeatureRow {
    let focal = config.focal_team;
    let opponent = m.opponent_of(focal);
    let as_of = m.date;

    let (squad_and_coach, (focal_block, (opp_pair, h2h))) = rayon::join(
        || {
            (
                players::squad_block(snapshot, focal, m.match_id, as_of, config.points),
                players::coach_features(snapshot, coaches, focal, as_of),
            )
        },
        || {
            rayon::join(
                || team_block(snapshot, focal, as_of, config),
                || {
                    rayon::join(
                        || {
                            (
                                team_block(snapshot, opponent, as_of, config),
                                opp_extras(snapshot, opponent, as_of, config),
                            )
                        },
                        || h2h_block(snapshot, focal, opponent, as_of, config),
                    )
                },
            )
        },
    );
    let (squad, coach) = squad_and_coach;
    let (opponent_block, extras) = opp_pair;

    FeatureRow {
        block: MatchBlock {
            match_id: m.match_id,
            date: m.date,
            season: m.season.clone(),
            is_home: m.is_home(focal),
            opponent_id: opponent,
            round: m.round,
        },
        squad,
        coach,
        focal: focal_block,
        opponent: opponent_block,
        opp_extras: extras,
        h2h,
        target_odds: m.fair_odds.map(|f| f.win_for(m.is_home(focal))),
    }
}

fn fill(cell: &mut Option<f64>, value: f64) {
    if cell.is_none() {
        *cell = Some(value);
    }
}

fn impute_slots(row: &mut FeatureRow, snapshot: &Snapshot) {
    let as_of = row.block.date;
    let league_rating = players::league_prior_mean_rating(snapshot, as_of).unwrap_or(0.0);
    for slot in &mut row.squad {
        if slot.position.is_none() {
            slot.position = Some("NoPos".to_string());
        }
        if slot.goals_per90.is_none() || slot.assists_per90.is_none()
            || slot.key_passes_per90.is_none()
        {
            let mates = slot
                .player_id
                .zip(slot.position.as_deref())
                .and_then(|(id, pos)| players::position_mates_per90(snapshot, pos, id, as_of));
            let (g, a, kp) = mates.unwrap_or((0.0, 0.0, 0.0));
            fill(&mut slot.goals_per90, g);
            fill(&mut slot.assists_per90, a);
            fill(&mut slot.key_passes_per90, kp);
        }
        fill(&mut slot.last_rating, league_rating);
        fill(&mut slot.prior_season_rating, league_rating);
        fill(&mut slot.form5, league_rating);
        fill(&mut slot.win_rate, 0.0);
        fill(&mut slot.first_squad, 0.0);
        fill(&mut slot.rated, 0.0);
        if slot.player_id.is_none() {
            slot.player_id = Some(0);
        }
    }
}

fn impute_team_block(
    block: &mut TeamBlock,
    season_gpm: f64,
    season_ppm: f64,
    l5_proxy: Option<(f64, f64)>,
) {
    // Tier-conditional windows fall back to the plain season aggregate.
    fill(&mut block.gpm_vs_top, season_gpm);
    fill(&mut block.gpm_vs_mid, season_gpm);
    fill(&mut block.gpm_vs_low, season_gpm);
    fill(&mut block.ppm_vs_top, season_ppm);
    fill(&mut block.ppm_vs_mid, season_ppm);
    fill(&mut block.ppm_vs_low, season_ppm);

    // Recent-form windows: promoted sides borrow the relegated-group profile.
    let (gpm, ppm) = l5_proxy.unwrap_or((season_gpm, season_ppm));
    fill(&mut block.g_sco_l5, gpm);
    fill(&mut block.g_con_l5, gpm);
    fill(&mut block.gdif_l5, 0.0);
    fill(&mut block.ppm_l5, ppm);
    fill(&mut block.opp_ppm_l5, ppm);
    fill(&mut block.ppm_sea, season_ppm);
}

/// Resolves every undefined cell by the declared rule table, in order:
/// player slots, H2H, tier-conditional aggregates, recent-form proxies,
/// season PPM fallbacks. Anything still `None` afterwards is a rule gap and
/// fails validation.
pub fn impute_row(row: &mut FeatureRow, snapshot: &Snapshot, config: &PipelineConfig) {
    let as_of = row.block.date;
    let rule = config.points;
    let focal = config.focal_team;
    let opponent = row.block.opponent_id;

    impute_slots(row, snapshot);

    let coach_fallback = players::league_prior_mean_rating(snapshot, as_of).unwrap_or(0.0);
    fill(&mut row.coach.prior_season_rating, coach_fallback);
    fill(&mut row.coach.form5, coach_fallback);
    if row.coach.coach_id.is_none() {
        row.coach.coach_id = Some(0);
    }

    if !row.h2h.exists {
        fill(&mut row.h2h.win_l5, 0.0);
        fill(&mut row.h2h.gdif_l5, 0.0);
        fill(&mut row.h2h.ppm_l5, 0.0);
        fill(&mut row.h2h.ppm_all, 0.0);
    }

    // Season fallbacks resolve before the cells that borrow them.
    let season_ppm_for = |team: TeamId, current: Option<f64>| -> f64 {
        current
            .or_else(|| rolling::prior_season_ppm(snapshot, team, as_of, rule))
            .unwrap_or(0.0)
    };
    let focal_season_ppm = season_ppm_for(focal, row.focal.ppm_sea);
    let opp_season_ppm = season_ppm_for(opponent, row.opponent.ppm_sea);

    let focal_season_gpm = rolling::season_to_date(snapshot, focal, as_of, Metric::GoalsScored, rule)
        .unwrap_or(0.0);
    let opp_season_gpm = row.opp_extras.g_sco_all.unwrap_or(0.0);

    let proxy = tiers::relegated_proxy(snapshot, &row.block.season, rule);
    impute_team_block(&mut row.focal, focal_season_gpm, focal_season_ppm, None);
    impute_team_block(&mut row.opponent, opp_season_gpm, opp_season_ppm, proxy);

    fill(&mut row.opp_extras.g_sco_all, opp_season_gpm);
    fill(&mut row.opp_extras.g_con_all, 0.0);
    fill(&mut row.opp_extras.sco_con_rat, 0.0);
    fill(&mut row.opp_extras.odd_w_l5, 0.0);
    fill(&mut row.opp_extras.odd_l_l5, 0.0);

    if row.block.round.is_none() {
        row.block.round = Some(0);
    }
}

/// Runs every focal match through the row lifecycle in strict chronological
/// order and returns the committed table. Fails on the first row that cannot
/// be completed.
pub fn build_dataset(
    snapshot: &Snapshot,
    coaches: &CoachBook,
    config: &PipelineConfig,
) -> Result<dataset::Table, PipelineError> {
    let mut table = dataset::Table::new();
    let mut committed = 0usize;
    for m in snapshot.focal_matches() {
        trace_stage(m.match_id, Stage::Pending);
        trace_stage(m.match_id, Stage::Loaded);
        debug!(match_id = m.match_id, date = %m.date, opponent = m.opponent_of(config.focal_team), stage = ?Stage::Resolved, "row staged");
        let mut row = compute_row(snapshot, coaches, config, m);
        trace_stage(m.match_id, Stage::Computed);
        impute_row(&mut row, snapshot, config);
        trace_stage(m.match_id, Stage::Imputed);
        // flatten is the validation gate: any surviving None aborts here.
        let cells = dataset::flatten(&row)?;
        trace_stage(m.match_id, Stage::Validated);
        table.push(cells);
        committed += 1;
        trace_stage(m.match_id, Stage::Committed);
    }
    info!(rows = committed, "dataset assembled");
    Ok(table)
}
