use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

/// Three-way odds with the bookmaker margin removed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairOdds {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl FairOdds {
    pub fn prob_home(&self) -> f64 {
        1.0 / self.home
    }

    pub fn prob_draw(&self) -> f64 {
        1.0 / self.draw
    }

    pub fn prob_away(&self) -> f64 {
        1.0 / self.away
    }

    /// Fair odds on the given side winning.
    pub fn win_for(&self, is_home: bool) -> f64 {
        if is_home { self.home } else { self.away }
    }

    /// Fair odds on the given side losing, i.e. the other side winning.
    pub fn loss_for(&self, is_home: bool) -> f64 {
        if is_home { self.away } else { self.home }
    }
}

/// De-margins raw three-way odds proportionally: each implied probability
/// gives up margin in proportion to its own share of the implied sum,
/// `p_fair = p - M * (p / sum)`, which reduces to `p / sum`. This preserves
/// pairwise probability ratios. The convention is load-bearing for the target
/// column; equal-split or logarithmic de-margining produce different numbers
/// and must not be substituted.
pub fn fair_odds(home: f64, draw: f64, away: f64) -> Result<FairOdds, PipelineError> {
    for (label, v) in [("home", home), ("draw", draw), ("away", away)] {
        if !v.is_finite() || v <= 1.0 {
            return Err(PipelineError::input(format!(
                "{label} odds {v} out of range (must be > 1.0)"
            )));
        }
    }

    let p_home = 1.0 / home;
    let p_draw = 1.0 / draw;
    let p_away = 1.0 / away;
    let sum = p_home + p_draw + p_away;
    let overround = sum - 1.0;
    // A zero-margin book can land a hair below zero in f64 (e.g. odds of
    // exactly 2, 3 and 6); only a genuinely negative margin is an error.
    if overround < -1e-9 {
        return Err(PipelineError::input(format!(
            "negative overround {overround:.6} for odds ({home}, {draw}, {away})"
        )));
    }

    let fair = FairOdds {
        home: sum / p_home,
        draw: sum / p_draw,
        away: sum / p_away,
    };
    for p in [fair.prob_home(), fair.prob_draw(), fair.prob_away()] {
        if !(p > 0.0 && p < 1.0) {
            return Err(PipelineError::input(format!(
                "fair probability {p} outside (0,1) for odds ({home}, {draw}, {away})"
            )));
        }
    }
    Ok(fair)
}
