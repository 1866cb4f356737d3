use thiserror::Error;

/// Fatal pipeline failures. A lookup that merely finds no prior data is not an
/// error: those surface as `None` cells and are resolved by the imputation
/// pass. Anything here aborts the whole batch, because a silently dropped or
/// half-filled match would corrupt every rolling statistic computed after it.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or out-of-range source values tied to one match.
    #[error("{reason} (match {match_id})")]
    Data { match_id: u32, reason: String },

    /// Malformed input not attributable to a single match (bad season table,
    /// unknown team alias in a directory, unreadable file).
    #[error("{reason}")]
    Input { reason: String },

    /// A committed row would still contain an undefined cell after imputation.
    /// Signals a gap in the imputation rules, not a data problem.
    #[error("feature {column} undefined after imputation (match {match_id})")]
    Completeness { match_id: u32, column: String },
}

impl PipelineError {
    pub fn data(match_id: u32, reason: impl Into<String>) -> Self {
        Self::Data {
            match_id,
            reason: reason.into(),
        }
    }

    pub fn input(reason: impl Into<String>) -> Self {
        Self::Input {
            reason: reason.into(),
        }
    }
}
