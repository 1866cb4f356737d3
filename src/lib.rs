pub mod assembler;
pub mod dataset;
pub mod errors;
pub mod h2h;
pub mod observability;
pub mod odds;
pub mod players;
pub mod registry;
pub mod rolling;
pub mod seasons;
pub mod store;
pub mod tiers;

pub use assembler::{FeatureRow, PipelineConfig, build_dataset, compute_row};
pub use errors::PipelineError;
pub use store::{MatchRecord, Snapshot};
