//! facevote-core — Vote data model and decision logic.
//!
//! Weighted tally, conditional vote splitting, the early-stop quorum test and
//! breakdown/report generation. Everything here is pure and deterministic;
//! oracles, preprocessing and persistence live in other crates.

pub mod breakdown;
pub mod types;
pub mod voting;
pub mod weights;

pub use breakdown::{
    build_breakdown, render_report, Breakdown, BreakdownEntry, BreakdownSummary, StageBreakdown,
};
pub use types::{Ballot, Decision, OracleId, Outcome, SplitTag, Stage, Vote};
pub use voting::{
    apply_conditional_split_rule, calculate_weighted_vote, check_early_stopping, EarlyStopPolicy,
    SplitOpinion, SplitWeights, StopCheck,
};
pub use weights::{StageWeights, WeightsError};
