//! Weighted-quorum voting engine.
//!
//! The final decision is weight-based, while the early-stop test counts raw
//! votes. Ties in weight resolve to [`Outcome::Different`].

use crate::types::{Decision, OracleId, Outcome, SplitTag, Stage, Vote};

/// Tally all non-abstain votes into a [`Decision`].
///
/// With no weight cast, the outcome is `Different` at 0% confidence. Callers
/// must check [`Decision::is_vacuous`] before treating it as an inference.
pub fn calculate_weighted_vote(votes: &[Vote]) -> Decision {
    let mut weight_same = 0.0f64;
    let mut weight_different = 0.0f64;
    let mut vote_count = 0usize;

    for vote in votes {
        match vote.outcome() {
            Some(Outcome::Same) => weight_same += vote.weight(),
            Some(Outcome::Different) => weight_different += vote.weight(),
            None => continue,
        }
        vote_count += 1;
    }

    let total_weight = weight_same + weight_different;

    // Strict comparison: an exact tie falls to Different.
    let (outcome, winning_weight) = if weight_same > weight_different {
        (Outcome::Same, weight_same)
    } else {
        (Outcome::Different, weight_different)
    };

    let confidence_percent = if total_weight > 0.0 {
        (winning_weight / total_weight * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    Decision {
        outcome,
        confidence_percent,
        total_weight,
        weight_same,
        weight_different,
        vote_count,
        stopped_early: false,
    }
}

/// One oracle's opinion fed into the split rule.
#[derive(Debug, Clone, Copy)]
pub struct SplitOpinion<'a> {
    pub oracle: &'a OracleId,
    pub outcome: Outcome,
    pub provenance: &'a str,
}

/// Weights used by [`apply_conditional_split_rule`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitWeights {
    /// Weight of the single vote emitted on agreement (nominally 1.0).
    pub primary: f64,
    /// Weight given to the reference outcome on disagreement (nominally 0.7).
    pub reference: f64,
    /// Weight left to the secondary oracle's outcome on disagreement (nominally 0.3).
    pub residual: f64,
}

/// Cross-check a secondary oracle against the reference oracle on the cropped pair.
///
/// Agreement yields one `Agree` vote for the secondary at `weights.primary`.
/// Disagreement yields two `Split` votes: the reference outcome at
/// `weights.reference`, then the secondary outcome at `weights.residual`.
/// Apply once per secondary oracle; results never interact.
pub fn apply_conditional_split_rule(
    primary: SplitOpinion<'_>,
    reference: SplitOpinion<'_>,
    weights: SplitWeights,
) -> Vec<Vote> {
    if primary.outcome == reference.outcome {
        return vec![Vote::cast(
            primary.oracle.clone(),
            primary.outcome,
            weights.primary,
            Stage::Cropped,
            primary.provenance,
        )
        .with_split(SplitTag::Agree)];
    }

    tracing::debug!(
        secondary = %primary.oracle,
        reference = %reference.oracle,
        secondary_outcome = %primary.outcome,
        reference_outcome = %reference.outcome,
        "split vote"
    );

    vec![
        Vote::cast(
            reference.oracle.clone(),
            reference.outcome,
            weights.reference,
            Stage::Cropped,
            format!("{} (split with {})", reference.provenance, primary.oracle),
        )
        .with_split(SplitTag::Split),
        Vote::cast(
            primary.oracle.clone(),
            primary.outcome,
            weights.residual,
            Stage::Cropped,
            primary.provenance,
        )
        .with_split(SplitTag::Split),
    ]
}

/// Early-stop configuration: a quorum of raw vote count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyStopPolicy {
    pub enabled: bool,
    pub threshold: usize,
}

impl Default for EarlyStopPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 6,
        }
    }
}

/// Result of an early-stop evaluation at a stage boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum StopCheck {
    Continue,
    /// Enough votes agree; the decision has `stopped_early` set.
    Stop(Decision),
}

impl StopCheck {
    pub fn should_stop(&self) -> bool {
        matches!(self, StopCheck::Stop(_))
    }
}

/// Decide whether enough concordant votes (by count, not weight) have accumulated.
pub fn check_early_stopping(votes: &[Vote], policy: EarlyStopPolicy) -> StopCheck {
    if !policy.enabled {
        return StopCheck::Continue;
    }

    let valid = votes.iter().filter(|v| !v.is_abstain()).count();
    if valid < policy.threshold {
        return StopCheck::Continue;
    }

    let mut decision = calculate_weighted_vote(votes);
    let concordant = votes
        .iter()
        .filter(|v| v.outcome() == Some(decision.outcome))
        .count();

    if concordant >= policy.threshold {
        tracing::info!(
            concordant,
            valid,
            outcome = %decision.outcome,
            "early stopping triggered"
        );
        decision.stopped_early = true;
        StopCheck::Stop(decision)
    } else {
        StopCheck::Continue
    }
}
