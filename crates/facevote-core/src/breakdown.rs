//! Per-stage audit breakdown and the human-readable report.

use crate::types::{Ballot, Decision, OracleId, SplitTag, Stage, Vote};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One vote as it appears in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub oracle: OracleId,
    pub ballot: Ballot,
    pub weight: f64,
    pub provenance: String,
    pub split: SplitTag,
    pub fallback: bool,
}

/// Votes of a single stage, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageBreakdown {
    pub stage: Stage,
    pub entries: Vec<BreakdownEntry>,
}

impl StageBreakdown {
    /// Number of non-abstain votes in this stage.
    pub fn vote_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.ballot != Ballot::Abstain)
            .count()
    }
}

/// Running totals over all votes (counts, not weights).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakdownSummary {
    pub total_votes: usize,
    pub votes_same: usize,
    pub votes_different: usize,
    pub votes_abstained: usize,
}

/// Structured per-stage, per-oracle summary of a comparison run.
///
/// Always lists all three stages so the serialized shape does not depend on
/// where a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub stages: Vec<StageBreakdown>,
    pub summary: BreakdownSummary,
}

impl Breakdown {
    pub fn stage(&self, stage: Stage) -> Option<&StageBreakdown> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Non-abstain vote count for `stage` (0 if the stage never ran).
    pub fn stage_vote_count(&self, stage: Stage) -> usize {
        self.stage(stage).map_or(0, StageBreakdown::vote_count)
    }
}

/// Group votes by stage, preserving insertion order within each stage.
pub fn build_breakdown(votes: &[Vote]) -> Breakdown {
    let mut stages: Vec<StageBreakdown> = Stage::ALL
        .iter()
        .map(|&stage| StageBreakdown {
            stage,
            entries: Vec::new(),
        })
        .collect();
    let mut summary = BreakdownSummary::default();

    for vote in votes {
        // `stages` is laid out in `Stage::ALL` order
        stages[vote.stage() as usize].entries.push(BreakdownEntry {
            oracle: vote.source().clone(),
            ballot: vote.ballot(),
            weight: vote.weight(),
            provenance: vote.provenance().to_string(),
            split: vote.split(),
            fallback: vote.is_fallback(),
        });

        match vote.ballot() {
            Ballot::Same => summary.votes_same += 1,
            Ballot::Different => summary.votes_different += 1,
            Ballot::Abstain => summary.votes_abstained += 1,
        }
        summary.total_votes += 1;
    }

    Breakdown { stages, summary }
}

const RULE_WIDTH: usize = 60;

/// Render a plain-text voting report for logs and the CLI.
pub fn render_report(decision: &Decision, breakdown: &Breakdown) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "VOTING REPORT");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Final Decision: {}", decision.outcome.as_str().to_uppercase());
    if decision.is_vacuous() {
        let _ = writeln!(out, "Confidence: n/a (no votes cast)");
    } else {
        let _ = writeln!(out, "Confidence: {:.2}%", decision.confidence_percent);
    }
    let _ = writeln!(
        out,
        "Early Stopped: {}",
        if decision.stopped_early { "Yes" } else { "No" }
    );
    let _ = writeln!(
        out,
        "Weight: same {:.2} / different {:.2} / total {:.2}",
        decision.weight_same, decision.weight_different, decision.total_weight
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Vote Breakdown:");
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));

    for stage in &breakdown.stages {
        if stage.entries.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{}:", stage.stage.as_str().to_uppercase());
        for entry in &stage.entries {
            let _ = write!(
                out,
                "  • {:20}: {:10} (weight: {:.2})",
                entry.oracle.as_str(),
                entry.ballot.as_str(),
                entry.weight
            );
            if entry.split != SplitTag::None {
                let _ = write!(out, " [{}]", entry.split.as_str());
            }
            if entry.fallback {
                let _ = write!(out, " [fallback]");
            }
            let _ = writeln!(out);
        }
    }

    let _ = write!(out, "{rule}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;
    use crate::voting::calculate_weighted_vote;

    fn sample_votes() -> Vec<Vote> {
        vec![
            Vote::cast("qwen".into(), Outcome::Same, 1.0, Stage::Original, "qwen_YES"),
            Vote::abstain("gemini".into(), Stage::Original, "rate_limited"),
            Vote::cast("chatgpt".into(), Outcome::Same, 1.2, Stage::Cropped, "chatgpt_YES"),
            Vote::cast("retinaface".into(), Outcome::Same, 0.7, Stage::Cropped, "retinaface_0.2")
                .with_split(SplitTag::Split),
            Vote::cast("qwen".into(), Outcome::Different, 0.3, Stage::Cropped, "qwen_NO")
                .with_split(SplitTag::Split),
        ]
    }

    #[test]
    fn test_breakdown_groups_by_stage_in_order() {
        let b = build_breakdown(&sample_votes());
        assert_eq!(b.stages.len(), 3);

        let cropped = b.stage(Stage::Cropped).unwrap();
        let names: Vec<&str> = cropped.entries.iter().map(|e| e.oracle.as_str()).collect();
        assert_eq!(names, vec!["chatgpt", "retinaface", "qwen"]);
        assert_eq!(cropped.entries[1].weight, 0.7);
        assert_eq!(cropped.entries[2].weight, 0.3);
        assert_eq!(cropped.entries[2].split, SplitTag::Split);

        assert_eq!(b.stage_vote_count(Stage::Original), 1);
        assert_eq!(b.stage_vote_count(Stage::Aligned), 0);
    }

    #[test]
    fn test_breakdown_summary_counts() {
        let b = build_breakdown(&sample_votes());
        assert_eq!(b.summary.total_votes, 5);
        assert_eq!(b.summary.votes_same, 3);
        assert_eq!(b.summary.votes_different, 1);
        assert_eq!(b.summary.votes_abstained, 1);
    }

    #[test]
    fn test_breakdown_of_nothing_keeps_all_stages() {
        let b = build_breakdown(&[]);
        assert_eq!(b.stages.len(), 3);
        assert!(b.stages.iter().all(|s| s.entries.is_empty()));
        assert_eq!(b.summary, BreakdownSummary::default());
    }

    #[test]
    fn test_report_contents() {
        let votes = sample_votes();
        let decision = calculate_weighted_vote(&votes);
        let report = render_report(&decision, &build_breakdown(&votes));
        assert!(report.contains("Final Decision: SAME"));
        assert!(report.contains("ORIGINAL:"));
        assert!(report.contains("CROPPED:"));
        assert!(!report.contains("ALIGNED:"));
        assert!(report.contains("[split]"));
        assert!(report.contains("abstain"));
    }

    #[test]
    fn test_report_flags_vacuous_decision() {
        let decision = calculate_weighted_vote(&[]);
        let report = render_report(&decision, &build_breakdown(&[]));
        assert!(report.contains("no votes cast"));
    }
}
