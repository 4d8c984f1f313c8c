use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a configured oracle (e.g. "chatgpt", "deepface", "retinaface").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OracleId(String);

impl OracleId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OracleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OracleId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Categorical answer to "do these two images show the same person?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Same,
    Different,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Same => "same",
            Outcome::Different => "different",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single vote slot holds: an opinion, or an abstention kept for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ballot {
    Same,
    Different,
    Abstain,
}

impl Ballot {
    /// The opinion carried by this ballot, `None` for an abstention.
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            Ballot::Same => Some(Outcome::Same),
            Ballot::Different => Some(Outcome::Different),
            Ballot::Abstain => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Ballot::Same => "same",
            Ballot::Different => "different",
            Ballot::Abstain => "abstain",
        }
    }
}

impl From<Outcome> for Ballot {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Same => Ballot::Same,
            Outcome::Different => Ballot::Different,
        }
    }
}

/// Image-transform phase during which a batch of votes is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Original,
    Cropped,
    Aligned,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Original, Stage::Cropped, Stage::Aligned];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Original => "original",
            Stage::Cropped => "cropped",
            Stage::Aligned => "aligned",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marks votes produced by the Cropped-stage conditional split rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitTag {
    #[default]
    None,
    Agree,
    Split,
}

impl SplitTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitTag::None => "none",
            SplitTag::Agree => "agree",
            SplitTag::Split => "split",
        }
    }
}

/// One oracle opinion (or abstention) as recorded in a comparison run.
///
/// Fields are private so a vote cannot change after construction. An
/// abstention always carries weight 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    source: OracleId,
    ballot: Ballot,
    weight: f64,
    stage: Stage,
    provenance: String,
    split: SplitTag,
    /// Re-emitted from the Original stage because preprocessing failed.
    fallback: bool,
}

impl Vote {
    /// A vote carrying an opinion. Negative or non-finite weights are clamped to 0.
    pub fn cast(
        source: OracleId,
        outcome: Outcome,
        weight: f64,
        stage: Stage,
        provenance: impl Into<String>,
    ) -> Self {
        let weight = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
        Self {
            source,
            ballot: outcome.into(),
            weight,
            stage,
            provenance: provenance.into(),
            split: SplitTag::None,
            fallback: false,
        }
    }

    /// An abstention: recorded for audit, excluded from every tally.
    pub fn abstain(source: OracleId, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            source,
            ballot: Ballot::Abstain,
            weight: 0.0,
            stage,
            provenance: reason.into(),
            split: SplitTag::None,
            fallback: false,
        }
    }

    pub fn with_split(mut self, split: SplitTag) -> Self {
        self.split = split;
        self
    }

    /// Mark this vote as carried over from an earlier stage.
    pub fn into_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    pub fn source(&self) -> &OracleId {
        &self.source
    }

    pub fn ballot(&self) -> Ballot {
        self.ballot
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.ballot.outcome()
    }

    pub fn is_abstain(&self) -> bool {
        self.ballot == Ballot::Abstain
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn provenance(&self) -> &str {
        &self.provenance
    }

    pub fn split(&self) -> SplitTag {
        self.split
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

/// Weighted decision derived from a set of votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    /// Winning side's share of total weight, in [0, 100]. Zero when no weight was cast.
    pub confidence_percent: f64,
    pub total_weight: f64,
    pub weight_same: f64,
    pub weight_different: f64,
    /// Number of non-abstain votes.
    pub vote_count: usize,
    pub stopped_early: bool,
}

impl Decision {
    /// True when no weight was cast at all; the outcome is then a policy default.
    pub fn is_vacuous(&self) -> bool {
        self.total_weight <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abstain_has_zero_weight() {
        let v = Vote::abstain("qwen".into(), Stage::Original, "rate_limited");
        assert_eq!(v.weight(), 0.0);
        assert!(v.is_abstain());
        assert_eq!(v.outcome(), None);
    }

    #[test]
    fn test_cast_clamps_bad_weights() {
        let neg = Vote::cast("a".into(), Outcome::Same, -1.0, Stage::Original, "");
        assert_eq!(neg.weight(), 0.0);
        let nan = Vote::cast("a".into(), Outcome::Same, f64::NAN, Stage::Original, "");
        assert_eq!(nan.weight(), 0.0);
    }

    #[test]
    fn test_ballot_serializes_lowercase() {
        let json = serde_json::to_string(&Ballot::Abstain).unwrap();
        assert_eq!(json, "\"abstain\"");
        let json = serde_json::to_string(&Stage::Cropped).unwrap();
        assert_eq!(json, "\"cropped\"");
    }

    #[test]
    fn test_builders_set_tags() {
        let v = Vote::cast("qwen".into(), Outcome::Different, 0.3, Stage::Cropped, "x")
            .with_split(SplitTag::Split)
            .into_fallback();
        assert_eq!(v.split(), SplitTag::Split);
        assert!(v.is_fallback());
    }
}
