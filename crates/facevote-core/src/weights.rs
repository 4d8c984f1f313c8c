//! Per-stage oracle weight table.
//!
//! Loaded once at startup (defaults, optionally overridden from a TOML file)
//! and never mutated while runs are in flight.

use crate::types::{OracleId, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Weight used for an oracle missing from a stage's table.
pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Error, Debug)]
pub enum WeightsError {
    #[error("invalid weight {value} for {oracle} in stage {stage}: must be finite and >= 0")]
    InvalidWeight {
        stage: Stage,
        oracle: OracleId,
        value: f64,
    },
    #[error("invalid {name} {value}: must be finite and >= 0")]
    InvalidSplitParameter { name: &'static str, value: f64 },
    #[error("weights file parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Fixed per-stage table mapping oracle to base weight.
///
/// ```toml
/// reference_weight = 0.7
/// residual_weight = 0.3
///
/// [cropped]
/// chatgpt = 1.2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageWeights {
    pub original: BTreeMap<OracleId, f64>,
    pub cropped: BTreeMap<OracleId, f64>,
    pub aligned: BTreeMap<OracleId, f64>,
    /// Cropped stage only: weight given to the reference oracle's outcome on disagreement.
    pub reference_weight: f64,
    /// Cropped stage only: weight left to the secondary oracle's outcome on disagreement.
    pub residual_weight: f64,
}

impl Default for StageWeights {
    fn default() -> Self {
        let table = |entries: &[(&str, f64)]| {
            entries
                .iter()
                .map(|(name, w)| (OracleId::new(*name), *w))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            original: table(&[
                ("qwen", 1.0),
                ("chatgpt", 1.0),
                ("gemini", 1.0),
                ("deepface", 1.0),
            ]),
            // chatgpt is boosted on tightly cropped faces
            cropped: table(&[("qwen", 1.0), ("chatgpt", 1.2), ("gemini", 1.0)]),
            aligned: table(&[("qwen", 1.1), ("chatgpt", 1.1), ("gemini", 1.1)]),
            reference_weight: 0.7,
            residual_weight: 0.3,
        }
    }
}

impl StageWeights {
    /// Parse a (possibly partial) table; missing sections keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, WeightsError> {
        let weights: StageWeights = toml::from_str(src)?;
        weights.validate()?;
        Ok(weights)
    }

    pub fn table(&self, stage: Stage) -> &BTreeMap<OracleId, f64> {
        match stage {
            Stage::Original => &self.original,
            Stage::Cropped => &self.cropped,
            Stage::Aligned => &self.aligned,
        }
    }

    /// Base weight of `oracle` in `stage`, falling back to [`DEFAULT_WEIGHT`].
    pub fn base_weight(&self, stage: Stage, oracle: &OracleId) -> f64 {
        match self.table(stage).get(oracle) {
            Some(w) => *w,
            None => {
                tracing::debug!(%stage, %oracle, "no weight configured; using default");
                DEFAULT_WEIGHT
            }
        }
    }

    pub fn validate(&self) -> Result<(), WeightsError> {
        for stage in Stage::ALL {
            for (oracle, &value) in self.table(stage) {
                if !value.is_finite() || value < 0.0 {
                    return Err(WeightsError::InvalidWeight {
                        stage,
                        oracle: oracle.clone(),
                        value,
                    });
                }
            }
        }
        for (name, value) in [
            ("reference_weight", self.reference_weight),
            ("residual_weight", self.residual_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(WeightsError::InvalidSplitParameter { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let w = StageWeights::default();
        assert!(w.validate().is_ok());
        assert_eq!(w.base_weight(Stage::Cropped, &"chatgpt".into()), 1.2);
        assert_eq!(w.base_weight(Stage::Aligned, &"gemini".into()), 1.1);
    }

    #[test]
    fn test_missing_oracle_uses_default_weight() {
        let w = StageWeights::default();
        assert_eq!(w.base_weight(Stage::Aligned, &"deepface".into()), DEFAULT_WEIGHT);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let w = StageWeights::from_toml_str(
            r#"
            residual_weight = 0.25

            [cropped]
            chatgpt = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(w.residual_weight, 0.25);
        assert_eq!(w.reference_weight, 0.7);
        assert_eq!(w.base_weight(Stage::Cropped, &"chatgpt".into()), 1.5);
        // a section that is present replaces the whole default table
        assert_eq!(w.cropped.len(), 1);
        assert_eq!(w.base_weight(Stage::Original, &"deepface".into()), 1.0);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = StageWeights::from_toml_str("[aligned]\nqwen = -0.5\n").unwrap_err();
        assert!(matches!(err, WeightsError::InvalidWeight { stage: Stage::Aligned, .. }));
    }

    #[test]
    fn test_bad_split_parameter_rejected() {
        let err = StageWeights::from_toml_str("reference_weight = -1.0\n").unwrap_err();
        assert!(matches!(
            err,
            WeightsError::InvalidSplitParameter { name: "reference_weight", .. }
        ));
    }
}
