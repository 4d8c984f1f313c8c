//! Turning a free-text model reply into an outcome.

use facevote_core::Outcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: Outcome,
    /// Neither YES nor NO appeared; the outcome defaulted to `Different`.
    pub unclear: bool,
}

/// YES without NO → same; any NO → different; otherwise different, flagged unclear.
///
/// Matches whole words, case-insensitively, so "NOT" or "KNOW" never count as NO.
pub fn parse_verdict(reply: &str) -> Verdict {
    let upper = reply.to_uppercase();
    let (mut yes, mut no) = (false, false);
    for w in upper.split(|c: char| !c.is_alphanumeric()) {
        match w {
            "YES" => yes = true,
            "NO" => no = true,
            _ => {}
        }
    }

    match (yes, no) {
        (true, false) => Verdict {
            outcome: Outcome::Same,
            unclear: false,
        },
        (_, true) => Verdict {
            outcome: Outcome::Different,
            unclear: false,
        },
        (false, false) => Verdict {
            outcome: Outcome::Different,
            unclear: true,
        },
    }
}

/// `"<oracle>_<first 20 chars of reply>"`, plus `_unclear` and `_fallback<n>` markers.
pub fn provenance(oracle: &str, reply: &str, verdict: &Verdict, model_index: usize) -> String {
    let head: String = reply.trim().to_uppercase().chars().take(20).collect();
    let mut out = format!("{oracle}_{head}");
    if verdict.unclear {
        out.push_str("_unclear");
    }
    if model_index > 0 {
        out.push_str(&format!("_fallback{model_index}"));
    }
    out
}
