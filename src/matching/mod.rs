//! Multi-pass probabilistic matching engine
//!
//! The engine takes an incoming PII record and an algorithm
//! configuration, retrieves blocked candidates pass by pass, scores
//! person clusters, grades the record against each pass's
//! possible-match window and finally inserts the record as a new
//! patient.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod clean;
pub mod evaluators;
pub mod link;

pub use clean::clean;
pub use evaluators::{
    eval_log_odds_cutoff, eval_perfect_match, evaluate, similarity, FeatureComparison,
};
pub use link::{link_record, match_record, pass_max_points, score_records};

/// The overall linkage prediction for an incoming record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Prediction {
    Match,
    PossibleMatch,
    NoMatch,
}

/// How strongly a person cluster matched, graded against a pass's
/// possible-match window. Ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum MatchGrade {
    CertainlyNot,
    Possible,
    Certain,
}

/// The linkage result for one person cluster that reached at least a
/// "possible" grade on some pass
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LinkResult {
    /// The person this patient may be linked to
    pub person_reference_id: Uuid,

    /// Log-odds points accumulated in the pass that produced this score
    pub accumulated_points: f64,

    /// Relative match strength, normalized to [0, 1]
    pub rms: f64,

    /// Minimum match threshold of the scoring pass
    pub mmt: f64,

    /// Certain match threshold of the scoring pass
    pub cmt: f64,

    /// The grade assigned to this score
    pub grade: MatchGrade,
}

/// Response of a dry-run match (no patient is written)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchOutcome {
    pub prediction: Prediction,

    /// The matched person; null unless prediction is `match` with a
    /// single certain cluster
    pub person_reference_id: Option<Uuid>,

    pub results: Vec<LinkResult>,
}

/// Response of a link call
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LinkOutcome {
    pub prediction: Prediction,

    /// The person the new patient was attached to; null for
    /// `possible_match`, where attachment to an existing cluster is
    /// deferred to manual review
    pub person_reference_id: Option<Uuid>,

    /// The newly inserted patient
    pub patient_reference_id: Uuid,

    pub results: Vec<LinkResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_ordering() {
        assert!(MatchGrade::Certain > MatchGrade::Possible);
        assert!(MatchGrade::Possible > MatchGrade::CertainlyNot);
    }

    #[test]
    fn test_prediction_wire_format() {
        assert_eq!(
            serde_json::to_string(&Prediction::PossibleMatch).unwrap(),
            "\"possible_match\""
        );
        assert_eq!(
            serde_json::to_string(&MatchGrade::CertainlyNot).unwrap(),
            "\"certainly-not\""
        );
    }
}
