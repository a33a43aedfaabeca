//! Algorithm configuration model
//!
//! An [`Algorithm`] is a named, versioned linkage configuration: an
//! ordered list of passes, each with blocking keys, per-feature
//! evaluators and a possible-match window, plus shared context (skip
//! values, log-odds weights, advanced thresholds). Configurations are
//! fully validated at write time so the matching engine never has to
//! resolve anything lazily.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::blocking::BlockingKey;
use super::feature::Feature;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid label regex"));

/// Default fuzzy-match threshold when neither the evaluator nor the pass
/// kwargs supply one
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.9;

/// String similarity measures available to fuzzy evaluators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SimilarityMeasure {
    JaroWinkler,
    Levenshtein,
    DamerauLevenshtein,
}

/// The closed set of evaluator functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluatorFunc {
    ExactMatchAny,
    ExactMatchAll,
    FuzzyMatch,
    CompareProbabilisticExactMatch,
    CompareProbabilisticFuzzyMatch,
}

impl EvaluatorFunc {
    /// Whether this evaluator contributes log-odds points
    pub fn is_probabilistic(&self) -> bool {
        matches!(
            self,
            EvaluatorFunc::CompareProbabilisticExactMatch
                | EvaluatorFunc::CompareProbabilisticFuzzyMatch
        )
    }
}

/// A per-feature comparison configured on a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Evaluator {
    #[schema(value_type = String)]
    pub feature: Feature,
    pub func: EvaluatorFunc,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzzy_match_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzzy_match_measure: Option<SimilarityMeasure>,
}

impl Evaluator {
    pub fn new(feature: Feature, func: EvaluatorFunc) -> Self {
        Self {
            feature,
            func,
            fuzzy_match_threshold: None,
            fuzzy_match_measure: None,
        }
    }
}

/// Optional keyword arguments shared by all evaluators of a pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default, deny_unknown_fields)]
pub struct PassKwargs {
    /// Similarity measure for fuzzy comparisons
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_measure: Option<SimilarityMeasure>,

    /// Per-feature fuzzy thresholds
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub thresholds: Option<HashMap<Feature, f64>>,

    /// Fallback fuzzy threshold for all features
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    /// Log-odds sum a pair must reach to be considered a true match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_match_threshold: Option<f64>,
}

/// One pass of a linkage algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AlgorithmPass {
    /// Blocking keys that gate candidate retrieval for this pass
    pub blocking_keys: Vec<BlockingKey>,

    /// Per-feature evaluators, run in order
    pub evaluators: Vec<Evaluator>,

    /// `(lower, upper)` score window: below lower is certainly-not,
    /// at or above upper is certain
    #[schema(value_type = Vec<f64>)]
    pub possible_match_window: (f64, f64),

    /// Optional keyword arguments
    #[serde(default, skip_serializing_if = "is_default_kwargs")]
    pub kwargs: PassKwargs,
}

fn is_default_kwargs(kwargs: &PassKwargs) -> bool {
    *kwargs == PassKwargs::default()
}

impl AlgorithmPass {
    /// Resolve the similarity measure and threshold for a fuzzy
    /// comparison of `evaluator`'s feature: evaluator settings win over
    /// pass kwargs, which win over the defaults
    pub fn fuzzy_params(&self, evaluator: &Evaluator) -> (SimilarityMeasure, f64) {
        let measure = evaluator
            .fuzzy_match_measure
            .or(self.kwargs.similarity_measure)
            .unwrap_or(SimilarityMeasure::JaroWinkler);
        let threshold = evaluator
            .fuzzy_match_threshold
            .or_else(|| {
                self.kwargs
                    .thresholds
                    .as_ref()
                    .and_then(|t| t.get(&evaluator.feature).copied())
            })
            .or(self.kwargs.threshold)
            .unwrap_or(DEFAULT_FUZZY_THRESHOLD);
        (measure, threshold)
    }
}

/// A per-feature log-odds weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LogOdd {
    #[schema(value_type = String)]
    pub feature: Feature,
    pub value: f64,
}

/// Values to strip from records before evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SkipValue {
    /// `"*"` for all features, otherwise a `FEATURE[:suffix]` string
    pub feature: String,

    /// Case-insensitive glob patterns (`*`, `?`)
    pub values: Vec<String>,
}

/// Advanced scoring thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AdvancedThresholds {
    /// Proportion of a pass's blocking keys a record may be missing
    /// before the pass is skipped
    pub max_missing_allowed_proportion: f64,

    /// Proportion of a feature's log-odds points awarded when the
    /// feature is missing on both sides
    pub missing_field_points_proportion: f64,
}

impl Default for AdvancedThresholds {
    fn default() -> Self {
        Self {
            max_missing_allowed_proportion: 0.5,
            missing_field_points_proportion: 0.5,
        }
    }
}

/// Context shared by every pass of an algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AlgorithmContext {
    /// When true, a match may report multiple person clusters
    pub include_multiple_matches: bool,

    /// Values stripped from records before evaluation
    pub skip_values: Vec<SkipValue>,

    /// Per-feature log-odds weights
    pub log_odds: Vec<LogOdd>,

    /// Advanced scoring thresholds
    pub advanced: AdvancedThresholds,
}

impl Default for AlgorithmContext {
    fn default() -> Self {
        Self {
            include_multiple_matches: true,
            skip_values: Vec::new(),
            log_odds: Vec::new(),
            advanced: AdvancedThresholds::default(),
        }
    }
}

impl AlgorithmContext {
    /// The log-odds list as a lookup map
    pub fn log_odds_map(&self) -> HashMap<Feature, f64> {
        self.log_odds
            .iter()
            .map(|lo| (lo.feature, lo.value))
            .collect()
    }
}

/// A named, versioned linkage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Algorithm {
    /// Slug identifying this algorithm
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// At most one algorithm may be the default
    #[serde(default)]
    pub is_default: bool,

    #[serde(default)]
    pub algorithm_context: AlgorithmContext,

    /// Ordered sequence of passes
    pub passes: Vec<AlgorithmPass>,
}

impl Algorithm {
    /// Validate the full configuration. Called on every write so that
    /// misconfigurations fail at config load, never at comparison time.
    pub fn validate(&self) -> crate::Result<()> {
        if !LABEL_RE.is_match(&self.label) {
            return Err(crate::Error::Validation(format!(
                "invalid algorithm label: '{}'",
                self.label
            )));
        }
        if self.passes.is_empty() {
            return Err(crate::Error::Validation(
                "algorithm must define at least one pass".to_string(),
            ));
        }

        let advanced = &self.algorithm_context.advanced;
        for proportion in [
            advanced.max_missing_allowed_proportion,
            advanced.missing_field_points_proportion,
        ] {
            if !(0.0..=1.0).contains(&proportion) {
                return Err(crate::Error::Validation(format!(
                    "advanced proportions must be within [0, 1], got {proportion}"
                )));
            }
        }

        for skip in &self.algorithm_context.skip_values {
            if skip.feature != "*" {
                Feature::parse(&skip.feature)?;
            }
            if skip.values.is_empty() {
                return Err(crate::Error::Validation(format!(
                    "skip values for '{}' must not be empty",
                    skip.feature
                )));
            }
        }

        let log_odds = self.algorithm_context.log_odds_map();
        for (idx, pass) in self.passes.iter().enumerate() {
            if pass.blocking_keys.is_empty() {
                return Err(crate::Error::Validation(format!(
                    "pass {idx} must define at least one blocking key"
                )));
            }
            if pass.evaluators.is_empty() {
                return Err(crate::Error::Validation(format!(
                    "pass {idx} must define at least one evaluator"
                )));
            }
            let (lower, upper) = pass.possible_match_window;
            if !(0.0..=1.0).contains(&lower) || !(0.0..=1.0).contains(&upper) || lower > upper {
                return Err(crate::Error::Validation(format!(
                    "pass {idx} possible_match_window must satisfy 0 <= lower <= upper <= 1, \
                     got ({lower}, {upper})"
                )));
            }
            for evaluator in &pass.evaluators {
                if evaluator.func.is_probabilistic() && !log_odds.contains_key(&evaluator.feature)
                {
                    return Err(crate::Error::Validation(format!(
                        "pass {idx} evaluator {} requires a log_odds entry",
                        evaluator.feature
                    )));
                }
                if let Some(threshold) = evaluator.fuzzy_match_threshold {
                    if !(0.0..=1.0).contains(&threshold) {
                        return Err(crate::Error::Validation(format!(
                            "pass {idx} evaluator {} fuzzy_match_threshold must be within [0, 1]",
                            evaluator.feature
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// The built-in default configuration, installed when no algorithms
/// exist yet. Log-odds weights come from the published DIBBs training
/// run.
pub fn default_algorithm() -> Algorithm {
    use super::feature::FeatureAttribute as FA;

    let log_odds = vec![
        LogOdd { feature: FA::Address.into(), value: 8.438284928858774 },
        LogOdd { feature: FA::Birthdate.into(), value: 10.126641103800338 },
        LogOdd { feature: FA::City.into(), value: 2.438553006137189 },
        LogOdd { feature: FA::FirstName.into(), value: 6.849475906891162 },
        LogOdd { feature: FA::LastName.into(), value: 6.350720397426025 },
        LogOdd { feature: FA::Mrn.into(), value: 0.3051262572525359 },
        LogOdd { feature: FA::Sex.into(), value: 0.7510419059643679 },
        LogOdd { feature: FA::State.into(), value: 0.022376768992488694 },
        LogOdd { feature: FA::Zip.into(), value: 4.975031471124867 },
    ];

    let prob_fuzzy = |attr: FA, threshold: f64| Evaluator {
        feature: attr.into(),
        func: EvaluatorFunc::CompareProbabilisticFuzzyMatch,
        fuzzy_match_threshold: Some(threshold),
        fuzzy_match_measure: Some(SimilarityMeasure::JaroWinkler),
    };

    Algorithm {
        label: "dibbs-default".to_string(),
        description: Some(
            "Probabilistic linkage with blocking on birthdate/identifier/sex, \
             then zip/name/sex"
                .to_string(),
        ),
        is_default: true,
        algorithm_context: AlgorithmContext {
            include_multiple_matches: true,
            skip_values: vec![
                SkipValue {
                    feature: "name".to_string(),
                    values: vec![
                        "John Doe".to_string(),
                        "Jane Doe".to_string(),
                        "Baby Boy*".to_string(),
                        "Baby Girl*".to_string(),
                        "Unknown*".to_string(),
                        "Unk*".to_string(),
                    ],
                },
                SkipValue {
                    feature: "IDENTIFIER:SS".to_string(),
                    values: vec!["111-11-1111*".to_string(), "999-99-9999*".to_string()],
                },
            ],
            log_odds,
            advanced: AdvancedThresholds::default(),
        },
        passes: vec![
            AlgorithmPass {
                blocking_keys: vec![
                    BlockingKey::Birthdate,
                    BlockingKey::Identifier,
                    BlockingKey::Sex,
                ],
                evaluators: vec![
                    prob_fuzzy(FA::FirstName, 0.9),
                    prob_fuzzy(FA::LastName, 0.9),
                ],
                possible_match_window: (0.8, 0.925),
                kwargs: PassKwargs::default(),
            },
            AlgorithmPass {
                blocking_keys: vec![
                    BlockingKey::Zip,
                    BlockingKey::FirstName,
                    BlockingKey::LastName,
                    BlockingKey::Sex,
                ],
                evaluators: vec![
                    prob_fuzzy(FA::Address, 0.9),
                    prob_fuzzy(FA::Birthdate, 0.95),
                ],
                possible_match_window: (0.75, 0.9),
                kwargs: PassKwargs::default(),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feature::FeatureAttribute;

    #[test]
    fn test_default_algorithm_is_valid() {
        let algorithm = default_algorithm();
        assert!(algorithm.validate().is_ok());
        assert!(algorithm.is_default);
        assert_eq!(algorithm.passes.len(), 2);
    }

    #[test]
    fn test_label_slug_validation() {
        let mut algorithm = default_algorithm();
        for bad in ["Bad Label", "UPPER", "trailing-", "-leading", "double--dash", ""] {
            algorithm.label = bad.to_string();
            assert!(algorithm.validate().is_err(), "label '{bad}' should fail");
        }
        algorithm.label = "my-algorithm-2".to_string();
        assert!(algorithm.validate().is_ok());
    }

    #[test]
    fn test_window_bounds_validation() {
        let mut algorithm = default_algorithm();
        algorithm.passes[0].possible_match_window = (0.9, 0.5);
        assert!(algorithm.validate().is_err());
        algorithm.passes[0].possible_match_window = (0.5, 1.2);
        assert!(algorithm.validate().is_err());
        algorithm.passes[0].possible_match_window = (0.5, 0.5);
        assert!(algorithm.validate().is_ok());
    }

    #[test]
    fn test_probabilistic_evaluator_requires_log_odds() {
        let mut algorithm = default_algorithm();
        algorithm.passes[0].evaluators.push(Evaluator::new(
            FeatureAttribute::Email.into(),
            EvaluatorFunc::CompareProbabilisticExactMatch,
        ));
        assert!(algorithm.validate().is_err());

        // deterministic evaluators need no weights
        algorithm.passes[0].evaluators.pop();
        algorithm.passes[0].evaluators.push(Evaluator::new(
            FeatureAttribute::Email.into(),
            EvaluatorFunc::ExactMatchAny,
        ));
        assert!(algorithm.validate().is_ok());
    }

    #[test]
    fn test_empty_passes_rejected() {
        let mut algorithm = default_algorithm();
        algorithm.passes.clear();
        assert!(algorithm.validate().is_err());
    }

    #[test]
    fn test_skip_value_feature_parse() {
        let mut algorithm = default_algorithm();
        algorithm.algorithm_context.skip_values.push(SkipValue {
            feature: "NOT_A_FEATURE".to_string(),
            values: vec!["x".to_string()],
        });
        assert!(algorithm.validate().is_err());
    }

    #[test]
    fn test_fuzzy_params_resolution() {
        let algorithm = default_algorithm();
        let pass = &algorithm.passes[0];
        let (measure, threshold) = pass.fuzzy_params(&pass.evaluators[0]);
        assert_eq!(measure, SimilarityMeasure::JaroWinkler);
        assert_eq!(threshold, 0.9);

        // defaults apply when nothing is configured
        let bare = Evaluator::new(FeatureAttribute::City.into(), EvaluatorFunc::FuzzyMatch);
        let (_, threshold) = pass.fuzzy_params(&bare);
        assert_eq!(threshold, DEFAULT_FUZZY_THRESHOLD);
    }

    #[test]
    fn test_serde_round_trip() {
        let algorithm = default_algorithm();
        let json = serde_json::to_value(&algorithm).unwrap();
        let parsed: Algorithm = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, algorithm);
    }
}
