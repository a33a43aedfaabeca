//! Per-feature comparison functions and pass-level rules
//!
//! Evaluators decide whether two records agree on a single feature.
//! Each one is a total function: for configured features it never
//! fails, and a feature that is absent from both records produces the
//! [`FeatureComparison::Missing`] marker rather than a score.

use std::collections::HashMap;

use crate::models::{AlgorithmPass, Evaluator, EvaluatorFunc, Feature, PIIRecord, SimilarityMeasure};

/// The outcome of comparing one feature between two records
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureComparison {
    /// The evaluator produced a score (0/1 for deterministic
    /// evaluators, log-odds points for probabilistic ones)
    Points(f64),

    /// The feature is absent from both records; the pass scorer decides
    /// what this is worth
    Missing,
}

/// Normalized similarity of two strings in [0, 1] under the given measure
pub fn similarity(measure: SimilarityMeasure, a: &str, b: &str) -> f64 {
    match measure {
        SimilarityMeasure::JaroWinkler => strsim::jaro_winkler(a, b),
        SimilarityMeasure::Levenshtein => strsim::normalized_levenshtein(a, b),
        SimilarityMeasure::DamerauLevenshtein => strsim::normalized_damerau_levenshtein(a, b),
    }
}

/// Run one evaluator against the incoming record and a candidate record
pub fn evaluate(
    pass: &AlgorithmPass,
    evaluator: &Evaluator,
    record: &PIIRecord,
    candidate: &PIIRecord,
    log_odds: &HashMap<Feature, f64>,
) -> FeatureComparison {
    let rec_values = record.field_iter(evaluator.feature);
    let cand_values = candidate.field_iter(evaluator.feature);
    if rec_values.is_empty() && cand_values.is_empty() {
        return FeatureComparison::Missing;
    }

    let odds = log_odds.get(&evaluator.feature).copied().unwrap_or(0.0);
    let points = match evaluator.func {
        EvaluatorFunc::ExactMatchAny => {
            let hit = rec_values.iter().any(|v| cand_values.contains(v));
            if hit {
                1.0
            } else {
                0.0
            }
        }
        EvaluatorFunc::ExactMatchAll => {
            let mut left = rec_values.clone();
            let mut right = cand_values.clone();
            left.sort();
            right.sort();
            if !left.is_empty() && left == right {
                1.0
            } else {
                0.0
            }
        }
        EvaluatorFunc::FuzzyMatch => {
            let (measure, threshold) = pass.fuzzy_params(evaluator);
            let hit = rec_values.iter().any(|x| {
                cand_values
                    .iter()
                    .any(|y| similarity(measure, x, y) >= threshold)
            });
            if hit {
                1.0
            } else {
                0.0
            }
        }
        EvaluatorFunc::CompareProbabilisticExactMatch => {
            let hit = rec_values.iter().any(|v| cand_values.contains(v));
            if hit {
                odds
            } else {
                0.0
            }
        }
        EvaluatorFunc::CompareProbabilisticFuzzyMatch => {
            let (measure, threshold) = pass.fuzzy_params(evaluator);
            let mut max_score: f64 = 0.0;
            for x in &rec_values {
                for y in &cand_values {
                    max_score = max_score.max(similarity(measure, x, y));
                }
            }
            if max_score < threshold {
                0.0
            } else {
                max_score * odds
            }
        }
    };
    FeatureComparison::Points(points)
}

/// Whether a set of feature comparisons represents a perfect match,
/// i.e. every compared feature matched
pub fn eval_perfect_match(feature_comparisons: &[f64]) -> bool {
    feature_comparisons.iter().all(|c| *c == 1.0)
}

/// Whether a set of log-odds feature scores sums high enough to be a
/// true link rather than random chance
pub fn eval_log_odds_cutoff(feature_comparisons: &[f64], true_match_threshold: f64) -> bool {
    feature_comparisons.iter().sum::<f64>() >= true_match_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlgorithmPass, BlockingKey, FeatureAttribute, PassKwargs};
    use assertables::assert_in_delta;

    fn record(json: serde_json::Value) -> PIIRecord {
        PIIRecord::from_value(json).unwrap()
    }

    fn pass_with(evaluators: Vec<Evaluator>) -> AlgorithmPass {
        AlgorithmPass {
            blocking_keys: vec![BlockingKey::Birthdate],
            evaluators,
            possible_match_window: (0.7, 0.9),
            kwargs: PassKwargs::default(),
        }
    }

    fn run(
        func: EvaluatorFunc,
        threshold: Option<f64>,
        a: &PIIRecord,
        b: &PIIRecord,
        odds: f64,
    ) -> FeatureComparison {
        let evaluator = Evaluator {
            feature: FeatureAttribute::FirstName.into(),
            func,
            fuzzy_match_threshold: threshold,
            fuzzy_match_measure: None,
        };
        let pass = pass_with(vec![evaluator.clone()]);
        let log_odds =
            HashMap::from([(Feature::from(FeatureAttribute::FirstName), odds)]);
        evaluate(&pass, &evaluator, a, b, &log_odds)
    }

    #[test]
    fn test_exact_match_any() {
        let a = record(serde_json::json!({"name": [{"given": ["John", "Q"], "family": "X"}]}));
        let b = record(serde_json::json!({"name": [{"given": ["John"], "family": "Y"}]}));
        assert_eq!(
            run(EvaluatorFunc::ExactMatchAny, None, &a, &b, 0.0),
            FeatureComparison::Points(1.0)
        );

        let c = record(serde_json::json!({"name": [{"given": ["Jane"], "family": "Y"}]}));
        assert_eq!(
            run(EvaluatorFunc::ExactMatchAny, None, &a, &c, 0.0),
            FeatureComparison::Points(0.0)
        );
    }

    #[test]
    fn test_exact_match_all_order_insensitive() {
        let a = record(serde_json::json!({"name": [{"given": ["John", "Quincy"], "family": "X"}]}));
        let b = record(serde_json::json!({"name": [{"given": ["Quincy", "John"], "family": "Y"}]}));
        assert_eq!(
            run(EvaluatorFunc::ExactMatchAll, None, &a, &b, 0.0),
            FeatureComparison::Points(1.0)
        );

        let c = record(serde_json::json!({"name": [{"given": ["John"], "family": "Y"}]}));
        assert_eq!(
            run(EvaluatorFunc::ExactMatchAll, None, &a, &c, 0.0),
            FeatureComparison::Points(0.0)
        );
    }

    #[test]
    fn test_fuzzy_match_threshold() {
        let a = record(serde_json::json!({"name": [{"given": ["Jon"], "family": "X"}]}));
        let b = record(serde_json::json!({"name": [{"given": ["John"], "family": "Y"}]}));
        assert_eq!(
            run(EvaluatorFunc::FuzzyMatch, Some(0.9), &a, &b, 0.0),
            FeatureComparison::Points(1.0)
        );
        assert_eq!(
            run(EvaluatorFunc::FuzzyMatch, Some(0.999), &a, &b, 0.0),
            FeatureComparison::Points(0.0)
        );
    }

    #[test]
    fn test_probabilistic_exact_match_awards_log_odds() {
        let a = record(serde_json::json!({"name": [{"given": ["John"], "family": "X"}]}));
        let b = record(serde_json::json!({"name": [{"given": ["John"], "family": "Y"}]}));
        assert_eq!(
            run(EvaluatorFunc::CompareProbabilisticExactMatch, None, &a, &b, 6.85),
            FeatureComparison::Points(6.85)
        );

        let c = record(serde_json::json!({"name": [{"given": ["Jane"], "family": "Y"}]}));
        assert_eq!(
            run(EvaluatorFunc::CompareProbabilisticExactMatch, None, &a, &c, 6.85),
            FeatureComparison::Points(0.0)
        );
    }

    #[test]
    fn test_probabilistic_fuzzy_match_scales_by_similarity() {
        let a = record(serde_json::json!({"name": [{"given": ["Jon"], "family": "X"}]}));
        let b = record(serde_json::json!({"name": [{"given": ["John"], "family": "Y"}]}));
        let sim = similarity(SimilarityMeasure::JaroWinkler, "jon", "john");
        match run(EvaluatorFunc::CompareProbabilisticFuzzyMatch, Some(0.9), &a, &b, 2.0) {
            FeatureComparison::Points(points) => assert_in_delta!(points, sim * 2.0, 1e-9),
            FeatureComparison::Missing => panic!("unexpected missing"),
        };

        // below the threshold the evaluator awards nothing
        assert_eq!(
            run(EvaluatorFunc::CompareProbabilisticFuzzyMatch, Some(0.999), &a, &b, 2.0),
            FeatureComparison::Points(0.0)
        );
    }

    #[test]
    fn test_missing_on_both_sides() {
        let a = PIIRecord::default();
        let b = PIIRecord::default();
        assert_eq!(
            run(EvaluatorFunc::ExactMatchAny, None, &a, &b, 0.0),
            FeatureComparison::Missing
        );
    }

    #[test]
    fn test_missing_on_one_side_scores_zero() {
        let a = record(serde_json::json!({"name": [{"given": ["John"], "family": "X"}]}));
        let b = PIIRecord::default();
        assert_eq!(
            run(EvaluatorFunc::CompareProbabilisticExactMatch, None, &a, &b, 5.0),
            FeatureComparison::Points(0.0)
        );
    }

    #[test]
    fn test_similarity_measures_normalized() {
        for measure in [
            SimilarityMeasure::JaroWinkler,
            SimilarityMeasure::Levenshtein,
            SimilarityMeasure::DamerauLevenshtein,
        ] {
            let score = similarity(measure, "villanueva", "villanueve");
            assert!((0.0..=1.0).contains(&score));
            assert_eq!(similarity(measure, "same", "same"), 1.0);
        }
    }

    #[test]
    fn test_perfect_match_rule() {
        assert!(eval_perfect_match(&[1.0, 1.0, 1.0]));
        assert!(!eval_perfect_match(&[1.0, 0.0, 1.0]));
    }

    #[test]
    fn test_log_odds_cutoff_rule() {
        assert!(eval_log_odds_cutoff(&[6.8, 6.3], 12.2));
        assert!(!eval_log_odds_cutoff(&[6.8, 1.0], 12.2));
    }
}
