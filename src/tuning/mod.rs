//! Tuning engine
//!
//! Estimates per-feature log-odds weights from labeled record pairs and
//! recommends possible-match windows for each pass of an algorithm.
//!
//! The math is the classic Fellegi-Sunter setup: for every calculable
//! feature, measure how often the two classes of pairs agree on it
//! (`m` for true matches, `u` for non-matches, both Laplace-smoothed),
//! then weight the feature by `ln(m/u)`.

use std::collections::HashMap;

use crate::matching::evaluators::{evaluate, FeatureComparison};
use crate::matching::link::score_records;
use crate::models::{
    Algorithm, AlgorithmPass, BlockingKey, Evaluator, EvaluatorFunc, Feature, FeatureAttribute,
    LogOdd, PIIRecord, PassKwargs, PassRecommendation,
};

pub mod service;

pub use service::TuningRunner;

/// Window-recommendation epsilon
const EPS: f64 = 1e-6;

/// Features whose agreement frequencies are estimated. Name composites
/// are excluded: their information is already carried by the first/last
/// name features.
pub fn calculable_features() -> Vec<Feature> {
    FeatureAttribute::ALL
        .iter()
        .filter(|a| {
            !matches!(
                a,
                FeatureAttribute::GivenName | FeatureAttribute::Name | FeatureAttribute::Suffix
            )
        })
        .map(|a| Feature::new(*a))
        .collect()
}

/// 1.0 when the pair agrees exactly on the feature, 0.0 otherwise
/// (missing data counts as disagreement)
fn pair_agreement(a: &PIIRecord, b: &PIIRecord, feature: Feature) -> f64 {
    let evaluator = Evaluator::new(feature, EvaluatorFunc::CompareProbabilisticExactMatch);
    let pass = AlgorithmPass {
        blocking_keys: vec![BlockingKey::Birthdate],
        evaluators: vec![evaluator.clone()],
        possible_match_window: (0.0, 1.0),
        kwargs: PassKwargs::default(),
    };
    let log_odds = HashMap::from([(feature, 1.0)]);
    match evaluate(&pass, &evaluator, a, b, &log_odds) {
        FeatureComparison::Points(points) => points,
        FeatureComparison::Missing => 0.0,
    }
}

fn agreement_probs(pairs: &[(PIIRecord, PIIRecord)]) -> HashMap<Feature, f64> {
    let mut probs: HashMap<Feature, f64> = HashMap::new();
    for feature in calculable_features() {
        // Laplace smoothing accounts for unseen instances
        let agreements: f64 = pairs
            .iter()
            .map(|(a, b)| pair_agreement(a, b, feature))
            .sum::<f64>()
            + 1.0;
        probs.insert(feature, agreements / (pairs.len() as f64 + 1.0));
    }
    probs
}

/// Class-conditional probability of feature agreement given that the
/// pair is a known true match
pub fn calculate_m_probs(true_match_pairs: &[(PIIRecord, PIIRecord)]) -> HashMap<Feature, f64> {
    agreement_probs(true_match_pairs)
}

/// Class-conditional probability of feature agreement given that the
/// pair is a known non-match
pub fn calculate_u_probs(non_match_pairs: &[(PIIRecord, PIIRecord)]) -> HashMap<Feature, f64> {
    agreement_probs(non_match_pairs)
}

/// Per-feature weights: `ln(m/u)`
pub fn calculate_log_odds(
    m_probs: &HashMap<Feature, f64>,
    u_probs: &HashMap<Feature, f64>,
) -> HashMap<Feature, f64> {
    m_probs
        .iter()
        .filter_map(|(feature, m)| u_probs.get(feature).map(|u| (*feature, (m / u).ln())))
        .collect()
}

/// The log-odds map as a stable, serializable list
pub fn log_odds_list(log_odds: &HashMap<Feature, f64>) -> Vec<LogOdd> {
    let mut list: Vec<LogOdd> = log_odds
        .iter()
        .map(|(feature, value)| LogOdd {
            feature: *feature,
            value: *value,
        })
        .collect();
    list.sort_by_key(|lo| lo.feature.to_string());
    list
}

/// Score every pair under one pass (raw per-pair scores, no cluster
/// aggregation), sorted ascending
pub fn score_pass_pairs(
    pairs: &[(PIIRecord, PIIRecord)],
    pass: &AlgorithmPass,
    log_odds: &HashMap<Feature, f64>,
    missing_points_proportion: f64,
) -> Vec<f64> {
    let mut scores: Vec<f64> = pairs
        .iter()
        .map(|(a, b)| score_records(a, b, pass, log_odds, missing_points_proportion))
        .collect();
    scores.sort_by(|a, b| a.partial_cmp(b).expect("scores are finite"));
    scores
}

fn median_of_sorted(scores: &[f64]) -> f64 {
    let mid = scores.len() / 2;
    if scores.len() % 2 == 1 {
        scores[mid]
    } else {
        (scores[mid - 1] + scores[mid]) / 2.0
    }
}

/// Recommend a `(lower, upper)` possible-match window from sorted score
/// distributions of the two classes.
///
/// The lower bound sits just above the strongest non-match; the upper
/// bound is the weakest true match above it. When the distributions
/// fully overlap the window collapses to the midpoint of the class
/// medians. Both bounds are clamped to [0, 1] with `lower <= upper`.
pub fn recommend_window(
    true_match_scores: &[f64],
    non_match_scores: &[f64],
) -> crate::Result<(f64, f64)> {
    if true_match_scores.is_empty() || non_match_scores.is_empty() {
        return Err(crate::Error::Validation(
            "insufficient labeled pairs to recommend a window".to_string(),
        ));
    }
    let mut true_scores = true_match_scores.to_vec();
    let mut non_scores = non_match_scores.to_vec();
    true_scores.sort_by(|a, b| a.partial_cmp(b).expect("scores are finite"));
    non_scores.sort_by(|a, b| a.partial_cmp(b).expect("scores are finite"));

    let max_u = *non_scores.last().expect("non-empty");
    let min_m = true_scores[0];
    let mut lower = max_u.max(min_m - EPS);
    let mut upper = match true_scores.iter().copied().find(|s| *s > lower) {
        Some(next_true) => next_true,
        None => {
            // full overlap: collapse toward the midpoint of the medians
            let mid = (median_of_sorted(&true_scores) + median_of_sorted(&non_scores)) / 2.0;
            lower = mid;
            mid
        }
    };

    lower = lower.clamp(0.0, 1.0);
    upper = upper.clamp(0.0, 1.0);
    if lower > upper {
        upper = lower;
    }
    Ok((lower, upper))
}

/// Recommend windows for every pass of an algorithm
pub fn recommend_windows(
    algorithm: &Algorithm,
    log_odds: &HashMap<Feature, f64>,
    true_match_pairs: &[(PIIRecord, PIIRecord)],
    non_match_pairs: &[(PIIRecord, PIIRecord)],
) -> crate::Result<Vec<PassRecommendation>> {
    let missing = algorithm
        .algorithm_context
        .advanced
        .missing_field_points_proportion;
    algorithm
        .passes
        .iter()
        .enumerate()
        .map(|(pass_index, pass)| {
            let true_scores = score_pass_pairs(true_match_pairs, pass, log_odds, missing);
            let non_scores = score_pass_pairs(non_match_pairs, pass, log_odds, missing);
            let (mmt, cmt) = recommend_window(&true_scores, &non_scores)?;
            Ok(PassRecommendation {
                pass_index,
                mmt,
                cmt,
            })
        })
        .collect()
}
