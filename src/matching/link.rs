//! Linkage orchestration
//!
//! Runs an incoming record through every pass of an algorithm: block,
//! score each person cluster, grade against the pass window, then pick
//! the prediction and insert the record as a new patient. Membership
//! scores persist across passes so the strongest grade wins.

use std::collections::{BTreeMap, HashMap};

use crate::db::repositories::{MpiStore, PersonAttachment};
use crate::models::{Algorithm, AlgorithmPass, Feature, PIIRecord, Patient, Person};

use super::clean::clean;
use super::evaluators::{evaluate, FeatureComparison};
use super::{LinkOutcome, LinkResult, MatchGrade, MatchOutcome, Prediction};

/// The maximum number of log-odds points a pass can award: the sum of
/// log-odds over its probabilistic evaluators
pub fn pass_max_points(pass: &AlgorithmPass, log_odds: &HashMap<Feature, f64>) -> f64 {
    pass.evaluators
        .iter()
        .filter(|e| e.func.is_probabilistic())
        .map(|e| log_odds.get(&e.feature).copied().unwrap_or(0.0))
        .sum()
}

/// Score one candidate record against the incoming record for a single
/// pass, normalized to [0, 1].
///
/// Probabilistic passes divide accumulated log-odds points by the pass
/// maximum; a feature missing from both records contributes
/// `missing_points_proportion` of its log-odds weight. Passes with no
/// probabilistic evaluators fall back to the fraction of evaluators
/// reporting a perfect agreement.
pub fn score_records(
    record: &PIIRecord,
    candidate: &PIIRecord,
    pass: &AlgorithmPass,
    log_odds: &HashMap<Feature, f64>,
    missing_points_proportion: f64,
) -> f64 {
    let max_points = pass_max_points(pass, log_odds);
    let mut accumulated = 0.0;
    let mut perfect = 0usize;
    for evaluator in &pass.evaluators {
        match evaluate(pass, evaluator, record, candidate, log_odds) {
            FeatureComparison::Points(points) => {
                accumulated += points;
                if points == 1.0 {
                    perfect += 1;
                }
            }
            FeatureComparison::Missing => {
                let odds = log_odds.get(&evaluator.feature).copied().unwrap_or(0.0);
                accumulated += missing_points_proportion * odds;
            }
        }
    }
    if max_points > 0.0 {
        (accumulated / max_points).clamp(0.0, 1.0)
    } else {
        perfect as f64 / pass.evaluators.len() as f64
    }
}

/// Collapse per-patient scores into a single cluster score: the median,
/// with ties broken by the mean of the two middle values
fn median(scores: &mut [f64]) -> f64 {
    debug_assert!(!scores.is_empty());
    scores.sort_by(|a, b| a.partial_cmp(b).expect("scores are finite"));
    let mid = scores.len() / 2;
    if scores.len() % 2 == 1 {
        scores[mid]
    } else {
        (scores[mid - 1] + scores[mid]) / 2.0
    }
}

/// Grade a score against a pass's possible-match window
fn grade_score(score: f64, window: (f64, f64)) -> MatchGrade {
    let (lower, upper) = window;
    if score >= upper {
        MatchGrade::Certain
    } else if score >= lower {
        MatchGrade::Possible
    } else {
        MatchGrade::CertainlyNot
    }
}

/// The best showing of one person cluster across all passes
struct PersonScore {
    person: Person,
    grade: MatchGrade,
    score: f64,
    pass_index: usize,
}

struct Evaluation {
    prediction: Prediction,
    matched: Option<Person>,
    results: Vec<LinkResult>,
}

fn evaluate_record(
    store: &dyn MpiStore,
    record: &PIIRecord,
    algorithm: &Algorithm,
) -> crate::Result<Evaluation> {
    let context = &algorithm.algorithm_context;
    let cleaned = clean(record, &context.skip_values);
    let log_odds = context.log_odds_map();

    // best (grade, score) seen for each person across all passes
    let mut bests: BTreeMap<i64, PersonScore> = BTreeMap::new();

    for (pass_index, pass) in algorithm.passes.iter().enumerate() {
        let candidates = store.get_block_data(
            &cleaned,
            pass,
            context.advanced.max_missing_allowed_proportion,
        )?;
        tracing::debug!(pass = pass_index, candidates = candidates.len(), "blocked candidates");

        // group candidates into person clusters; orphans are never
        // returned by the store
        let mut clusters: BTreeMap<i64, (Person, Vec<Patient>)> = BTreeMap::new();
        for patient in candidates {
            let person = match patient.person.clone() {
                Some(person) => person,
                None => continue,
            };
            clusters
                .entry(person.id)
                .or_insert_with(|| (person, Vec::new()))
                .1
                .push(patient);
        }

        for (person_id, (person, patients)) in clusters {
            let mut scores: Vec<f64> = patients
                .iter()
                .map(|p| {
                    score_records(
                        &cleaned,
                        &p.record,
                        pass,
                        &log_odds,
                        context.advanced.missing_field_points_proportion,
                    )
                })
                .collect();
            let cluster_score = median(&mut scores);
            let grade = grade_score(cluster_score, pass.possible_match_window);
            tracing::debug!(
                pass = pass_index,
                person = %person.reference_id,
                score = cluster_score,
                grade = ?grade,
                "cluster scored"
            );

            let entry = bests.entry(person_id);
            match entry {
                std::collections::btree_map::Entry::Vacant(vacant) => {
                    vacant.insert(PersonScore {
                        person,
                        grade,
                        score: cluster_score,
                        pass_index,
                    });
                }
                std::collections::btree_map::Entry::Occupied(mut occupied) => {
                    let best = occupied.get_mut();
                    if grade > best.grade || (grade == best.grade && cluster_score > best.score) {
                        best.grade = grade;
                        best.score = cluster_score;
                        best.pass_index = pass_index;
                    }
                }
            }
        }
    }

    // everything that reached at least "possible" on some pass, best
    // first. The tiebreak here orders the `results` list for display
    // only; attachment is decided solely by the certain_count check
    // below, never by which tied cluster happens to sort first.
    let mut ranked: Vec<PersonScore> = bests
        .into_values()
        .filter(|b| b.grade >= MatchGrade::Possible)
        .collect();
    ranked.sort_by(|a, b| {
        b.grade
            .cmp(&a.grade)
            .then(b.score.partial_cmp(&a.score).expect("scores are finite"))
            .then(a.person.reference_id.cmp(&b.person.reference_id))
    });

    let certain_count = ranked
        .iter()
        .filter(|b| b.grade == MatchGrade::Certain)
        .count();
    // a certain match is only attachable when the choice is unique;
    // with several clusters graded certain the record still predicts
    // as a match but gets a fresh person
    let (prediction, matched) = if certain_count == 1 {
        (Prediction::Match, Some(ranked[0].person.clone()))
    } else if certain_count > 1 {
        (Prediction::Match, None)
    } else if !ranked.is_empty() {
        (Prediction::PossibleMatch, None)
    } else {
        (Prediction::NoMatch, None)
    };

    // a match with include_multiple_matches disabled reports only the
    // single best cluster
    if prediction == Prediction::Match && !context.include_multiple_matches {
        ranked.truncate(1);
    }

    let results = ranked
        .into_iter()
        .map(|best| {
            let pass = &algorithm.passes[best.pass_index];
            LinkResult {
                person_reference_id: best.person.reference_id,
                accumulated_points: best.score * pass_max_points(pass, &log_odds),
                rms: best.score,
                mmt: pass.possible_match_window.0,
                cmt: pass.possible_match_window.1,
                grade: best.grade,
            }
        })
        .collect();

    Ok(Evaluation {
        prediction,
        matched,
        results,
    })
}

/// Evaluate an incoming record against the MPI without writing anything
pub fn match_record(
    store: &dyn MpiStore,
    record: &PIIRecord,
    algorithm: &Algorithm,
) -> crate::Result<MatchOutcome> {
    let evaluation = evaluate_record(store, record, algorithm)?;
    Ok(MatchOutcome {
        prediction: evaluation.prediction,
        person_reference_id: evaluation.matched.map(|p| p.reference_id),
        results: evaluation.results,
    })
}

/// Link an incoming record: evaluate it against the MPI, then insert it
/// as a new patient attached to the matched person, or to a fresh
/// person when no unique certain match exists
pub fn link_record(
    store: &dyn MpiStore,
    record: &PIIRecord,
    algorithm: &Algorithm,
    external_person_id: Option<&str>,
) -> crate::Result<LinkOutcome> {
    let evaluation = evaluate_record(store, record, algorithm)?;

    let attachment = match &evaluation.matched {
        Some(person) => PersonAttachment::Existing(person),
        // no unique certain match: either nothing matched, or several
        // clusters tied at certain and the choice is ambiguous
        None => PersonAttachment::NewPerson,
    };
    let patient = store.insert_patient(
        record,
        attachment,
        record.external_id.as_deref(),
        external_person_id,
    )?;
    let person = patient
        .person
        .as_ref()
        .ok_or_else(|| crate::Error::Internal("linked patient has no person".to_string()))?;

    let person_reference_id = match evaluation.prediction {
        // attachment to an existing cluster is deferred to manual review
        Prediction::PossibleMatch => None,
        Prediction::Match | Prediction::NoMatch => Some(person.reference_id),
    };

    tracing::info!(
        prediction = ?evaluation.prediction,
        patient = %patient.reference_id,
        "record linked"
    );

    Ok(LinkOutcome {
        prediction: evaluation.prediction,
        person_reference_id,
        patient_reference_id: patient.reference_id,
        results: evaluation.results,
    })
}
