//! End-to-end linkage scenarios against the in-memory MPI

use record_linkage::db::{MemoryStore, MpiStore, PersonAttachment};
use record_linkage::matching::{link_record, MatchGrade, Prediction};
use record_linkage::models::{
    AdvancedThresholds, Algorithm, AlgorithmContext, AlgorithmPass, BlockingKey, Evaluator,
    EvaluatorFunc, FeatureAttribute, LogOdd, PIIRecord, PassKwargs, SimilarityMeasure,
};

fn record(json: serde_json::Value) -> PIIRecord {
    PIIRecord::from_value(json).unwrap()
}

fn shepard() -> PIIRecord {
    record(serde_json::json!({
        "name": [{"given": ["John"], "family": "Shepard"}],
        "birth_date": "1953-11-07"
    }))
}

/// One pass blocking on birthdate: FIRST_NAME fuzzy (JaroWinkler, 0.9)
/// and BIRTHDATE exact
fn exact_fuzzy_algorithm() -> Algorithm {
    Algorithm {
        label: "test-exact-fuzzy".to_string(),
        description: None,
        is_default: false,
        algorithm_context: AlgorithmContext::default(),
        passes: vec![AlgorithmPass {
            blocking_keys: vec![BlockingKey::Birthdate],
            evaluators: vec![
                Evaluator {
                    feature: FeatureAttribute::FirstName.into(),
                    func: EvaluatorFunc::FuzzyMatch,
                    fuzzy_match_threshold: Some(0.9),
                    fuzzy_match_measure: Some(SimilarityMeasure::JaroWinkler),
                },
                Evaluator::new(
                    FeatureAttribute::Birthdate.into(),
                    EvaluatorFunc::ExactMatchAny,
                ),
            ],
            possible_match_window: (0.5, 1.0),
            kwargs: PassKwargs::default(),
        }],
    }
}

#[test]
fn test_cold_insert_creates_new_cluster() {
    let store = MemoryStore::new();
    let algorithm = exact_fuzzy_algorithm();

    let outcome = link_record(&store, &shepard(), &algorithm, None).unwrap();
    assert_eq!(outcome.prediction, Prediction::NoMatch);
    assert!(outcome.person_reference_id.is_some());
    assert!(outcome.results.is_empty());

    let patient = store.get_patients(&[outcome.patient_reference_id]).unwrap()[0]
        .clone()
        .expect("patient was inserted");
    assert_eq!(
        patient.person.unwrap().reference_id,
        outcome.person_reference_id.unwrap()
    );
}

#[test]
fn test_fuzzy_first_name_links_to_existing_cluster() {
    let store = MemoryStore::new();
    let algorithm = exact_fuzzy_algorithm();

    let first = link_record(&store, &shepard(), &algorithm, None).unwrap();

    let variant = record(serde_json::json!({
        "name": [{"given": ["Jon"], "family": "Shepard"}],
        "birth_date": "1953-11-07"
    }));
    let second = link_record(&store, &variant, &algorithm, None).unwrap();
    assert_eq!(second.prediction, Prediction::Match);
    assert_eq!(second.person_reference_id, first.person_reference_id);
    assert_eq!(second.results.len(), 1);
    assert_eq!(second.results[0].grade, MatchGrade::Certain);
}

#[test]
fn test_different_individual_gets_new_cluster() {
    let store = MemoryStore::new();
    let algorithm = exact_fuzzy_algorithm();

    let first = link_record(&store, &shepard(), &algorithm, None).unwrap();

    let other = record(serde_json::json!({
        "name": [{"given": ["Jane"], "family": "Smith"}],
        "birth_date": "1986-01-10"
    }));
    let second = link_record(&store, &other, &algorithm, None).unwrap();
    assert_eq!(second.prediction, Prediction::NoMatch);
    assert_ne!(second.person_reference_id, first.person_reference_id);
}

/// One probabilistic fuzzy pass over FIRST_NAME with a (0.7, 0.9)
/// window; scores equal the best name similarity
fn cluster_window_algorithm() -> Algorithm {
    Algorithm {
        label: "test-cluster-window".to_string(),
        description: None,
        is_default: false,
        algorithm_context: AlgorithmContext {
            include_multiple_matches: true,
            skip_values: Vec::new(),
            log_odds: vec![LogOdd {
                feature: FeatureAttribute::FirstName.into(),
                value: 1.0,
            }],
            advanced: AdvancedThresholds::default(),
        },
        passes: vec![AlgorithmPass {
            blocking_keys: vec![BlockingKey::Birthdate, BlockingKey::Zip],
            evaluators: vec![Evaluator {
                feature: FeatureAttribute::FirstName.into(),
                func: EvaluatorFunc::CompareProbabilisticFuzzyMatch,
                fuzzy_match_threshold: Some(0.7),
                fuzzy_match_measure: Some(SimilarityMeasure::JaroWinkler),
            }],
            possible_match_window: (0.7, 0.9),
            kwargs: PassKwargs::default(),
        }],
    }
}

#[test]
fn test_cluster_median_lands_in_possible_window() {
    let store = MemoryStore::new();

    // three observations of one person with name variants
    let members: Vec<PIIRecord> = [
        ("Alejandro", "Villanueve"),
        ("Alejandro", "Villanueva"),
        ("Alejandr", "Villanueve"),
    ]
    .iter()
    .map(|(given, family)| {
        record(serde_json::json!({
            "name": [{"given": [given], "family": family}],
            "birth_date": "1980-01-01",
            "address": [{"zip": "15935"}]
        }))
    })
    .collect();
    let seeded = store
        .bulk_insert_patients(&members, PersonAttachment::NewPerson, None)
        .unwrap();
    let seeded_person = seeded[0].person.clone().unwrap();

    let incoming = record(serde_json::json!({
        "name": [{"given": ["Aelxdrano"], "family": "Villanueve"}],
        "birth_date": "1980-01-01",
        "address": [{"zip": "15935"}]
    }));
    let outcome = link_record(&store, &incoming, &cluster_window_algorithm(), None).unwrap();

    assert_eq!(outcome.prediction, Prediction::PossibleMatch);
    // possible matches are reported but never linked
    assert_eq!(outcome.person_reference_id, None);
    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert_eq!(result.grade, MatchGrade::Possible);
    assert_eq!(result.person_reference_id, seeded_person.reference_id);
    assert!(result.rms >= result.mmt && result.rms < result.cmt);

    // the incoming record got a brand-new person cluster
    let inserted = store.get_patients(&[outcome.patient_reference_id]).unwrap()[0]
        .clone()
        .unwrap();
    assert_ne!(
        inserted.person.unwrap().reference_id,
        seeded_person.reference_id
    );
}

#[test]
fn test_tied_certain_clusters_attach_to_new_person() {
    let store = MemoryStore::new();
    let algorithm = exact_fuzzy_algorithm();

    // two distinct persons holding identical observations: both
    // clusters grade certain for the incoming record on the same pass
    let person_a = store
        .bulk_insert_patients(&[shepard()], PersonAttachment::NewPerson, None)
        .unwrap()[0]
        .person
        .clone()
        .unwrap();
    let person_b = store
        .bulk_insert_patients(&[shepard()], PersonAttachment::NewPerson, None)
        .unwrap()[0]
        .person
        .clone()
        .unwrap();

    let outcome = link_record(&store, &shepard(), &algorithm, None).unwrap();
    assert_eq!(outcome.prediction, Prediction::Match);
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.grade == MatchGrade::Certain));

    // the choice is ambiguous, so the record must not be attached to
    // either tied cluster
    let attached = store.get_patients(&[outcome.patient_reference_id]).unwrap()[0]
        .clone()
        .unwrap()
        .person
        .unwrap();
    assert_ne!(attached.reference_id, person_a.reference_id);
    assert_ne!(attached.reference_id, person_b.reference_id);
    assert_eq!(outcome.person_reference_id, Some(attached.reference_id));
}

#[test]
fn test_mrn_blocking_id_is_stable_across_upgrade() {
    let store = MemoryStore::new();
    let with_mrn = record(serde_json::json!({
        "name": [{"given": ["Urdnot"], "family": "Wrex"}],
        "identifiers": [{"type": "MR", "value": "123456789"}]
    }));
    let inserted = store
        .insert_patient(&with_mrn, PersonAttachment::NewPerson, None, None)
        .unwrap();

    // id 2 must forever mean "last 4 chars of MRN"
    let key = BlockingKey::from_id(2).unwrap();
    assert_eq!(key, BlockingKey::Mrn);
    assert!(with_mrn.blocking_keys(key).contains("6789"));

    // a pass blocking only on that key retrieves the patient
    let pass = AlgorithmPass {
        blocking_keys: vec![key],
        evaluators: vec![Evaluator::new(
            FeatureAttribute::Mrn.into(),
            EvaluatorFunc::ExactMatchAny,
        )],
        possible_match_window: (0.5, 1.0),
        kwargs: PassKwargs::default(),
    };
    let candidates = store.get_block_data(&with_mrn, &pass, 0.5).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].reference_id, inserted.reference_id);
}

#[test]
fn test_record_with_no_blocking_keys_skips_all_passes() {
    let store = MemoryStore::new();
    let algorithm = exact_fuzzy_algorithm();
    link_record(&store, &shepard(), &algorithm, None).unwrap();

    // no birthdate: the only pass cannot block, so everything is skipped
    let sparse = record(serde_json::json!({
        "name": [{"given": ["John"], "family": "Shepard"}]
    }));
    let outcome = link_record(&store, &sparse, &algorithm, None).unwrap();
    assert_eq!(outcome.prediction, Prediction::NoMatch);
    assert!(outcome.results.is_empty());
}

#[test]
fn test_relink_of_seeded_record_matches_its_cluster() {
    let store = MemoryStore::new();
    let algorithm = exact_fuzzy_algorithm();
    let seeded = store
        .bulk_insert_patients(&[shepard()], PersonAttachment::NewPerson, None)
        .unwrap();
    let person = seeded[0].person.clone().unwrap();

    let outcome = link_record(&store, &seeded[0].record, &algorithm, None).unwrap();
    assert_eq!(outcome.prediction, Prediction::Match);
    assert_eq!(outcome.person_reference_id, Some(person.reference_id));
}

#[test]
fn test_linkage_is_deterministic() {
    let run = || {
        let store = MemoryStore::new();
        let algorithm = cluster_window_algorithm();
        let members: Vec<PIIRecord> = (0..3)
            .map(|i| {
                record(serde_json::json!({
                    "name": [{"given": [format!("Variant{i}")], "family": "Kryik"}],
                    "birth_date": "1980-01-01",
                    "address": [{"zip": "15935"}]
                }))
            })
            .collect();
        store
            .bulk_insert_patients(&members, PersonAttachment::NewPerson, None)
            .unwrap();
        let incoming = record(serde_json::json!({
            "name": [{"given": ["Variant0"], "family": "Kryik"}],
            "birth_date": "1980-01-01",
            "address": [{"zip": "15935"}]
        }));
        let outcome = link_record(&store, &incoming, &algorithm, None).unwrap();
        (
            outcome.prediction,
            outcome
                .results
                .iter()
                .map(|r| (r.grade, r.rms.to_bits()))
                .collect::<Vec<_>>(),
        )
    };
    assert_eq!(run(), run());
}

#[test]
fn test_external_person_id_recorded_on_patient() {
    let store = MemoryStore::new();
    let algorithm = exact_fuzzy_algorithm();
    let outcome = link_record(&store, &shepard(), &algorithm, Some("EXT-42")).unwrap();
    let patient = store.get_patients(&[outcome.patient_reference_id]).unwrap()[0]
        .clone()
        .unwrap();
    assert_eq!(patient.external_person_id.as_deref(), Some("EXT-42"));
    assert_eq!(patient.external_person_source.as_deref(), Some("IRIS"));
}

#[test]
fn test_skip_values_suppress_placeholder_matches() {
    let store = MemoryStore::new();
    let mut algorithm = exact_fuzzy_algorithm();
    algorithm.algorithm_context.skip_values = vec![record_linkage::models::SkipValue {
        feature: "FIRST_NAME".to_string(),
        values: vec!["john".to_string()],
    }];

    link_record(&store, &shepard(), &algorithm, None).unwrap();
    // the cleaned incoming record has no first name left, so the fuzzy
    // evaluator sees one-sided data and scores zero for it
    let outcome = link_record(&store, &shepard(), &algorithm, None).unwrap();
    assert_ne!(outcome.prediction, Prediction::Match);
}
