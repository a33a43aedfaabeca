//! In-memory implementation of the store traits
//!
//! Mirrors the Diesel store's semantics over plain maps, keyed by the
//! same numeric ids. Used by the test suite and for running the
//! service without a database.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{
    Algorithm, AlgorithmPass, BlockingKey, PIIRecord, Patient, Person, TuningJob, TuningParams,
    TuningResults, TuningStatus,
};
use crate::Result;

use super::repositories::{
    AlgorithmStore, MpiStore, PersonAttachment, TuningPairSample, TuningStore,
};

const EXTERNAL_PERSON_SOURCE: &str = "IRIS";

#[derive(Debug, Clone)]
struct StoredPatient {
    reference_id: Uuid,
    person_id: Option<i64>,
    record: PIIRecord,
    external_patient_id: Option<String>,
    external_person_id: Option<String>,
    external_person_source: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    next_person_id: i64,
    next_patient_id: i64,
    // person id -> reference id
    persons: BTreeMap<i64, Uuid>,
    patients: BTreeMap<i64, StoredPatient>,
    // patient id -> (blocking key id, value) pairs
    blocking: BTreeMap<i64, Vec<(i16, String)>>,
    algorithms: Vec<Algorithm>,
    jobs: BTreeMap<Uuid, TuningJob>,
}

impl Inner {
    fn create_person(&mut self) -> Person {
        self.next_person_id += 1;
        let person = Person {
            id: self.next_person_id,
            reference_id: Uuid::new_v4(),
        };
        self.persons.insert(person.id, person.reference_id);
        person
    }

    fn person(&self, id: i64) -> Option<Person> {
        self.persons.get(&id).map(|reference_id| Person {
            id,
            reference_id: *reference_id,
        })
    }

    fn person_by_reference(&self, reference_id: Uuid) -> Option<Person> {
        self.persons
            .iter()
            .find(|(_, rid)| **rid == reference_id)
            .map(|(id, rid)| Person {
                id: *id,
                reference_id: *rid,
            })
    }

    fn patient_id_by_reference(&self, reference_id: Uuid) -> Option<i64> {
        self.patients
            .iter()
            .find(|(_, p)| p.reference_id == reference_id)
            .map(|(id, _)| *id)
    }

    fn insert_patient(
        &mut self,
        record: &PIIRecord,
        person_id: Option<i64>,
        external_patient_id: Option<&str>,
        external_person_id: Option<&str>,
    ) -> i64 {
        self.next_patient_id += 1;
        let id = self.next_patient_id;
        self.patients.insert(
            id,
            StoredPatient {
                reference_id: Uuid::new_v4(),
                person_id,
                record: record.clone(),
                external_patient_id: external_patient_id.map(str::to_string),
                external_person_id: external_person_id.map(str::to_string),
                external_person_source: external_person_id
                    .map(|_| EXTERNAL_PERSON_SOURCE.to_string()),
            },
        );
        self.rewrite_blocking_values(id);
        id
    }

    fn rewrite_blocking_values(&mut self, patient_id: i64) {
        let pairs = match self.patients.get(&patient_id) {
            Some(patient) => patient
                .record
                .blocking_values()
                .into_iter()
                .map(|(key, value)| (key.id(), value))
                .collect(),
            None => Vec::new(),
        };
        self.blocking.insert(patient_id, pairs);
    }

    fn to_domain(&self, id: i64, stored: &StoredPatient) -> Patient {
        Patient {
            id,
            reference_id: stored.reference_id,
            person: stored.person_id.and_then(|pid| self.person(pid)),
            record: stored.record.clone(),
            external_patient_id: stored.external_patient_id.clone(),
            external_person_id: stored.external_person_id.clone(),
            external_person_source: stored.external_person_source.clone(),
        }
    }

    fn resolve_attachment(&mut self, attachment: PersonAttachment<'_>) -> Option<i64> {
        match attachment {
            PersonAttachment::Existing(person) => Some(person.id),
            PersonAttachment::NewPerson => Some(self.create_person().id),
            PersonAttachment::Orphaned => None,
        }
    }
}

/// An in-memory MPI, algorithm and tuning store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl MpiStore for MemoryStore {
    fn insert_patient(
        &self,
        record: &PIIRecord,
        person: PersonAttachment<'_>,
        external_patient_id: Option<&str>,
        external_person_id: Option<&str>,
    ) -> Result<Patient> {
        let mut inner = self.lock();
        let person_id = inner.resolve_attachment(person);
        let id = inner.insert_patient(record, person_id, external_patient_id, external_person_id);
        let stored = inner.patients[&id].clone();
        Ok(inner.to_domain(id, &stored))
    }

    fn bulk_insert_patients(
        &self,
        records: &[PIIRecord],
        person: PersonAttachment<'_>,
        external_person_id: Option<&str>,
    ) -> Result<Vec<Patient>> {
        let mut inner = self.lock();
        let person_id = inner.resolve_attachment(person);
        let mut patients = Vec::with_capacity(records.len());
        for record in records {
            let id = inner.insert_patient(
                record,
                person_id,
                record.external_id.as_deref(),
                external_person_id,
            );
            let stored = inner.patients[&id].clone();
            patients.push(inner.to_domain(id, &stored));
        }
        Ok(patients)
    }

    fn update_patient(
        &self,
        reference_id: Uuid,
        record: Option<&PIIRecord>,
        person: Option<&Person>,
        external_patient_id: Option<&str>,
    ) -> Result<Patient> {
        let mut inner = self.lock();
        let id = inner.patient_id_by_reference(reference_id).ok_or_else(|| {
            crate::Error::NotFound(format!("no patient with reference id {reference_id}"))
        })?;
        {
            let stored = inner.patients.get_mut(&id).expect("patient id resolved");
            if let Some(record) = record {
                stored.record = record.clone();
            }
            if let Some(person) = person {
                stored.person_id = Some(person.id);
            }
            if let Some(external_patient_id) = external_patient_id {
                stored.external_patient_id = Some(external_patient_id.to_string());
            }
        }
        if record.is_some() {
            inner.rewrite_blocking_values(id);
        }
        let stored = inner.patients[&id].clone();
        Ok(inner.to_domain(id, &stored))
    }

    fn get_patients(&self, reference_ids: &[Uuid]) -> Result<Vec<Option<Patient>>> {
        let inner = self.lock();
        Ok(reference_ids
            .iter()
            .map(|rid| {
                inner
                    .patient_id_by_reference(*rid)
                    .map(|id| inner.to_domain(id, &inner.patients[&id]))
            })
            .collect())
    }

    fn delete_patient(&self, reference_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        let id = inner.patient_id_by_reference(reference_id).ok_or_else(|| {
            crate::Error::NotFound(format!("no patient with reference id {reference_id}"))
        })?;
        inner.patients.remove(&id);
        inner.blocking.remove(&id);
        Ok(())
    }

    fn create_person(&self) -> Result<Person> {
        Ok(self.lock().create_person())
    }

    fn get_person(&self, reference_id: Uuid) -> Result<Option<Person>> {
        Ok(self.lock().person_by_reference(reference_id))
    }

    fn update_person_cluster(
        &self,
        patient_reference_ids: &[Uuid],
        person: Option<&Person>,
    ) -> Result<Person> {
        let mut inner = self.lock();
        let person = match person {
            Some(person) => person.clone(),
            None => inner.create_person(),
        };
        let mut ids = Vec::with_capacity(patient_reference_ids.len());
        for reference_id in patient_reference_ids {
            let id = inner.patient_id_by_reference(*reference_id).ok_or_else(|| {
                crate::Error::NotFound(format!("no patient with reference id {reference_id}"))
            })?;
            ids.push(id);
        }
        for id in ids {
            inner
                .patients
                .get_mut(&id)
                .expect("patient id resolved")
                .person_id = Some(person.id);
        }
        Ok(person)
    }

    fn update_patient_person_ids(
        &self,
        person: &Person,
        old_person_reference_ids: &[Uuid],
    ) -> Result<usize> {
        let mut inner = self.lock();
        let old_ids: HashSet<i64> = old_person_reference_ids
            .iter()
            .filter_map(|rid| inner.person_by_reference(*rid))
            .map(|p| p.id)
            .collect();
        let mut moved = 0;
        for stored in inner.patients.values_mut() {
            if stored
                .person_id
                .map(|pid| old_ids.contains(&pid))
                .unwrap_or(false)
            {
                stored.person_id = Some(person.id);
                moved += 1;
            }
        }
        Ok(moved)
    }

    fn delete_persons(&self, persons: &[Person]) -> Result<()> {
        let mut inner = self.lock();
        for person in persons {
            let attached = inner
                .patients
                .values()
                .filter(|p| p.person_id == Some(person.id))
                .count();
            if attached > 0 {
                return Err(crate::Error::Conflict(format!(
                    "person {} still has {attached} attached patients",
                    person.reference_id
                )));
            }
        }
        for person in persons {
            inner.persons.remove(&person.id);
        }
        Ok(())
    }

    fn get_orphaned_patients(&self, limit: i64, cursor: Option<Uuid>) -> Result<Vec<Patient>> {
        let inner = self.lock();
        let mut orphans: Vec<Patient> = inner
            .patients
            .iter()
            .filter(|(_, p)| p.person_id.is_none())
            .filter(|(_, p)| cursor.map(|c| p.reference_id > c).unwrap_or(true))
            .map(|(id, p)| inner.to_domain(*id, p))
            .collect();
        orphans.sort_by_key(|p| p.reference_id);
        orphans.truncate(limit.max(0) as usize);
        Ok(orphans)
    }

    fn get_block_data(
        &self,
        record: &PIIRecord,
        pass: &AlgorithmPass,
        max_missing_allowed_proportion: f64,
    ) -> Result<Vec<Patient>> {
        let total = pass.blocking_keys.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let mut key_values: Vec<(BlockingKey, HashSet<String>)> = Vec::new();
        let mut missing = 0usize;
        for key in &pass.blocking_keys {
            let vals: HashSet<String> = record.blocking_keys(*key).into_iter().collect();
            if vals.is_empty() {
                missing += 1;
            } else {
                key_values.push((*key, vals));
            }
        }
        if key_values.is_empty() || (missing as f64 / total as f64) > max_missing_allowed_proportion
        {
            return Ok(Vec::new());
        }

        let inner = self.lock();
        let values_for = |patient_id: i64, key: BlockingKey| -> Vec<&String> {
            inner
                .blocking
                .get(&patient_id)
                .map(|pairs| {
                    pairs
                        .iter()
                        .filter(|(k, _)| *k == key.id())
                        .map(|(_, v)| v)
                        .collect()
                })
                .unwrap_or_default()
        };

        // person clusters with at least one patient agreeing on every
        // non-missing key
        let mut person_ids: HashSet<i64> = HashSet::new();
        for (id, stored) in &inner.patients {
            let Some(person_id) = stored.person_id else {
                continue;
            };
            let seeds = key_values.iter().all(|(key, vals)| {
                values_for(*id, *key).iter().any(|v| vals.contains(*v))
            });
            if seeds {
                person_ids.insert(person_id);
            }
        }

        // keep cluster members that don't actively disagree on any key
        let mut patients = Vec::new();
        for (id, stored) in &inner.patients {
            let Some(person_id) = stored.person_id else {
                continue;
            };
            if !person_ids.contains(&person_id) {
                continue;
            }
            let agrees = key_values.iter().all(|(key, vals)| {
                let own = values_for(*id, *key);
                own.is_empty() || own.iter().any(|v| vals.contains(*v))
            });
            if agrees {
                patients.push(inner.to_domain(*id, stored));
            }
        }
        Ok(patients)
    }

    fn sample_tuning_pairs(
        &self,
        true_match_pairs: usize,
        non_match_pairs: usize,
    ) -> Result<TuningPairSample> {
        let inner = self.lock();
        let mut by_person: BTreeMap<i64, Vec<&StoredPatient>> = BTreeMap::new();
        for stored in inner.patients.values() {
            if let Some(person_id) = stored.person_id {
                by_person.entry(person_id).or_default().push(stored);
            }
        }

        let mut sample = TuningPairSample::default();
        'outer: for members in by_person.values() {
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    if sample.true_match.len() >= true_match_pairs {
                        break 'outer;
                    }
                    sample
                        .true_match
                        .push((members[i].record.clone(), members[j].record.clone()));
                }
            }
        }

        let clusters: Vec<&Vec<&StoredPatient>> = by_person.values().collect();
        'outer: for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                for a in clusters[i] {
                    for b in clusters[j] {
                        if sample.non_match.len() >= non_match_pairs {
                            break 'outer;
                        }
                        sample.non_match.push((a.record.clone(), b.record.clone()));
                    }
                }
            }
        }
        Ok(sample)
    }

    fn reset_mpi(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.persons.clear();
        inner.patients.clear();
        inner.blocking.clear();
        Ok(())
    }

    fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}

impl AlgorithmStore for MemoryStore {
    fn list_algorithms(&self) -> Result<Vec<Algorithm>> {
        Ok(self.lock().algorithms.clone())
    }

    fn get_algorithm(&self, label: &str) -> Result<Option<Algorithm>> {
        Ok(self
            .lock()
            .algorithms
            .iter()
            .find(|a| a.label == label)
            .cloned())
    }

    fn default_algorithm(&self) -> Result<Option<Algorithm>> {
        Ok(self.lock().algorithms.iter().find(|a| a.is_default).cloned())
    }

    fn create_algorithm(&self, algorithm: &Algorithm) -> Result<()> {
        algorithm.validate()?;
        let mut inner = self.lock();
        if inner.algorithms.iter().any(|a| a.label == algorithm.label) {
            return Err(crate::Error::Conflict(format!(
                "algorithm with label '{}' already exists",
                algorithm.label
            )));
        }
        if algorithm.is_default && inner.algorithms.iter().any(|a| a.is_default) {
            return Err(crate::Error::Validation(
                "there can only be one default algorithm".to_string(),
            ));
        }
        inner.algorithms.push(algorithm.clone());
        Ok(())
    }

    fn update_algorithm(&self, label: &str, algorithm: &Algorithm) -> Result<()> {
        algorithm.validate()?;
        let mut inner = self.lock();
        let position = inner
            .algorithms
            .iter()
            .position(|a| a.label == label)
            .ok_or_else(|| crate::Error::NotFound(format!("no algorithm with label '{label}'")))?;
        if algorithm.is_default
            && inner
                .algorithms
                .iter()
                .any(|a| a.is_default && a.label != label)
        {
            return Err(crate::Error::Validation(
                "there can only be one default algorithm".to_string(),
            ));
        }
        inner.algorithms[position] = algorithm.clone();
        Ok(())
    }

    fn delete_algorithm(&self, label: &str) -> Result<()> {
        let mut inner = self.lock();
        let position = inner
            .algorithms
            .iter()
            .position(|a| a.label == label)
            .ok_or_else(|| crate::Error::NotFound(format!("no algorithm with label '{label}'")))?;
        inner.algorithms.remove(position);
        Ok(())
    }
}

impl TuningStore for MemoryStore {
    fn start_job(&self, params: TuningParams) -> Result<TuningJob> {
        params.validate()?;
        let mut inner = self.lock();
        if inner.jobs.values().any(|j| j.status.is_active()) {
            return Err(crate::Error::Conflict(
                "a tuning job is already active".to_string(),
            ));
        }
        let job = TuningJob {
            id: Uuid::new_v4(),
            status: TuningStatus::Pending,
            params,
            results: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn get_job(&self, id: Uuid) -> Result<Option<TuningJob>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    fn update_job(
        &self,
        id: Uuid,
        status: TuningStatus,
        results: Option<TuningResults>,
    ) -> Result<TuningJob> {
        let mut inner = self.lock();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| crate::Error::NotFound(format!("no tuning job with id {id}")))?;
        job.status = status;
        if !status.is_active() {
            job.finished_at = Some(Utc::now());
        }
        if let Some(results) = results {
            job.results = Some(results);
        }
        Ok(job.clone())
    }

    fn fail_stale_jobs(&self, max_age_secs: i64) -> Result<usize> {
        let mut inner = self.lock();
        let threshold = Utc::now() - Duration::seconds(max_age_secs);
        let mut failed = 0;
        for job in inner.jobs.values_mut() {
            if job.status.is_active() && job.started_at < threshold {
                job.status = TuningStatus::Failed;
                job.finished_at = Some(Utc::now());
                job.results = Some(TuningResults {
                    details: "canceled incomplete job".to_string(),
                    ..Default::default()
                });
                failed += 1;
            }
        }
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_algorithm, PassKwargs};

    fn record(json: serde_json::Value) -> PIIRecord {
        PIIRecord::from_value(json).unwrap()
    }

    fn shepard() -> PIIRecord {
        record(serde_json::json!({
            "birth_date": "1953-11-07",
            "sex": "M",
            "name": [{"given": ["John"], "family": "Shepard"}],
            "address": [{"zip": "99999"}]
        }))
    }

    fn simple_pass(keys: Vec<BlockingKey>) -> AlgorithmPass {
        AlgorithmPass {
            blocking_keys: keys,
            evaluators: vec![crate::models::Evaluator::new(
                crate::models::FeatureAttribute::FirstName.into(),
                crate::models::EvaluatorFunc::ExactMatchAny,
            )],
            possible_match_window: (0.7, 0.9),
            kwargs: PassKwargs::default(),
        }
    }

    #[test]
    fn test_insert_patient_materializes_blocking_values() {
        let store = MemoryStore::new();
        let patient = store
            .insert_patient(&shepard(), PersonAttachment::NewPerson, None, None)
            .unwrap();
        assert!(patient.person.is_some());

        let inner = store.lock();
        let pairs = &inner.blocking[&patient.id];
        let expected: Vec<(i16, String)> = shepard()
            .blocking_values()
            .into_iter()
            .map(|(k, v)| (k.id(), v))
            .collect();
        assert_eq!(pairs, &expected);
    }

    #[test]
    fn test_update_patient_rewrites_blocking_values() {
        let store = MemoryStore::new();
        let patient = store
            .insert_patient(&shepard(), PersonAttachment::NewPerson, None, None)
            .unwrap();
        let new_record = record(serde_json::json!({
            "name": [{"given": ["Jane"], "family": "Shepard"}]
        }));
        store
            .update_patient(patient.reference_id, Some(&new_record), None, None)
            .unwrap();

        let inner = store.lock();
        let pairs = &inner.blocking[&patient.id];
        assert!(pairs.iter().any(|(k, v)| *k == 5 && v == "jane"));
        assert!(!pairs.iter().any(|(k, _)| *k == 1));
    }

    #[test]
    fn test_block_data_excludes_orphans() {
        let store = MemoryStore::new();
        store
            .insert_patient(&shepard(), PersonAttachment::Orphaned, None, None)
            .unwrap();
        let pass = simple_pass(vec![BlockingKey::Birthdate]);
        let candidates = store.get_block_data(&shepard(), &pass, 0.5).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_block_data_returns_cluster_siblings() {
        let store = MemoryStore::new();
        let person = store.create_person().unwrap();
        store
            .insert_patient(&shepard(), PersonAttachment::Existing(&person), None, None)
            .unwrap();
        // sibling with no birthdate at all: absent key is unconstrained
        let sibling = record(serde_json::json!({
            "name": [{"given": ["John"], "family": "Shepard"}]
        }));
        store
            .insert_patient(&sibling, PersonAttachment::Existing(&person), None, None)
            .unwrap();

        let pass = simple_pass(vec![BlockingKey::Birthdate]);
        let candidates = store.get_block_data(&shepard(), &pass, 0.5).unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_block_data_rejects_active_disagreement() {
        let store = MemoryStore::new();
        let person = store.create_person().unwrap();
        store
            .insert_patient(&shepard(), PersonAttachment::Existing(&person), None, None)
            .unwrap();
        // sibling with a different birthdate actively disagrees
        let sibling = record(serde_json::json!({
            "birth_date": "1999-01-01",
            "name": [{"given": ["John"], "family": "Shepard"}]
        }));
        store
            .insert_patient(&sibling, PersonAttachment::Existing(&person), None, None)
            .unwrap();

        let pass = simple_pass(vec![BlockingKey::Birthdate]);
        let candidates = store.get_block_data(&shepard(), &pass, 0.5).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_block_data_missing_proportion_gate() {
        let store = MemoryStore::new();
        let person = store.create_person().unwrap();
        store
            .insert_patient(&shepard(), PersonAttachment::Existing(&person), None, None)
            .unwrap();

        // record with only a name: birthdate+zip missing = 2/3 keys
        let sparse = record(serde_json::json!({
            "name": [{"given": ["John"], "family": "Shepard"}]
        }));
        let pass = simple_pass(vec![
            BlockingKey::Birthdate,
            BlockingKey::Zip,
            BlockingKey::FirstName,
        ]);
        assert!(store.get_block_data(&sparse, &pass, 0.5).unwrap().is_empty());
        assert!(!store.get_block_data(&sparse, &pass, 0.7).unwrap().is_empty());
    }

    #[test]
    fn test_delete_person_with_patients_conflicts() {
        let store = MemoryStore::new();
        let person = store.create_person().unwrap();
        store
            .insert_patient(&shepard(), PersonAttachment::Existing(&person), None, None)
            .unwrap();
        assert!(matches!(
            store.delete_persons(&[person.clone()]),
            Err(crate::Error::Conflict(_))
        ));

        // detach the patient, then deletion succeeds
        let other = store.update_person_cluster(&[], None).unwrap();
        let moved = store
            .update_patient_person_ids(&other, &[person.reference_id])
            .unwrap();
        assert_eq!(moved, 1);
        assert!(store.delete_persons(&[person]).is_ok());
    }

    #[test]
    fn test_orphan_pagination_is_stable() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            store
                .insert_patient(&PIIRecord::default(), PersonAttachment::Orphaned, None, None)
                .unwrap();
        }
        let first = store.get_orphaned_patients(2, None).unwrap();
        assert_eq!(first.len(), 2);
        let rest = store
            .get_orphaned_patients(10, Some(first[1].reference_id))
            .unwrap();
        assert_eq!(rest.len(), 3);
        assert!(rest.iter().all(|p| p.reference_id > first[1].reference_id));
    }

    #[test]
    fn test_single_active_tuning_job() {
        let store = MemoryStore::new();
        let params = TuningParams {
            true_match_pairs: 10,
            non_match_pairs: 10,
        };
        let job = store.start_job(params).unwrap();
        assert!(matches!(
            store.start_job(params),
            Err(crate::Error::Conflict(_))
        ));
        store
            .update_job(job.id, TuningStatus::Completed, None)
            .unwrap();
        assert!(store.start_job(params).is_ok());
    }

    #[test]
    fn test_completed_job_has_finished_at() {
        let store = MemoryStore::new();
        let params = TuningParams {
            true_match_pairs: 1,
            non_match_pairs: 1,
        };
        let job = store.start_job(params).unwrap();
        let updated = store
            .update_job(job.id, TuningStatus::Completed, None)
            .unwrap();
        assert!(updated.finished_at.unwrap() >= updated.started_at);
    }

    #[test]
    fn test_single_default_algorithm() {
        let store = MemoryStore::new();
        store.create_algorithm(&default_algorithm()).unwrap();
        let mut second = default_algorithm();
        second.label = "another-default".to_string();
        assert!(store.create_algorithm(&second).is_err());
        second.is_default = false;
        assert!(store.create_algorithm(&second).is_ok());
    }

    #[test]
    fn test_sample_tuning_pairs_classes() {
        let store = MemoryStore::new();
        let person_a = store.create_person().unwrap();
        let person_b = store.create_person().unwrap();
        for _ in 0..2 {
            store
                .insert_patient(&shepard(), PersonAttachment::Existing(&person_a), None, None)
                .unwrap();
            store
                .insert_patient(&shepard(), PersonAttachment::Existing(&person_b), None, None)
                .unwrap();
        }
        let sample = store.sample_tuning_pairs(10, 10).unwrap();
        assert_eq!(sample.true_match.len(), 2);
        assert_eq!(sample.non_match.len(), 4);
    }
}
