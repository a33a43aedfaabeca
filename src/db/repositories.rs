//! Repository traits for the MPI, algorithm and tuning stores
//!
//! The stores own all Patient and BlockingValue rows: the matching
//! engine never writes patient state except through [`MpiStore`]. Each
//! operation is transactional, so a single link or seed request leaves
//! no partial writes behind.

use uuid::Uuid;

use crate::models::{
    Algorithm, AlgorithmPass, PIIRecord, Patient, Person, TuningJob, TuningParams, TuningResults,
    TuningStatus,
};
use crate::Result;

/// How a newly inserted patient attaches to a person cluster
#[derive(Debug, Clone, Copy)]
pub enum PersonAttachment<'a> {
    /// Attach to an existing person
    Existing(&'a Person),

    /// Create a fresh person in the same transaction
    NewPerson,

    /// Leave the patient orphaned; it will never be returned as a
    /// linkage candidate
    Orphaned,
}

/// Labeled record pairs sampled from the MPI for tuning
#[derive(Debug, Clone, Default)]
pub struct TuningPairSample {
    /// Pairs of records attached to the same person
    pub true_match: Vec<(PIIRecord, PIIRecord)>,

    /// Pairs of records attached to different persons
    pub non_match: Vec<(PIIRecord, PIIRecord)>,
}

/// Master Patient Index persistence operations
pub trait MpiStore: Send + Sync {
    /// Insert a new patient and its blocking values in one transaction
    fn insert_patient(
        &self,
        record: &PIIRecord,
        person: PersonAttachment<'_>,
        external_patient_id: Option<&str>,
        external_person_id: Option<&str>,
    ) -> Result<Patient>;

    /// Insert multiple patients under one person; returned patients are
    /// in input order
    fn bulk_insert_patients(
        &self,
        records: &[PIIRecord],
        person: PersonAttachment<'_>,
        external_person_id: Option<&str>,
    ) -> Result<Vec<Patient>>;

    /// Update an existing patient; supplying a record rewrites its
    /// blocking values in the same transaction
    fn update_patient(
        &self,
        reference_id: Uuid,
        record: Option<&PIIRecord>,
        person: Option<&Person>,
        external_patient_id: Option<&str>,
    ) -> Result<Patient>;

    /// Fetch patients by reference id, preserving input order; unknown
    /// ids yield None
    fn get_patients(&self, reference_ids: &[Uuid]) -> Result<Vec<Option<Patient>>>;

    /// Delete a patient and its blocking values
    fn delete_patient(&self, reference_id: Uuid) -> Result<()>;

    /// Create a new empty person cluster
    fn create_person(&self) -> Result<Person>;

    /// Fetch a person by reference id
    fn get_person(&self, reference_id: Uuid) -> Result<Option<Person>>;

    /// Attach the given patients to a person, creating one when none is
    /// supplied. Persons emptied by the move remain until explicitly
    /// deleted.
    fn update_person_cluster(
        &self,
        patient_reference_ids: &[Uuid],
        person: Option<&Person>,
    ) -> Result<Person>;

    /// Reattach every patient under any of the old persons to `person`;
    /// returns the number of patients moved
    fn update_patient_person_ids(
        &self,
        person: &Person,
        old_person_reference_ids: &[Uuid],
    ) -> Result<usize>;

    /// Delete persons; fails with a conflict if any still has patients
    fn delete_persons(&self, persons: &[Person]) -> Result<()>;

    /// Paginate orphaned patients by reference id
    fn get_orphaned_patients(&self, limit: i64, cursor: Option<Uuid>) -> Result<Vec<Patient>>;

    /// Candidate retrieval for one pass: every patient in a person
    /// cluster where at least one member agrees on all non-missing
    /// blocking keys, excluding patients that actively disagree.
    /// Returns empty when too many keys are missing from the record.
    fn get_block_data(
        &self,
        record: &PIIRecord,
        pass: &AlgorithmPass,
        max_missing_allowed_proportion: f64,
    ) -> Result<Vec<Patient>>;

    /// Sample labeled pairs for tuning: same-person pairs as true
    /// matches, cross-person pairs as non-matches
    fn sample_tuning_pairs(
        &self,
        true_match_pairs: usize,
        non_match_pairs: usize,
    ) -> Result<TuningPairSample>;

    /// Delete all blocking values, patients and persons
    fn reset_mpi(&self) -> Result<()>;

    /// Probe the backing store; an error here surfaces as unhealthy
    fn check_connection(&self) -> Result<()>;
}

/// Algorithm configuration persistence
pub trait AlgorithmStore: Send + Sync {
    fn list_algorithms(&self) -> Result<Vec<Algorithm>>;

    fn get_algorithm(&self, label: &str) -> Result<Option<Algorithm>>;

    fn default_algorithm(&self) -> Result<Option<Algorithm>>;

    /// Insert a validated algorithm; duplicate labels conflict and a
    /// second default is rejected
    fn create_algorithm(&self, algorithm: &Algorithm) -> Result<()>;

    /// Replace an algorithm (passes included) atomically
    fn update_algorithm(&self, label: &str, algorithm: &Algorithm) -> Result<()>;

    fn delete_algorithm(&self, label: &str) -> Result<()>;
}

/// Tuning job persistence
pub trait TuningStore: Send + Sync {
    /// Create a new PENDING job; fails with a conflict while another
    /// job is PENDING or RUNNING
    fn start_job(&self, params: TuningParams) -> Result<TuningJob>;

    fn get_job(&self, id: Uuid) -> Result<Option<TuningJob>>;

    /// Update a job's status (and results); terminal states stamp
    /// `finished_at`
    fn update_job(
        &self,
        id: Uuid,
        status: TuningStatus,
        results: Option<TuningResults>,
    ) -> Result<TuningJob>;

    /// Fail any PENDING/RUNNING job older than `max_age_secs`; returns
    /// the number of jobs failed
    fn fail_stale_jobs(&self, max_age_secs: i64) -> Result<usize>;
}
