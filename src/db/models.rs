//! Database models (Diesel ORM entities)
//!
//! These models are used for database operations and are separate from
//! the domain models in src/models to maintain separation of concerns.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PIIRecord, Patient, Person, TuningJob, TuningParams, TuningResults};

use super::schema::*;

// ============================================================================
// Person Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = mpi_person)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbPerson {
    pub id: i64,
    pub reference_id: Uuid,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = mpi_person)]
pub struct NewDbPerson {
    pub reference_id: Uuid,
}

impl From<DbPerson> for Person {
    fn from(row: DbPerson) -> Self {
        Person {
            id: row.id,
            reference_id: row.reference_id,
        }
    }
}

// ============================================================================
// Patient Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = mpi_patient)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbPatient {
    pub id: i64,
    pub person_id: Option<i64>,
    pub reference_id: Uuid,
    pub data: serde_json::Value,
    pub external_patient_id: Option<String>,
    pub external_person_id: Option<String>,
    pub external_person_source: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = mpi_patient)]
pub struct NewDbPatient {
    pub person_id: Option<i64>,
    pub reference_id: Uuid,
    pub data: serde_json::Value,
    pub external_patient_id: Option<String>,
    pub external_person_id: Option<String>,
    pub external_person_source: Option<String>,
}

impl DbPatient {
    /// Convert into the domain model, pairing the row with its person
    pub fn into_domain(self, person: Option<Person>) -> crate::Result<Patient> {
        let record = PIIRecord::from_value(self.data)
            .map_err(|e| crate::Error::Internal(format!("stored PII payload is invalid: {e}")))?;
        Ok(Patient {
            id: self.id,
            reference_id: self.reference_id,
            person,
            record,
            external_patient_id: self.external_patient_id,
            external_person_id: self.external_person_id,
            external_person_source: self.external_person_source,
        })
    }
}

// ============================================================================
// Blocking Value Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = mpi_blocking_value)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbBlockingValue {
    pub id: i64,
    pub patient_id: i64,
    pub blockingkey: i16,
    pub value: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = mpi_blocking_value)]
pub struct NewDbBlockingValue {
    pub patient_id: i64,
    pub blockingkey: i16,
    pub value: String,
}

// ============================================================================
// Algorithm Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = algorithm)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbAlgorithm {
    pub id: i64,
    pub label: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = algorithm)]
pub struct NewDbAlgorithm {
    pub label: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub data: serde_json::Value,
}

impl DbAlgorithm {
    pub fn into_domain(self) -> crate::Result<crate::models::Algorithm> {
        serde_json::from_value(self.data)
            .map_err(|e| crate::Error::Internal(format!("stored algorithm is invalid: {e}")))
    }
}

// ============================================================================
// Tuning Job Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = tuning_job)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbTuningJob {
    pub id: Uuid,
    pub status: String,
    pub params: serde_json::Value,
    pub results: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tuning_job)]
pub struct NewDbTuningJob {
    pub id: Uuid,
    pub status: String,
    pub params: serde_json::Value,
    pub started_at: DateTime<Utc>,
}

impl DbTuningJob {
    pub fn into_domain(self) -> crate::Result<TuningJob> {
        let params: TuningParams = serde_json::from_value(self.params)
            .map_err(|e| crate::Error::Internal(format!("stored tuning params invalid: {e}")))?;
        let results: Option<TuningResults> = match self.results {
            Some(value) => Some(
                serde_json::from_value(value).map_err(|e| {
                    crate::Error::Internal(format!("stored tuning results invalid: {e}"))
                })?,
            ),
            None => None,
        };
        Ok(TuningJob {
            id: self.id,
            status: self.status.parse()?,
            params,
            results,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}
