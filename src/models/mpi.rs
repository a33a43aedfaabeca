//! MPI domain entities
//!
//! A [`Person`] is a cluster identity; the [`Patient`]s attached to it are
//! observations of the same individual. Patient→Person is the sole owning
//! edge: a Person never holds its patient list in memory, that lookup
//! belongs to the store.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::pii::PIIRecord;

/// A person cluster identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Person {
    /// Internal numeric id, private to the store
    #[serde(skip_serializing, default)]
    pub id: i64,

    /// Opaque external reference id
    pub reference_id: Uuid,
}

/// A canonicalized observation of an individual
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Patient {
    /// Internal numeric id, private to the store
    #[serde(skip_serializing, default)]
    pub id: i64,

    /// Opaque external reference id
    pub reference_id: Uuid,

    /// The person cluster this patient belongs to; a patient without a
    /// person is orphaned and never returned as a linkage candidate
    pub person: Option<Person>,

    /// The canonical PII payload
    pub record: PIIRecord,

    /// Identifier assigned by the submitting system
    pub external_patient_id: Option<String>,

    /// Person identifier assigned by the submitting system
    pub external_person_id: Option<String>,

    /// Source system of the external person id
    pub external_person_source: Option<String>,
}

impl Patient {
    /// Whether this patient is detached from any person cluster
    pub fn is_orphaned(&self) -> bool {
        self.person.is_none()
    }
}
