//! REST API request handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::repositories::{AlgorithmStore, MpiStore};
use crate::fhir;
use crate::matching::{self, LinkOutcome, LinkResult, MatchOutcome, Prediction};
use crate::models::{
    Algorithm, PIIRecord, TuningJob, TuningParams,
};
use crate::Error;

use super::state::AppState;

/// The maximum number of clusters a single seed request may carry
const MAX_SEED_CLUSTERS: usize = 100;

async fn run_blocking<T, F>(task: F) -> crate::Result<T>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {e}")))?
}

/// Resolve the algorithm a request names, or the configured default
async fn resolve_algorithm(state: &AppState, label: Option<String>) -> crate::Result<Algorithm> {
    let algorithms = Arc::clone(&state.algorithms);
    run_blocking(move || match label {
        Some(label) => algorithms.get_algorithm(&label)?.ok_or_else(|| {
            Error::Validation(format!("no algorithm found with label '{label}'"))
        }),
        None => algorithms
            .default_algorithm()?
            .ok_or_else(|| Error::Validation("no default algorithm configured".to_string())),
    })
    .await
}

// ============================================================================
// Health
// ============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unavailable", body = crate::api::ApiError)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let mpi = Arc::clone(&state.mpi);
    run_blocking(move || mpi.check_connection()).await?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.observability.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

// ============================================================================
// Linkage
// ============================================================================

/// Request payload for link and match calls
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LinkInput {
    /// The record to check against the MPI
    pub record: PIIRecord,

    /// Label of the algorithm to run; the default algorithm when omitted
    #[serde(default)]
    pub algorithm: Option<String>,

    /// Client-supplied identifier of the person this record belongs to
    #[serde(default)]
    pub external_person_id: Option<String>,
}

/// Link an incoming record against the MPI and persist it
#[utoipa::path(
    post,
    path = "/api/v1/link",
    tag = "linkage",
    request_body = LinkInput,
    responses(
        (status = 200, description = "Linkage decision", body = LinkOutcome),
        (status = 422, description = "Invalid record or unknown algorithm", body = crate::api::ApiError)
    )
)]
pub async fn link(
    State(state): State<AppState>,
    Json(input): Json<LinkInput>,
) -> Result<impl IntoResponse, Error> {
    let algorithm = resolve_algorithm(&state, input.algorithm.clone()).await?;
    let mpi = Arc::clone(&state.mpi);
    let outcome = run_blocking(move || {
        matching::link_record(
            mpi.as_ref(),
            &input.record,
            &algorithm,
            input.external_person_id.as_deref(),
        )
    })
    .await?;
    Ok(Json(outcome))
}

/// Evaluate an incoming record against the MPI without persisting it
#[utoipa::path(
    post,
    path = "/api/v1/match",
    tag = "linkage",
    request_body = LinkInput,
    responses(
        (status = 200, description = "Match decision", body = MatchOutcome),
        (status = 422, description = "Invalid record or unknown algorithm", body = crate::api::ApiError)
    )
)]
pub async fn match_patient(
    State(state): State<AppState>,
    Json(input): Json<LinkInput>,
) -> Result<impl IntoResponse, Error> {
    let algorithm = resolve_algorithm(&state, input.algorithm.clone()).await?;
    let mpi = Arc::clone(&state.mpi);
    let outcome =
        run_blocking(move || matching::match_record(mpi.as_ref(), &input.record, &algorithm))
            .await?;
    Ok(Json(outcome))
}

/// Request payload for FHIR bundle linkage
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LinkFhirInput {
    /// A FHIR bundle containing a Patient resource
    #[schema(value_type = Object)]
    pub bundle: serde_json::Value,

    #[serde(default)]
    pub algorithm: Option<String>,

    #[serde(default)]
    pub external_person_id: Option<String>,
}

/// Response for FHIR bundle linkage
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkFhirResponse {
    pub prediction: Prediction,
    pub person_reference_id: Option<Uuid>,
    pub patient_reference_id: Uuid,
    pub results: Vec<LinkResult>,

    /// The bundle with a Person resource appended; null for
    /// possible_match
    #[schema(value_type = Object)]
    pub updated_bundle: Option<serde_json::Value>,
}

/// Link the Patient resource of a FHIR bundle against the MPI
#[utoipa::path(
    post,
    path = "/api/v1/link/fhir",
    tag = "linkage",
    request_body = LinkFhirInput,
    responses(
        (status = 200, description = "Linkage decision with annotated bundle", body = LinkFhirResponse),
        (status = 422, description = "Bundle has no Patient resource", body = crate::api::ApiError)
    )
)]
pub async fn link_fhir(
    State(state): State<AppState>,
    Json(input): Json<LinkFhirInput>,
) -> Result<impl IntoResponse, Error> {
    let record = fhir::bundle_to_pii_record(&input.bundle)?;
    let algorithm = resolve_algorithm(&state, input.algorithm.clone()).await?;
    let mpi = Arc::clone(&state.mpi);
    let external_person_id = input.external_person_id.clone();
    let outcome: LinkOutcome = run_blocking(move || {
        matching::link_record(
            mpi.as_ref(),
            &record,
            &algorithm,
            external_person_id.as_deref(),
        )
    })
    .await?;

    let updated_bundle = outcome
        .person_reference_id
        .map(|person_id| fhir::add_person_resource(person_id, outcome.patient_reference_id, input.bundle));
    Ok(Json(LinkFhirResponse {
        prediction: outcome.prediction,
        person_reference_id: outcome.person_reference_id,
        patient_reference_id: outcome.patient_reference_id,
        results: outcome.results,
        updated_bundle,
    }))
}

// ============================================================================
// Seeding
// ============================================================================

/// One person cluster to seed
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Cluster {
    pub records: Vec<PIIRecord>,

    #[serde(default)]
    pub external_person_id: Option<String>,
}

/// A batch of person clusters to seed
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClusterGroup {
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SeededPatient {
    pub patient_reference_id: Uuid,
    pub external_patient_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SeededPerson {
    pub person_reference_id: Uuid,
    pub external_person_id: Option<String>,
    pub patients: Vec<SeededPatient>,
}

/// Seed response: one person per cluster, in input order
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PersonGroup {
    pub persons: Vec<SeededPerson>,
}

/// Seed the MPI with pre-clustered records
#[utoipa::path(
    post,
    path = "/api/v1/seed",
    tag = "seed",
    request_body = ClusterGroup,
    responses(
        (status = 201, description = "Clusters created", body = PersonGroup),
        (status = 422, description = "Empty or oversized batch", body = crate::api::ApiError)
    )
)]
pub async fn seed(
    State(state): State<AppState>,
    Json(group): Json<ClusterGroup>,
) -> Result<impl IntoResponse, Error> {
    if group.clusters.is_empty() {
        return Err(Error::Validation("clusters must not be empty".to_string()));
    }
    if group.clusters.len() > MAX_SEED_CLUSTERS {
        return Err(Error::Validation(format!(
            "clusters are limited to {MAX_SEED_CLUSTERS} per request"
        )));
    }
    for (idx, cluster) in group.clusters.iter().enumerate() {
        if cluster.records.is_empty() {
            return Err(Error::Validation(format!(
                "cluster {idx} contains no records"
            )));
        }
    }

    let mpi = Arc::clone(&state.mpi);
    let persons = run_blocking(move || {
        let mut persons = Vec::with_capacity(group.clusters.len());
        for cluster in &group.clusters {
            let patients = mpi.bulk_insert_patients(
                &cluster.records,
                crate::db::PersonAttachment::NewPerson,
                cluster.external_person_id.as_deref(),
            )?;
            let person_reference_id = patients
                .first()
                .and_then(|p| p.person.as_ref())
                .map(|p| p.reference_id)
                .ok_or_else(|| Error::Internal("seeded cluster has no person".to_string()))?;
            persons.push(SeededPerson {
                person_reference_id,
                external_person_id: cluster.external_person_id.clone(),
                patients: patients
                    .into_iter()
                    .map(|p| SeededPatient {
                        patient_reference_id: p.reference_id,
                        external_patient_id: p.external_patient_id,
                    })
                    .collect(),
            });
        }
        Ok(persons)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(PersonGroup { persons })))
}

/// Delete all persons, patients and blocking values
#[utoipa::path(
    delete,
    path = "/api/v1/seed",
    tag = "seed",
    responses((status = 204, description = "MPI reset"))
)]
pub async fn reset_mpi(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let mpi = Arc::clone(&state.mpi);
    run_blocking(move || mpi.reset_mpi()).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Algorithms
// ============================================================================

/// List all algorithm configurations
#[utoipa::path(
    get,
    path = "/api/v1/algorithm",
    tag = "algorithms",
    responses((status = 200, description = "All algorithms", body = [Algorithm]))
)]
pub async fn list_algorithms(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let algorithms = Arc::clone(&state.algorithms);
    let list = run_blocking(move || algorithms.list_algorithms()).await?;
    Ok(Json(list))
}

/// Fetch one algorithm by label
#[utoipa::path(
    get,
    path = "/api/v1/algorithm/{label}",
    tag = "algorithms",
    params(("label" = String, Path, description = "Algorithm label")),
    responses(
        (status = 200, description = "The algorithm", body = Algorithm),
        (status = 404, description = "Unknown label", body = crate::api::ApiError)
    )
)]
pub async fn get_algorithm(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let algorithms = Arc::clone(&state.algorithms);
    let algorithm = run_blocking(move || {
        algorithms
            .get_algorithm(&label)?
            .ok_or_else(|| Error::NotFound(format!("no algorithm with label '{label}'")))
    })
    .await?;
    Ok(Json(algorithm))
}

/// Create an algorithm
#[utoipa::path(
    post,
    path = "/api/v1/algorithm",
    tag = "algorithms",
    request_body = Algorithm,
    responses(
        (status = 201, description = "Algorithm created"),
        (status = 409, description = "Label already exists", body = crate::api::ApiError),
        (status = 422, description = "Invalid configuration", body = crate::api::ApiError)
    )
)]
pub async fn create_algorithm(
    State(state): State<AppState>,
    Json(algorithm): Json<Algorithm>,
) -> Result<impl IntoResponse, Error> {
    let algorithms = Arc::clone(&state.algorithms);
    run_blocking(move || algorithms.create_algorithm(&algorithm)).await?;
    Ok(StatusCode::CREATED)
}

/// Replace an algorithm; the pass list is swapped atomically
#[utoipa::path(
    put,
    path = "/api/v1/algorithm/{label}",
    tag = "algorithms",
    params(("label" = String, Path, description = "Algorithm label")),
    request_body = Algorithm,
    responses(
        (status = 200, description = "Algorithm updated"),
        (status = 404, description = "Unknown label", body = crate::api::ApiError),
        (status = 422, description = "Invalid configuration", body = crate::api::ApiError)
    )
)]
pub async fn update_algorithm(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Json(algorithm): Json<Algorithm>,
) -> Result<impl IntoResponse, Error> {
    let algorithms = Arc::clone(&state.algorithms);
    run_blocking(move || algorithms.update_algorithm(&label, &algorithm)).await?;
    Ok(StatusCode::OK)
}

/// Delete an algorithm and its passes
#[utoipa::path(
    delete,
    path = "/api/v1/algorithm/{label}",
    tag = "algorithms",
    params(("label" = String, Path, description = "Algorithm label")),
    responses(
        (status = 204, description = "Algorithm deleted"),
        (status = 404, description = "Unknown label", body = crate::api::ApiError)
    )
)]
pub async fn delete_algorithm(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let algorithms = Arc::clone(&state.algorithms);
    run_blocking(move || algorithms.delete_algorithm(&label)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Patients
// ============================================================================

/// Request to create a patient directly
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePatientRequest {
    pub record: PIIRecord,

    /// Person to attach to; the patient is orphaned when omitted
    #[serde(default)]
    pub person_reference_id: Option<Uuid>,

    #[serde(default)]
    pub external_patient_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientRef {
    pub patient_reference_id: Uuid,
    pub person_reference_id: Option<Uuid>,
}

/// Create a patient without running linkage
#[utoipa::path(
    post,
    path = "/api/v1/patient",
    tag = "patients",
    request_body = CreatePatientRequest,
    responses(
        (status = 201, description = "Patient created", body = PatientRef),
        (status = 404, description = "Unknown person", body = crate::api::ApiError)
    )
)]
pub async fn create_patient(
    State(state): State<AppState>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<impl IntoResponse, Error> {
    let mpi = Arc::clone(&state.mpi);
    let patient = run_blocking(move || {
        let person = match request.person_reference_id {
            Some(rid) => Some(mpi.get_person(rid)?.ok_or_else(|| {
                Error::NotFound(format!("no person with reference id {rid}"))
            })?),
            None => None,
        };
        let attachment = match &person {
            Some(person) => crate::db::PersonAttachment::Existing(person),
            None => crate::db::PersonAttachment::Orphaned,
        };
        mpi.insert_patient(
            &request.record,
            attachment,
            request.external_patient_id.as_deref(),
            None,
        )
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(PatientRef {
            patient_reference_id: patient.reference_id,
            person_reference_id: patient.person.map(|p| p.reference_id),
        }),
    ))
}

/// Request to update a patient
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdatePatientRequest {
    /// New PII payload; forces a blocking value rewrite
    #[serde(default)]
    pub record: Option<PIIRecord>,

    #[serde(default)]
    pub person_reference_id: Option<Uuid>,

    #[serde(default)]
    pub external_patient_id: Option<String>,
}

/// Update a patient's record, person or external id
#[utoipa::path(
    patch,
    path = "/api/v1/patient/{reference_id}",
    tag = "patients",
    params(("reference_id" = Uuid, Path, description = "Patient reference id")),
    request_body = UpdatePatientRequest,
    responses(
        (status = 200, description = "Patient updated", body = PatientRef),
        (status = 404, description = "Unknown patient or person", body = crate::api::ApiError)
    )
)]
pub async fn update_patient(
    State(state): State<AppState>,
    Path(reference_id): Path<Uuid>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<impl IntoResponse, Error> {
    let mpi = Arc::clone(&state.mpi);
    let patient = run_blocking(move || {
        let person = match request.person_reference_id {
            Some(rid) => Some(mpi.get_person(rid)?.ok_or_else(|| {
                Error::NotFound(format!("no person with reference id {rid}"))
            })?),
            None => None,
        };
        mpi.update_patient(
            reference_id,
            request.record.as_ref(),
            person.as_ref(),
            request.external_patient_id.as_deref(),
        )
    })
    .await?;
    Ok(Json(PatientRef {
        patient_reference_id: patient.reference_id,
        person_reference_id: patient.person.map(|p| p.reference_id),
    }))
}

/// Delete a patient and its blocking values
#[utoipa::path(
    delete,
    path = "/api/v1/patient/{reference_id}",
    tag = "patients",
    params(("reference_id" = Uuid, Path, description = "Patient reference id")),
    responses(
        (status = 204, description = "Patient deleted"),
        (status = 404, description = "Unknown patient", body = crate::api::ApiError)
    )
)]
pub async fn delete_patient(
    State(state): State<AppState>,
    Path(reference_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let mpi = Arc::clone(&state.mpi);
    run_blocking(move || mpi.delete_patient(reference_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Orphaned patient pagination parameters
#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct OrphanedQuery {
    /// Maximum number of results (default: 50, max: 500)
    #[serde(default = "default_orphan_limit")]
    pub limit: i64,

    /// Return patients with a reference id greater than this cursor
    #[serde(default)]
    pub cursor: Option<Uuid>,
}

fn default_orphan_limit() -> i64 {
    50
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrphanedPage {
    pub patients: Vec<Uuid>,
    pub next_cursor: Option<Uuid>,
}

/// Page through patients that have no person cluster
#[utoipa::path(
    get,
    path = "/api/v1/patient/orphaned",
    tag = "patients",
    params(OrphanedQuery),
    responses((status = 200, description = "Orphaned patients", body = OrphanedPage))
)]
pub async fn get_orphaned_patients(
    State(state): State<AppState>,
    Query(query): Query<OrphanedQuery>,
) -> Result<impl IntoResponse, Error> {
    let limit = query.limit.clamp(1, 500);
    let mpi = Arc::clone(&state.mpi);
    let patients = run_blocking(move || mpi.get_orphaned_patients(limit, query.cursor)).await?;
    let next_cursor = if patients.len() as i64 == limit {
        patients.last().map(|p| p.reference_id)
    } else {
        None
    };
    Ok(Json(OrphanedPage {
        patients: patients.into_iter().map(|p| p.reference_id).collect(),
        next_cursor,
    }))
}

// ============================================================================
// Persons
// ============================================================================

/// Request naming the patients of a person cluster
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PersonPatientsRequest {
    pub patients: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PersonRef {
    pub person_reference_id: Uuid,
}

/// Create a new person cluster from existing patients
#[utoipa::path(
    post,
    path = "/api/v1/person",
    tag = "persons",
    request_body = PersonPatientsRequest,
    responses(
        (status = 201, description = "Person created", body = PersonRef),
        (status = 404, description = "Unknown patient", body = crate::api::ApiError)
    )
)]
pub async fn create_person(
    State(state): State<AppState>,
    Json(request): Json<PersonPatientsRequest>,
) -> Result<impl IntoResponse, Error> {
    let mpi = Arc::clone(&state.mpi);
    let person = run_blocking(move || mpi.update_person_cluster(&request.patients, None)).await?;
    Ok((
        StatusCode::CREATED,
        Json(PersonRef {
            person_reference_id: person.reference_id,
        }),
    ))
}

/// Attach patients to an existing person cluster
#[utoipa::path(
    patch,
    path = "/api/v1/person/{reference_id}",
    tag = "persons",
    params(("reference_id" = Uuid, Path, description = "Person reference id")),
    request_body = PersonPatientsRequest,
    responses(
        (status = 200, description = "Patients attached", body = PersonRef),
        (status = 404, description = "Unknown person or patient", body = crate::api::ApiError)
    )
)]
pub async fn update_person(
    State(state): State<AppState>,
    Path(reference_id): Path<Uuid>,
    Json(request): Json<PersonPatientsRequest>,
) -> Result<impl IntoResponse, Error> {
    let mpi = Arc::clone(&state.mpi);
    let person = run_blocking(move || {
        let person = mpi.get_person(reference_id)?.ok_or_else(|| {
            Error::NotFound(format!("no person with reference id {reference_id}"))
        })?;
        mpi.update_person_cluster(&request.patients, Some(&person))
    })
    .await?;
    Ok(Json(PersonRef {
        person_reference_id: person.reference_id,
    }))
}

/// Request naming person clusters to merge
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MergePersonsRequest {
    pub person_reference_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MergeResponse {
    pub person_reference_id: Uuid,
    pub patients_moved: usize,
}

/// Move every patient of the named persons into this cluster
#[utoipa::path(
    post,
    path = "/api/v1/person/{reference_id}/merge",
    tag = "persons",
    params(("reference_id" = Uuid, Path, description = "Surviving person reference id")),
    request_body = MergePersonsRequest,
    responses(
        (status = 200, description = "Clusters merged", body = MergeResponse),
        (status = 404, description = "Unknown person", body = crate::api::ApiError)
    )
)]
pub async fn merge_persons(
    State(state): State<AppState>,
    Path(reference_id): Path<Uuid>,
    Json(request): Json<MergePersonsRequest>,
) -> Result<impl IntoResponse, Error> {
    let mpi = Arc::clone(&state.mpi);
    let (person, moved) = run_blocking(move || {
        let person = mpi.get_person(reference_id)?.ok_or_else(|| {
            Error::NotFound(format!("no person with reference id {reference_id}"))
        })?;
        let moved = mpi.update_patient_person_ids(&person, &request.person_reference_ids)?;
        Ok((person, moved))
    })
    .await?;
    Ok(Json(MergeResponse {
        person_reference_id: person.reference_id,
        patients_moved: moved,
    }))
}

/// Delete a person; fails while patients are still attached
#[utoipa::path(
    delete,
    path = "/api/v1/person/{reference_id}",
    tag = "persons",
    params(("reference_id" = Uuid, Path, description = "Person reference id")),
    responses(
        (status = 204, description = "Person deleted"),
        (status = 404, description = "Unknown person", body = crate::api::ApiError),
        (status = 409, description = "Person still has patients", body = crate::api::ApiError)
    )
)]
pub async fn delete_person(
    State(state): State<AppState>,
    Path(reference_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let mpi = Arc::clone(&state.mpi);
    run_blocking(move || {
        let person = mpi.get_person(reference_id)?.ok_or_else(|| {
            Error::NotFound(format!("no person with reference id {reference_id}"))
        })?;
        mpi.delete_persons(&[person])
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Tuning
// ============================================================================

/// A tuning job with its polling URL
#[derive(Debug, Serialize, ToSchema)]
pub struct TuningJobResponse {
    #[serde(flatten)]
    pub job: TuningJob,
    pub status_url: String,
}

fn tuning_job_response(job: TuningJob) -> TuningJobResponse {
    let status_url = format!("/api/v1/tuning/{}", job.id);
    TuningJobResponse { job, status_url }
}

/// Start a tuning job
#[utoipa::path(
    post,
    path = "/api/v1/tuning",
    tag = "tuning",
    request_body = TuningParams,
    responses(
        (status = 202, description = "Job accepted", body = TuningJobResponse),
        (status = 409, description = "Another job is active", body = crate::api::ApiError)
    )
)]
pub async fn create_tuning_job(
    State(state): State<AppState>,
    Json(params): Json<TuningParams>,
) -> Result<impl IntoResponse, Error> {
    let job = state.tuning.start(params).await?;
    Ok((StatusCode::ACCEPTED, Json(tuning_job_response(job))))
}

/// Poll a tuning job
#[utoipa::path(
    get,
    path = "/api/v1/tuning/{id}",
    tag = "tuning",
    params(("id" = Uuid, Path, description = "Tuning job id")),
    responses(
        (status = 200, description = "The job", body = TuningJobResponse),
        (status = 404, description = "Unknown job", body = crate::api::ApiError)
    )
)]
pub async fn get_tuning_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let job = state
        .tuning
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no tuning job with id {id}")))?;
    Ok(Json(tuning_job_response(job)))
}
