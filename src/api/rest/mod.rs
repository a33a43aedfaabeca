//! RESTful API implementation with Axum

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod state;

pub use state::AppState;

use crate::Result;

/// API documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Record Linkage API",
        version = "0.1.0",
        description = "Probabilistic record linkage service for a Master Patient Index",
        contact(
            name = "MPI Development Team",
            email = "support@example.com"
        )
    ),
    paths(
        handlers::health_check,
        handlers::link,
        handlers::match_patient,
        handlers::link_fhir,
        handlers::seed,
        handlers::reset_mpi,
        handlers::list_algorithms,
        handlers::get_algorithm,
        handlers::create_algorithm,
        handlers::update_algorithm,
        handlers::delete_algorithm,
        handlers::create_patient,
        handlers::update_patient,
        handlers::delete_patient,
        handlers::get_orphaned_patients,
        handlers::create_person,
        handlers::update_person,
        handlers::merge_persons,
        handlers::delete_person,
        handlers::create_tuning_job,
        handlers::get_tuning_job,
    ),
    components(
        schemas(
            crate::models::PIIRecord,
            crate::models::Name,
            crate::models::Address,
            crate::models::Telecom,
            crate::models::Identifier,
            crate::models::BlockingKey,
            crate::models::Algorithm,
            crate::models::AlgorithmContext,
            crate::models::AlgorithmPass,
            crate::models::AdvancedThresholds,
            crate::models::Evaluator,
            crate::models::EvaluatorFunc,
            crate::models::SimilarityMeasure,
            crate::models::PassKwargs,
            crate::models::LogOdd,
            crate::models::SkipValue,
            crate::models::TuningJob,
            crate::models::TuningParams,
            crate::models::TuningResults,
            crate::models::TuningStatus,
            crate::models::PassRecommendation,
            crate::matching::Prediction,
            crate::matching::MatchGrade,
            crate::matching::LinkResult,
            crate::matching::LinkOutcome,
            crate::matching::MatchOutcome,
            crate::api::ApiError,
            handlers::HealthResponse,
            handlers::LinkInput,
            handlers::LinkFhirInput,
            handlers::LinkFhirResponse,
            handlers::Cluster,
            handlers::ClusterGroup,
            handlers::SeededPatient,
            handlers::SeededPerson,
            handlers::PersonGroup,
            handlers::CreatePatientRequest,
            handlers::UpdatePatientRequest,
            handlers::PatientRef,
            handlers::OrphanedPage,
            handlers::PersonPatientsRequest,
            handlers::PersonRef,
            handlers::MergePersonsRequest,
            handlers::MergeResponse,
            handlers::TuningJobResponse,
        )
    ),
    tags(
        (name = "health", description = "Service health endpoints"),
        (name = "linkage", description = "Record linkage endpoints"),
        (name = "seed", description = "Bulk seeding endpoints"),
        (name = "algorithms", description = "Algorithm configuration endpoints"),
        (name = "patients", description = "Patient management endpoints"),
        (name = "persons", description = "Person cluster management endpoints"),
        (name = "tuning", description = "Log-odds tuning endpoints")
    )
)]
pub struct ApiDoc;

/// Create the REST API router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/link", post(handlers::link))
        .route("/link/fhir", post(handlers::link_fhir))
        .route("/match", post(handlers::match_patient))
        .route("/seed", post(handlers::seed).delete(handlers::reset_mpi))
        .route(
            "/algorithm",
            get(handlers::list_algorithms).post(handlers::create_algorithm),
        )
        .route(
            "/algorithm/:label",
            get(handlers::get_algorithm)
                .put(handlers::update_algorithm)
                .delete(handlers::delete_algorithm),
        )
        .route("/patient", post(handlers::create_patient))
        .route("/patient/orphaned", get(handlers::get_orphaned_patients))
        .route(
            "/patient/:reference_id",
            patch(handlers::update_patient).delete(handlers::delete_patient),
        )
        .route("/person", post(handlers::create_person))
        .route(
            "/person/:reference_id",
            patch(handlers::update_person).delete(handlers::delete_person),
        )
        .route("/person/:reference_id/merge", post(handlers::merge_persons))
        .route("/tuning", post(handlers::create_tuning_job))
        .route("/tuning/:id", get(handlers::get_tuning_job));

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the REST API server
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| crate::Error::Config(format!("failed to bind {addr}: {e}")))?;

    tracing::info!("REST API server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::Error::Internal(e.to_string()))?;

    Ok(())
}
