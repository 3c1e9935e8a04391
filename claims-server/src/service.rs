use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use claims_engine::{
    ApprovalFilter, AttachOutcome, ClaimsEngine, EngineError, PrescriptionAttachment,
    PrescriptionClaim, RecordId, RejectionReason, ServiceClaim, ServiceRequestOutcome,
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::models::{
    AttachPrescriptionRequest, AuthorizationQuery, AuthorizationRequest, AuthorizationView,
    PrescriptionApprovalRequest, PrescriptionApprovalView, PrescriptionLinked, PrescriptionQuery,
    Rejection, ServiceApprovalCompleted, ServiceApprovalGranted, ServiceApprovalQuery,
    ServiceApprovalRequest, ServiceApprovalView, ThresholdUpdateRequest, ThresholdView,
};
use crate::telemetry::correlation_id_middleware;

type ApiResult<T> = Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn error_body(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(json!({
            "success": false,
            "message": message
        })),
    )
}

fn bad_request_error(message: &str) -> ApiError {
    error_body(StatusCode::BAD_REQUEST, message)
}

fn not_found_error(message: &str) -> ApiError {
    error_body(StatusCode::NOT_FOUND, message)
}

fn engine_error(err: EngineError) -> ApiError {
    match &err {
        EngineError::NotFound { .. } => not_found_error(&err.to_string()),
        EngineError::Validation(_)
        | EngineError::InvalidState(_)
        | EngineError::AlreadyLinked(_) => {
            bad_request_error(&err.to_string())
        }
        EngineError::CodeGenerationExhausted(_) | EngineError::Storage(_) => {
            error!(error = %err, "Request failed on store or code generation");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

/// Claim submissions report unknown references as a bad request.
fn claim_error(err: EngineError) -> ApiError {
    match err {
        EngineError::NotFound { .. } => bad_request_error(&err.to_string()),
        other => engine_error(other),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: ClaimsEngine,
}

pub fn create_app(engine: ClaimsEngine) -> Router {
    build_router(AppState { engine })
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/service-approvals", get(list_service_approvals))
        .route("/api/service-approvals/request", post(request_service_approval))
        .route("/api/service-approvals/prescription", post(attach_prescription))
        .route("/api/service-approvals/check/{code}", get(check_service_approval))
        .route("/api/service-approvals/complete/{code}", put(complete_service_approval))
        .route("/api/prescriptions/approve", post(approve_prescription))
        .route("/api/prescriptions/approvals", get(list_prescription_approvals))
        .route("/api/prescriptions/approvals/{id}", get(get_prescription_approval))
        .route("/api/configurable-amount/current", get(current_threshold))
        .route("/api/configurable-amount/update", put(update_threshold))
        .route("/api/hospital-services", get(list_authorizations))
        .route("/api/hospital-services/approve", post(grant_authorization))
        .route("/api/hospital-services/revoke", post(revoke_authorization))
        .route(
            "/api/hospital-services/{id}",
            get(get_authorization).delete(delete_authorization),
        )
        .route("/api/hospital-services/{id}/revoke", post(revoke_authorization_by_id))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Claims Authorization Service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /api/service-approvals/request": "Request a service approval",
            "POST /api/service-approvals/prescription": "Attach a prescription to an approval",
            "GET /api/service-approvals/check/{code}": "Check an approval",
            "PUT /api/service-approvals/complete/{code}": "Complete an approval",
            "POST /api/prescriptions/approve": "Prescription-only approval",
            "GET /api/configurable-amount/current": "Current minimum prescription amount",
            "PUT /api/configurable-amount/update": "Update minimum prescription amount",
            "POST /api/hospital-services/approve": "Authorize a hospital for a service",
            "POST /api/hospital-services/revoke": "Revoke a hospital-service authorization",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// Service approvals

async fn request_service_approval(
    State(state): State<AppState>,
    Json(request): Json<ServiceApprovalRequest>,
) -> Result<Response, ApiError> {
    info!(
        user_id = request.user_id,
        hospital_id = request.hospital_id,
        service_id = %request.service_id,
        "Service approval requested"
    );

    let claim = ServiceClaim {
        user_id: request.user_id,
        hospital_id: request.hospital_id,
        service_id: request.service_id,
        service_name: request.service_name,
        service_description: request.service_description,
        service_cost: request.service_cost,
    };

    match state
        .engine
        .service_approvals
        .request_approval(claim)
        .await
        .map_err(claim_error)?
    {
        ServiceRequestOutcome::Approved(approval) => {
            Ok(Json(ServiceApprovalGranted::from(&approval)).into_response())
        }
        ServiceRequestOutcome::Ineligible(reason) => {
            Ok((StatusCode::BAD_REQUEST, Json(Rejection::new(&reason))).into_response())
        }
    }
}

async fn attach_prescription(
    State(state): State<AppState>,
    Json(request): Json<AttachPrescriptionRequest>,
) -> Result<Response, ApiError> {
    if request.approval_code.trim().is_empty() || request.prescription_id.trim().is_empty() {
        return Err(bad_request_error("approvalCode and prescriptionId are required"));
    }

    let attachment = PrescriptionAttachment {
        approval_code: request.approval_code,
        prescription_id: request.prescription_id,
        prescription_total: request.prescription_total,
    };

    match state
        .engine
        .service_approvals
        .attach_prescription(attachment)
        .await
        .map_err(claim_error)?
    {
        AttachOutcome::Linked(approval) => {
            Ok(Json(PrescriptionLinked::from(&approval)).into_response())
        }
        AttachOutcome::Rejected(approval) => {
            Ok(Json(Rejection::for_approval(&approval)).into_response())
        }
    }
}

async fn check_service_approval(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<ServiceApprovalView> {
    let approval = state
        .engine
        .service_approvals
        .check_status(&code)
        .await
        .map_err(engine_error)?;
    Ok(Json(ServiceApprovalView::from(&approval)))
}

async fn complete_service_approval(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<ServiceApprovalCompleted> {
    let approval = state
        .engine
        .service_approvals
        .complete(&code)
        .await
        .map_err(engine_error)?;
    Ok(Json(ServiceApprovalCompleted::from(&approval)))
}

async fn list_service_approvals(
    State(state): State<AppState>,
    Query(query): Query<ServiceApprovalQuery>,
) -> ApiResult<Vec<ServiceApprovalView>> {
    let filter = match (query.user_id, query.hospital_id) {
        (Some(_), Some(_)) => {
            return Err(bad_request_error("filter by userId or hospitalId, not both"));
        }
        (Some(user_id), None) => ApprovalFilter::User(user_id),
        (None, Some(hospital_id)) => ApprovalFilter::Hospital(hospital_id),
        (None, None) => ApprovalFilter::All,
    };
    let approvals = state
        .engine
        .service_approvals
        .list(filter)
        .await
        .map_err(engine_error)?;
    Ok(Json(approvals.iter().map(ServiceApprovalView::from).collect()))
}

// Prescription-only approvals

/// Every outcome carries the persisted record. Rejections answer 404 for an
/// unknown user and 400 otherwise.
async fn approve_prescription(
    State(state): State<AppState>,
    Json(request): Json<PrescriptionApprovalRequest>,
) -> Result<Response, ApiError> {
    if request.prescription_id_hospital.trim().is_empty() {
        return Err(bad_request_error("prescriptionIdHospital is required"));
    }

    let claim = PrescriptionClaim {
        user_id: request.user_id,
        total_cost: request.total_cost,
        prescription_id_hospital: request.prescription_id_hospital,
        details: request.details,
    };
    let approval = state
        .engine
        .prescriptions
        .submit(claim)
        .await
        .map_err(engine_error)?;

    let status = match &approval.rejection_reason {
        None => StatusCode::OK,
        Some(RejectionReason::UserNotFound) => StatusCode::NOT_FOUND,
        Some(_) => StatusCode::BAD_REQUEST,
    };
    Ok((status, Json(PrescriptionApprovalView::from(&approval))).into_response())
}

async fn list_prescription_approvals(
    State(state): State<AppState>,
    Query(query): Query<PrescriptionQuery>,
) -> ApiResult<Vec<PrescriptionApprovalView>> {
    let approvals = state
        .engine
        .prescriptions
        .list(query.user_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(approvals.iter().map(PrescriptionApprovalView::from).collect()))
}

async fn get_prescription_approval(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> ApiResult<PrescriptionApprovalView> {
    let approval = state
        .engine
        .prescriptions
        .get(id)
        .await
        .map_err(engine_error)?;
    Ok(Json(PrescriptionApprovalView::from(&approval)))
}

// Threshold

async fn current_threshold(State(state): State<AppState>) -> ApiResult<ThresholdView> {
    let current = state
        .engine
        .threshold
        .get_or_default()
        .await
        .map_err(engine_error)?;
    Ok(Json(current.into()))
}

async fn update_threshold(
    State(state): State<AppState>,
    Json(request): Json<ThresholdUpdateRequest>,
) -> ApiResult<ThresholdView> {
    let saved = state
        .engine
        .threshold
        .update(request.prescription_amount)
        .await
        .map_err(engine_error)?;
    Ok(Json(saved.into()))
}

// Hospital-service authorizations

fn required_ids(request: &AuthorizationRequest) -> Result<(RecordId, RecordId), ApiError> {
    match (request.hospital_id, request.service_id) {
        (Some(hospital_id), Some(service_id)) => Ok((hospital_id, service_id)),
        _ => Err(bad_request_error("hospitalId and serviceId are required")),
    }
}

/// 201 for a new grant, 200 when an existing pair was re-approved.
async fn grant_authorization(
    State(state): State<AppState>,
    Json(request): Json<AuthorizationRequest>,
) -> Result<Response, ApiError> {
    let (hospital_id, service_id) = required_ids(&request)?;
    let saved = state
        .engine
        .authorizations
        .grant(hospital_id, service_id, request.notes)
        .await
        .map_err(engine_error)?;

    // Fresh inserts start at version 0; every update bumps it.
    let status = if saved.version == 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(AuthorizationView::from(&saved))).into_response())
}

async fn revoke_authorization(
    State(state): State<AppState>,
    Json(request): Json<AuthorizationRequest>,
) -> ApiResult<Value> {
    let (hospital_id, service_id) = required_ids(&request)?;
    let revoked = state
        .engine
        .authorizations
        .revoke(hospital_id, service_id)
        .await
        .map_err(engine_error)?;
    if !revoked {
        warn!(hospital_id, service_id, "No active authorization to revoke");
        return Err(not_found_error("no active authorization to revoke"));
    }
    Ok(Json(json!({ "success": true, "message": "authorization revoked" })))
}

async fn revoke_authorization_by_id(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> ApiResult<Value> {
    let revoked = state
        .engine
        .authorizations
        .revoke_by_id(id)
        .await
        .map_err(engine_error)?;
    if !revoked {
        return Err(not_found_error("no active authorization to revoke"));
    }
    Ok(Json(json!({ "success": true, "message": "authorization revoked" })))
}

async fn get_authorization(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> ApiResult<AuthorizationView> {
    let record = state
        .engine
        .authorizations
        .get(id)
        .await
        .map_err(engine_error)?;
    Ok(Json(AuthorizationView::from(&record)))
}

async fn delete_authorization(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> ApiResult<Value> {
    let deleted = state
        .engine
        .authorizations
        .delete(id)
        .await
        .map_err(engine_error)?;
    if !deleted {
        return Err(not_found_error("authorization not found"));
    }
    Ok(Json(json!({ "success": true, "message": "authorization deleted" })))
}

async fn list_authorizations(
    State(state): State<AppState>,
    Query(query): Query<AuthorizationQuery>,
) -> ApiResult<Vec<AuthorizationView>> {
    let registry = &state.engine.authorizations;
    let records = match (query.hospital, query.service) {
        (Some(hospital_id), None) => registry.list_approved_for_hospital(hospital_id).await,
        (None, Some(service_id)) => registry.list_hospitals_for_service(service_id).await,
        _ => return Err(bad_request_error("filter required: ?hospital= or ?service=")),
    }
    .map_err(engine_error)?;
    Ok(Json(records.iter().map(AuthorizationView::from).collect()))
}
