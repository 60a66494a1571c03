use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{AssessmentId, CaseworkerId, ProgramId, RuleId, TouchState};
use super::lifecycle::{Actor, TransitionError};
use super::repository::{AssessmentFilter, AssessmentRepository};
use super::service::{
    AllocationDecision, OutreachService, OutreachServiceError, RuleOverride, TransitionRequest,
};

/// Router builder exposing the outreach dashboard endpoints.
pub fn outreach_router<R>(service: Arc<OutreachService<R>>) -> Router
where
    R: AssessmentRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/programs/:program_id/screening-runs",
            post(screening_run_handler::<R>),
        )
        .route("/api/v1/programs/:program_id/stats", get(stats_handler::<R>))
        .route("/api/v1/assessments", get(list_handler::<R>))
        .route("/api/v1/assessments/:id", get(assessment_handler::<R>))
        .route("/api/v1/assessments/:id/history", get(history_handler::<R>))
        .route(
            "/api/v1/assessments/:id/transitions",
            post(transition_handler::<R>),
        )
        .route(
            "/api/v1/assessments/:id/allocation",
            get(suggest_allocation_handler::<R>).post(accept_allocation_handler::<R>),
        )
        .route(
            "/api/v1/assessments/:id/diagnosis",
            post(diagnosis_handler::<R>),
        )
        .route(
            "/api/v1/assessments/:id/backfill",
            post(backfill_handler::<R>),
        )
        .route(
            "/api/v1/assessments/:id/rules/:rule_id/override",
            post(override_handler::<R>),
        )
        .route("/api/v1/caseworkers/progress", get(progress_handler::<R>))
        .route("/api/v1/match-queries", post(match_query_handler::<R>))
        .with_state(service)
}

/// Map service errors onto status codes with a `retryable` hint.
pub(crate) fn error_response(error: OutreachServiceError) -> Response {
    let status = match &error {
        OutreachServiceError::ConcurrentTransitionConflict { .. } => StatusCode::CONFLICT,
        OutreachServiceError::Transition(TransitionError::Forbidden { .. }) => {
            StatusCode::FORBIDDEN
        }
        OutreachServiceError::Transition(_)
        | OutreachServiceError::Allocation(_)
        | OutreachServiceError::Override(_)
        | OutreachServiceError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OutreachServiceError::NotFound(_) | OutreachServiceError::UnknownProgram(_) => {
            StatusCode::NOT_FOUND
        }
        OutreachServiceError::Collaborator(inner) if inner.is_timeout() => {
            StatusCode::GATEWAY_TIMEOUT
        }
        OutreachServiceError::Collaborator(_)
        | OutreachServiceError::Repository(_)
        | OutreachServiceError::Evaluation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({
        "error": error.to_string(),
        "retryable": error.is_retryable(),
    });
    (status, axum::Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, OutreachServiceError>,
) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    caseworker_id: Option<String>,
    #[serde(default)]
    program_id: Option<String>,
    #[serde(default)]
    touch_state: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<AssessmentFilter, OutreachServiceError> {
        let touch_state = match self.touch_state.as_deref() {
            Some(raw) => Some(TouchState::parse(raw).ok_or_else(|| {
                OutreachServiceError::InvalidRequest(format!("unknown touch_state '{raw}'"))
            })?),
            None => None,
        };
        Ok(AssessmentFilter {
            caseworker_id: self.caseworker_id.map(CaseworkerId),
            program_id: self.program_id.map(ProgramId),
            touch_state,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiagnosisRequest {
    actor: Actor,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MatchQueryRequest {
    text: String,
}

pub(crate) async fn screening_run_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path(program_id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    let result = service
        .trigger_screening_run(&ProgramId(program_id))
        .await;
    respond(StatusCode::ACCEPTED, result)
}

pub(crate) async fn stats_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path(program_id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    respond(StatusCode::OK, service.stats(&ProgramId(program_id)))
}

pub(crate) async fn list_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    let result = query
        .into_filter()
        .and_then(|filter| service.list(&filter));
    respond(StatusCode::OK, result)
}

pub(crate) async fn assessment_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path(id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    respond(StatusCode::OK, service.assessment(&AssessmentId(id)))
}

pub(crate) async fn history_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path(id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    respond(StatusCode::OK, service.history(&AssessmentId(id)))
}

pub(crate) async fn transition_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<TransitionRequest>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    respond(StatusCode::OK, service.transition(&AssessmentId(id), request))
}

pub(crate) async fn suggest_allocation_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path(id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    let result = service.suggest_allocation(&AssessmentId(id)).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn accept_allocation_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path(id): Path<String>,
    axum::Json(decision): axum::Json<AllocationDecision>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    let result = service.accept_allocation(&AssessmentId(id), decision).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn diagnosis_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<DiagnosisRequest>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.run_diagnosis(&AssessmentId(id), request.actor),
    )
}

pub(crate) async fn backfill_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path(id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    let result = service.backfill_from_visits(&AssessmentId(id)).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn override_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    Path((id, rule_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<RuleOverride>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.override_rule_result(&AssessmentId(id), &RuleId(rule_id), request),
    )
}

pub(crate) async fn progress_handler<R>(State(service): State<Arc<OutreachService<R>>>) -> Response
where
    R: AssessmentRepository + 'static,
{
    respond(StatusCode::OK, service.caseworker_progress())
}

pub(crate) async fn match_query_handler<R>(
    State(service): State<Arc<OutreachService<R>>>,
    axum::Json(request): axum::Json<MatchQueryRequest>,
) -> Response
where
    R: AssessmentRepository + 'static,
{
    let result = service.submit_match_query(&request.text).await;
    respond(StatusCode::OK, result)
}
