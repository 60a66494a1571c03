use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Extension;
use axum::Json;
use policy_outreach::workflows::policy::{
    outreach_router, AssessmentRepository, OutreachService, PolicyProgram, ProgramId, RuleKind,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Catalog entry exposed to the dispatch console.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProgramSummary {
    pub(crate) id: ProgramId,
    pub(crate) name: String,
    pub(crate) version: u32,
    pub(crate) focus_tags: Vec<String>,
    pub(crate) hard_rules: usize,
    pub(crate) soft_rules: usize,
}

impl From<&PolicyProgram> for ProgramSummary {
    fn from(program: &PolicyProgram) -> Self {
        let count = |kind: RuleKind| program.rules.iter().filter(|rule| rule.kind == kind).count();
        Self {
            id: program.id.clone(),
            name: program.name.clone(),
            version: program.version,
            focus_tags: program.focus_tags.clone(),
            hard_rules: count(RuleKind::Hard),
            soft_rules: count(RuleKind::Soft),
        }
    }
}

pub(crate) fn with_outreach_routes<R>(service: Arc<OutreachService<R>>) -> axum::Router
where
    R: AssessmentRepository + 'static,
{
    let programs: Arc<Vec<ProgramSummary>> = Arc::new(
        service
            .catalog()
            .programs()
            .map(ProgramSummary::from)
            .collect(),
    );

    outreach_router(service)
        .route(
            "/api/v1/programs",
            get(move || {
                let programs = programs.clone();
                async move { Json(programs.as_ref().clone()) }
            }),
        )
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{load_roster, outreach_service};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use policy_outreach::config::EngineConfig;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let today = NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid date");
        let roster = load_roster(None).expect("bundled roster");
        let service = outreach_service(roster, today, EngineConfig::default());
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_outreach_routes(Arc::new(service)).layer(Extension(state))
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("request builds")
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_bound() {
        let response = app(false)
            .oneshot(get_request("/ready"))
            .await
            .expect("route responds");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], json!("initializing"));

        let response = app(true)
            .oneshot(get_request("/ready"))
            .await
            .expect("route responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn programs_route_lists_the_catalog() {
        let response = app(true)
            .oneshot(get_request("/api/v1/programs"))
            .await
            .expect("route responds");
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let programs = body.as_array().expect("array of programs");
        assert!(!programs.is_empty());
        assert!(programs
            .iter()
            .any(|program| program["id"] == json!("high_tech_enterprise")));
    }

    #[tokio::test]
    async fn seeded_district_screens_over_http() {
        let app = app(true);
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/programs/high_tech_enterprise/screening-runs")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route responds");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["evaluated"], json!(4));

        let response = app
            .oneshot(get_request("/health"))
            .await
            .expect("route responds");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
