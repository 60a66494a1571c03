use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Local;
use policy_outreach::config::AppConfig;
use policy_outreach::error::AppError;
use policy_outreach::telemetry;
use tracing::{info, warn};

use crate::cli::ServeArgs;
use crate::infra::{load_roster, outreach_service, AppState};
use crate::routes::with_outreach_routes;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let roster_path = args.roster.take().or_else(|| config.roster_path.clone());
    let roster = load_roster(roster_path.as_deref())?;
    let service = outreach_service(roster, Local::now().date_naive(), config.engine.clone());
    for misconfigured in service.catalog().misconfigurations() {
        warn!(error = %misconfigured, "catalog rule will be skipped");
    }

    let app = with_outreach_routes(Arc::new(service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "policy outreach engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
