use crate::cli::ServeArgs;
use crate::infra::{service_from_config, AppState, BackgroundWorkers};
use crate::routes::with_verification_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use estate_identity::config::AppConfig;
use estate_identity::error::AppError;
use estate_identity::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let verification_service = service_from_config(&config);
    let workers = BackgroundWorkers::spawn(&verification_service, &config);

    let app = with_verification_routes(verification_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        heartbeat_secs = config.events.heartbeat_interval.as_secs(),
        retention_days = config.retention.notification_retention_days,
        "identity verification service ready"
    );

    let served = axum::serve(listener, app).await;
    workers.shutdown();
    served?;
    Ok(())
}
