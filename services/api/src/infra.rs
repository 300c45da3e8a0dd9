use estate_identity::config::AppConfig;
use estate_identity::workflows::events::{EventBroadcastHub, HubConfig};
use estate_identity::workflows::notifications::{
    run_retention, InMemoryNotificationRepository, NotificationLedger,
};
use estate_identity::workflows::verification::{
    EvidencePolicy, InMemoryVerificationStore, VerificationService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub(crate) type AppService =
    VerificationService<InMemoryVerificationStore, InMemoryNotificationRepository>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn build_service(
    hub: HubConfig,
    evidence: EvidencePolicy,
) -> Arc<AppService> {
    let store = Arc::new(InMemoryVerificationStore::default());
    let ledger = Arc::new(NotificationLedger::new(Arc::new(
        InMemoryNotificationRepository::default(),
    )));
    Arc::new(VerificationService::new(
        store,
        ledger,
        EventBroadcastHub::new(hub),
        evidence,
    ))
}

pub(crate) fn service_from_config(config: &AppConfig) -> Arc<AppService> {
    build_service(
        HubConfig::from(&config.events),
        EvidencePolicy::from(&config.evidence),
    )
}

/// In-process background tasks that live as long as the server.
pub(crate) struct BackgroundWorkers {
    heartbeat: JoinHandle<()>,
    retention: JoinHandle<()>,
}

impl BackgroundWorkers {
    pub(crate) fn spawn(service: &Arc<AppService>, config: &AppConfig) -> Self {
        let heartbeat = service.hub().spawn_heartbeat();
        let retention = tokio::spawn(run_retention(
            Arc::downgrade(service.ledger()),
            config.retention.notification_retention_days,
            config.retention.sweep_interval,
        ));
        Self {
            heartbeat,
            retention,
        }
    }

    pub(crate) fn shutdown(self) {
        self.heartbeat.abort();
        self.retention.abort();
    }
}
