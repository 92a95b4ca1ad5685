use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use outreach_dispatcher::{DispatchLoop, RescheduleService, SequencePlanner};
use outreach_domain::repositories::{CampaignRepository, SendQueueRepository};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    campaigns::{enroll_campaign, get_campaign, reschedule_campaign},
    health::health_check,
    metrics::export_metrics,
    queue::{queue_stats, run_cycle},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub campaign_repo: Arc<dyn CampaignRepository>,
    pub queue_repo: Arc<dyn SendQueueRepository>,
    pub planner: Arc<SequencePlanner>,
    pub rescheduler: Arc<RescheduleService>,
    pub dispatcher: Arc<DispatchLoop>,
    /// Prometheus导出句柄, 指标未启用时为None
    pub metrics_handle: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState, cors_enabled: bool) -> Router {
    let mut router = Router::new()
        // 健康检查与指标
        .route("/health", get(health_check))
        .route("/metrics", get(export_metrics))
        // 队列运维API
        .route("/api/queue/stats", get(queue_stats))
        .route("/api/queue/run-cycle", post(run_cycle))
        // 活动排期API
        .route("/api/campaigns/{id}", get(get_campaign))
        .route("/api/campaigns/{id}/enroll", post(enroll_campaign))
        .route("/api/campaigns/{id}/reschedule", post(reschedule_campaign))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }
    router
}
