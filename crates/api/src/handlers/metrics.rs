use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::routes::AppState;

/// 以Prometheus文本格式导出全部调度指标
pub async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "指标导出未启用").into_response(),
    }
}
