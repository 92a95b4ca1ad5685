use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{error::ApiResult, response::ApiResponse, routes::AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct CycleSummary {
    pub released: u64,
    pub claimed: usize,
    pub sent: usize,
    pub marked_only: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub cancelled: u64,
}

/// 队列状态统计
pub async fn queue_stats(
    State(state): State<AppState>,
) -> ApiResult<ApiResponse<outreach_domain::repositories::QueueCounts>> {
    let counts = state.queue_repo.counts(Utc::now()).await?;
    Ok(ApiResponse::success(counts))
}

/// 手动触发一轮调度, 返回本轮结果
pub async fn run_cycle(State(state): State<AppState>) -> ApiResult<ApiResponse<CycleSummary>> {
    let report = state.dispatcher.run_cycle(Utc::now(), None).await?;
    tracing::info!(
        "手动触发调度完成: 认领{}, 发送{}, 失败{}",
        report.claimed,
        report.sent,
        report.failed
    );
    Ok(ApiResponse::success(CycleSummary {
        released: report.released,
        claimed: report.claimed,
        sent: report.sent,
        marked_only: report.marked_only,
        duplicates: report.duplicates,
        failed: report.failed,
        cancelled: report.cancelled,
    }))
}
