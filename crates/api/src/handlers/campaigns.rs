use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use outreach_core::OutreachError;
use outreach_dispatcher::RescheduleParams;
use outreach_domain::entities::Campaign;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiResult, response::ApiResponse, routes::AppState};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EnrollRequest {
    /// 本次入队最多处理的客户数, 缺省100
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub inserted: usize,
    pub planned_prospects: usize,
    pub skipped: Vec<Uuid>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RescheduleRequest {
    /// 新起点不早于该时刻
    pub not_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RescheduleResponse {
    pub moved: u64,
}

pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<Campaign>> {
    let campaign = state
        .campaign_repo
        .find_by_id(id)
        .await?
        .ok_or(OutreachError::CampaignNotFound { id })?;
    Ok(ApiResponse::success(campaign))
}

/// 为活动下可排期的客户展开消息序列并入队
pub async fn enroll_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<EnrollRequest>>,
) -> ApiResult<ApiResponse<EnrollResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let limit = request.limit.unwrap_or(100);

    let report = state.planner.enroll_campaign(id, limit, Utc::now()).await?;
    Ok(ApiResponse::success_with_message(
        EnrollResponse {
            inserted: report.inserted,
            planned_prospects: report.planned_prospects,
            skipped: report.skipped,
            estimated_completion: report.estimated_completion,
        },
        format!("入队完成, 新增{}条发送事件", report.inserted),
    ))
}

/// 把活动的PENDING事件整体平移到新起点
pub async fn reschedule_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<RescheduleRequest>>,
) -> ApiResult<ApiResponse<RescheduleResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let moved = state
        .rescheduler
        .reschedule_campaign(
            id,
            RescheduleParams {
                not_before: request.not_before,
            },
            Utc::now(),
        )
        .await?;
    Ok(ApiResponse::success_with_message(
        RescheduleResponse { moved },
        format!("重排完成, 移动{moved}条事件"),
    ))
}
