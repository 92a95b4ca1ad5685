use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use outreach_core::OutreachError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Outreach(#[from] OutreachError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::Outreach(OutreachError::CampaignNotFound { id }) => (
                StatusCode::NOT_FOUND,
                "CAMPAIGN_NOT_FOUND",
                format!("活动 {id} 不存在"),
            ),
            ApiError::Outreach(OutreachError::ProspectNotFound { id }) => (
                StatusCode::NOT_FOUND,
                "PROSPECT_NOT_FOUND",
                format!("客户 {id} 不存在"),
            ),
            ApiError::Outreach(OutreachError::AccountNotFound { id }) => (
                StatusCode::NOT_FOUND,
                "ACCOUNT_NOT_FOUND",
                format!("发送账号 {id} 不存在"),
            ),
            ApiError::Outreach(OutreachError::SendEventNotFound { id }) => (
                StatusCode::NOT_FOUND,
                "SEND_EVENT_NOT_FOUND",
                format!("发送事件 {id} 不存在"),
            ),
            ApiError::Outreach(OutreachError::ProspectNotPlannable { id }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "PROSPECT_NOT_PLANNABLE",
                format!("客户 {id} 缺少身份信息, 无法排期"),
            ),
            ApiError::Outreach(OutreachError::CannotSchedule(msg)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CANNOT_SCHEDULE",
                format!("无法排期: {msg}"),
            ),
            ApiError::Outreach(OutreachError::InvalidStateTransition { from, to }) => (
                StatusCode::CONFLICT,
                "INVALID_STATE_TRANSITION",
                format!("非法的生命周期流转: {from} -> {to}"),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
            }
            ApiError::Outreach(e) => {
                tracing::error!("API内部错误: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "内部服务器错误".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "type": error_type,
                "message": message,
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));
        (status, body).into_response()
    }
}
