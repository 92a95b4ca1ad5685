use thiserror::Error;
use uuid::Uuid;

/// 外联调度系统错误类型定义
#[derive(Debug, Error)]
pub enum OutreachError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("活动未找到: {id}")]
    CampaignNotFound { id: Uuid },

    #[error("潜在客户未找到: {id}")]
    ProspectNotFound { id: Uuid },

    #[error("发送账号未找到: {id}")]
    AccountNotFound { id: Uuid },

    #[error("发送事件未找到: {id}")]
    SendEventNotFound { id: i64 },

    #[error("潜在客户缺少可用身份信息, 无法排期: {id}")]
    ProspectNotPlannable { id: Uuid },

    #[error("无法在可发送窗口内安排时间: {0}")]
    CannotSchedule(String),

    #[error("非法的状态流转: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("投递网关错误: {0}")]
    Gateway(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type OutreachResult<T> = std::result::Result<T, OutreachError>;
