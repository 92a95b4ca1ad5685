//! 投递网关端口: 实际把消息交给服务商的抽象接口。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entities::{MessageSlot, MessagingAccount, Prospect};

/// 网关错误分类
///
/// `Duplicate` 单列: 对建联请求而言"已经是好友/已邀请过"不算失败,
/// 调度循环据此做软成功处理。
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("对方已是好友或已有未处理邀请: {message}")]
    Duplicate { message: String },

    #[error("服务商返回错误 [{code}]: {message}")]
    Provider { code: String, message: String },

    #[error("网络错误: {0}")]
    Network(String),
}

impl GatewayError {
    /// 落库用的错误码
    pub fn error_code(&self) -> &str {
        match self {
            GatewayError::Duplicate { .. } => "DUPLICATE_INVITATION",
            GatewayError::Provider { code, .. } => code,
            GatewayError::Network(_) => "NETWORK_ERROR",
        }
    }
}

/// 投递回执
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub provider_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// 投递网关抽象
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// 通过指定账号向客户发送一条消息
    async fn send(
        &self,
        account: &MessagingAccount,
        prospect: &Prospect,
        slot: MessageSlot,
        message: &str,
    ) -> Result<DeliveryReceipt, GatewayError>;
}
