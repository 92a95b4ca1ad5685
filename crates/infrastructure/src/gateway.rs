//! HTTP投递网关: 通过服务商REST API实际发送消息。

use async_trait::async_trait;
use chrono::Utc;
use outreach_core::{config::GatewayConfig, OutreachError, OutreachResult};
use outreach_domain::{
    entities::{MessageSlot, MessagingAccount, Prospect},
    ports::{DeliveryGateway, DeliveryReceipt, GatewayError},
};
use serde::Deserialize;
use tracing::{debug, warn};

pub struct HttpDeliveryGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ProviderSendResponse {
    #[serde(alias = "invitation_id")]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ProviderErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    title: Option<String>,
    detail: Option<String>,
}

impl HttpDeliveryGateway {
    pub fn new(config: &GatewayConfig) -> OutreachResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| OutreachError::Configuration(format!("构建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// 服务商把"已是好友/已有未处理邀请"作为错误返回, 这里识别成独立类别
    fn classify_error(status: reqwest::StatusCode, body: &ProviderErrorBody) -> GatewayError {
        let haystack = format!(
            "{} {} {}",
            body.error_type.as_deref().unwrap_or_default(),
            body.title.as_deref().unwrap_or_default(),
            body.detail.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        if haystack.contains("already_invited")
            || haystack.contains("already invited")
            || haystack.contains("already_connected")
            || haystack.contains("already connected")
            || haystack.contains("duplicate")
        {
            return GatewayError::Duplicate {
                message: body.detail.clone().unwrap_or_else(|| haystack.clone()),
            };
        }

        GatewayError::Provider {
            code: body
                .error_type
                .clone()
                .unwrap_or_else(|| format!("HTTP_{}", status.as_u16())),
            message: body
                .detail
                .clone()
                .or_else(|| body.title.clone())
                .unwrap_or_else(|| "服务商未返回错误详情".to_string()),
        }
    }
}

#[async_trait]
impl DeliveryGateway for HttpDeliveryGateway {
    async fn send(
        &self,
        account: &MessagingAccount,
        prospect: &Prospect,
        slot: MessageSlot,
        message: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        // 建联请求和会话消息走不同的服务商端点
        let url = match slot {
            MessageSlot::ConnectionRequest => format!("{}/api/v1/users/invite", self.base_url),
            MessageSlot::FollowUp(_) => format!("{}/api/v1/chats", self.base_url),
        };

        let payload = serde_json::json!({
            "account_id": account.provider_account_id,
            "attendee_provider_id": prospect.external_profile_id,
            "profile_url": prospect.profile_url,
            "text": message,
        });

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: ProviderSendResponse = response
                .json()
                .await
                .unwrap_or(ProviderSendResponse { message_id: None });
            debug!(
                "发送成功: 账号 {} -> 客户 {} ({})",
                account.id,
                prospect.id,
                slot.as_str()
            );
            return Ok(DeliveryReceipt {
                provider_message_id: body.message_id,
                sent_at: Utc::now(),
            });
        }

        let body: ProviderErrorBody = response.json().await.unwrap_or_default();
        let error = Self::classify_error(status, &body);
        warn!(
            "发送失败: 账号 {} -> 客户 {} ({}): {}",
            account.id,
            prospect.id,
            slot.as_str(),
            error
        );
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_duplicate_error() {
        let body = ProviderErrorBody {
            error_type: Some("errors/already_invited".to_string()),
            title: None,
            detail: Some("An invitation has already been sent".to_string()),
        };
        let err = HttpDeliveryGateway::classify_error(reqwest::StatusCode::UNPROCESSABLE_ENTITY, &body);
        assert!(matches!(err, GatewayError::Duplicate { .. }));
    }

    #[test]
    fn test_classify_provider_error() {
        let body = ProviderErrorBody {
            error_type: Some("errors/rate_limited".to_string()),
            title: Some("Too many requests".to_string()),
            detail: None,
        };
        let err = HttpDeliveryGateway::classify_error(reqwest::StatusCode::TOO_MANY_REQUESTS, &body);
        match err {
            GatewayError::Provider { code, message } => {
                assert_eq!(code, "errors/rate_limited");
                assert_eq!(message, "Too many requests");
            }
            other => panic!("意外的错误分类: {other:?}"),
        }
    }

    #[test]
    fn test_classify_empty_body_uses_http_status() {
        let err = HttpDeliveryGateway::classify_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            &ProviderErrorBody::default(),
        );
        match err {
            GatewayError::Provider { code, .. } => assert_eq!(code, "HTTP_500"),
            other => panic!("意外的错误分类: {other:?}"),
        }
    }
}
