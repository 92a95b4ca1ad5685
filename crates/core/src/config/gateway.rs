use serde::{Deserialize, Serialize};

use super::validation::{ConfigValidator, ValidationUtils};
use crate::errors::{OutreachError, OutreachResult};

/// 投递网关(消息服务商)配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_seconds: u64,
}

impl ConfigValidator for GatewayConfig {
    fn validate(&self) -> OutreachResult<()> {
        ValidationUtils::validate_not_empty(&self.base_url, "gateway.base_url")?;

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(OutreachError::Configuration(format!(
                "gateway.base_url 必须是http(s)地址: {}",
                self.base_url
            )));
        }

        ValidationUtils::validate_positive_seconds(
            self.request_timeout_seconds,
            "gateway.request_timeout_seconds",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_validation() {
        let config = GatewayConfig {
            base_url: "https://api.provider.example".to_string(),
            api_key: "key".to_string(),
            request_timeout_seconds: 30,
        };
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.base_url = "ftp://api.provider.example".to_string();
        assert!(invalid.validate().is_err());
    }
}
