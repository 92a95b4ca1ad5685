use serde::{Deserialize, Serialize};

use super::validation::{ConfigValidator, ValidationUtils};
use crate::errors::{OutreachError, OutreachResult};

/// API服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
    pub request_timeout_seconds: u64,
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> OutreachResult<()> {
        ValidationUtils::validate_not_empty(&self.bind_address, "api.bind_address")?;

        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(OutreachError::Configuration(format!(
                "api.bind_address 不是合法的监听地址: {}",
                self.bind_address
            )));
        }

        ValidationUtils::validate_positive_seconds(
            self.request_timeout_seconds,
            "api.request_timeout_seconds",
        )?;
        Ok(())
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
    pub metrics_endpoint: String,
    pub log_level: String,
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> OutreachResult<()> {
        ValidationUtils::validate_not_empty(&self.metrics_endpoint, "observability.metrics_endpoint")?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(OutreachError::Configuration(format!(
                "非法的日志级别: {}, 可选: {:?}",
                self.log_level, valid_levels
            )));
        }
        Ok(())
    }
}
