use serde::{Deserialize, Serialize};

use super::validation::{ConfigValidator, ValidationUtils};
use crate::errors::OutreachResult;

/// 调度循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub enabled: bool,
    /// 轮询间隔
    pub poll_interval_seconds: u64,
    /// 单轮最多认领的到期事件数
    pub batch_size: usize,
    /// 同账号两次发送之间的基础等待秒数(实际等待会加±30%抖动)
    pub send_spacing_seconds: u64,
    /// IN_FLIGHT事件超过该时长未完成则视为僵死, 释放回PENDING
    pub stuck_claim_timeout_minutes: u64,
    /// 硬失败时是否取消该客户剩余的待发送事件
    pub cancel_chain_on_failure: bool,
}

impl ConfigValidator for DispatcherConfig {
    fn validate(&self) -> OutreachResult<()> {
        ValidationUtils::validate_positive_seconds(
            self.poll_interval_seconds,
            "dispatcher.poll_interval_seconds",
        )?;
        ValidationUtils::validate_count(self.batch_size, "dispatcher.batch_size", 1000)?;
        ValidationUtils::validate_positive_seconds(
            self.stuck_claim_timeout_minutes,
            "dispatcher.stuck_claim_timeout_minutes",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_validation() {
        let config = DispatcherConfig {
            enabled: true,
            poll_interval_seconds: 60,
            batch_size: 20,
            send_spacing_seconds: 30,
            stuck_claim_timeout_minutes: 15,
            cancel_chain_on_failure: false,
        };
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.poll_interval_seconds = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.batch_size = 0;
        assert!(invalid.validate().is_err());
    }
}
