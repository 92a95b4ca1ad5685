use serde::{Deserialize, Serialize};

use super::validation::{ConfigValidator, ValidationUtils};
use crate::errors::{OutreachError, OutreachResult};

/// 序列排期配置
///
/// 活动自身的设置优先, 这里是活动未配置时的默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// 各跟进消息相对建联请求的天数偏移
    pub follow_up_delay_days: Vec<u32>,
    /// 同账号同日内两条消息的最小间隔(分钟)
    pub default_spacing_minutes: u32,
    /// 单账号单日发送上限
    pub default_daily_cap: u32,
    /// 可发送窗口起止小时(本地时间, [start, end))
    pub default_send_start_hour: u32,
    pub default_send_end_hour: u32,
    /// 是否跳过周末
    pub skip_weekends: bool,
    /// 发送失败的客户冷却该时长后才允许重新入队
    pub failed_cooldown_hours: u64,
}

impl ConfigValidator for PlannerConfig {
    fn validate(&self) -> OutreachResult<()> {
        if self.follow_up_delay_days.is_empty() {
            return Err(OutreachError::Configuration(
                "planner.follow_up_delay_days 不能为空".to_string(),
            ));
        }

        // 偏移必须严格递增, 否则跟进顺序无法保证
        for pair in self.follow_up_delay_days.windows(2) {
            if pair[1] <= pair[0] {
                return Err(OutreachError::Configuration(format!(
                    "planner.follow_up_delay_days 必须严格递增: {:?}",
                    self.follow_up_delay_days
                )));
            }
        }

        ValidationUtils::validate_count(
            self.default_spacing_minutes as usize,
            "planner.default_spacing_minutes",
            24 * 60,
        )?;
        ValidationUtils::validate_count(
            self.default_daily_cap as usize,
            "planner.default_daily_cap",
            10_000,
        )?;
        ValidationUtils::validate_hour(
            self.default_send_start_hour,
            "planner.default_send_start_hour",
        )?;
        ValidationUtils::validate_hour(self.default_send_end_hour, "planner.default_send_end_hour")?;

        if self.default_send_start_hour >= self.default_send_end_hour {
            return Err(OutreachError::Configuration(format!(
                "发送窗口起始小时必须早于结束小时: {}..{}",
                self.default_send_start_hour, self.default_send_end_hour
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PlannerConfig {
        PlannerConfig {
            follow_up_delay_days: vec![3, 8, 13, 18, 23],
            default_spacing_minutes: 30,
            default_daily_cap: 25,
            default_send_start_hour: 8,
            default_send_end_hour: 18,
            skip_weekends: true,
            failed_cooldown_hours: 24,
        }
    }

    #[test]
    fn test_planner_config_validation() {
        assert!(base().validate().is_ok());

        let mut invalid = base();
        invalid.follow_up_delay_days = vec![3, 3, 8];
        assert!(invalid.validate().is_err());

        let mut invalid = base();
        invalid.default_send_start_hour = 18;
        invalid.default_send_end_hour = 8;
        assert!(invalid.validate().is_err());

        let mut invalid = base();
        invalid.follow_up_delay_days = vec![];
        assert!(invalid.validate().is_err());
    }
}
