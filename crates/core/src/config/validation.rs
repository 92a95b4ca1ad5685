use crate::errors::{OutreachError, OutreachResult};

/// 配置校验统一接口
pub trait ConfigValidator {
    fn validate(&self) -> OutreachResult<()>;
}

/// 配置校验工具集
pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field: &str) -> OutreachResult<()> {
        if value.trim().is_empty() {
            return Err(OutreachError::Configuration(format!("{field} 不能为空")));
        }
        Ok(())
    }

    pub fn validate_positive_seconds(value: u64, field: &str) -> OutreachResult<()> {
        if value == 0 {
            return Err(OutreachError::Configuration(format!(
                "{field} 必须大于0秒"
            )));
        }
        Ok(())
    }

    pub fn validate_count(value: usize, field: &str, max: usize) -> OutreachResult<()> {
        if value == 0 || value > max {
            return Err(OutreachError::Configuration(format!(
                "{field} 必须在 1..={max} 范围内, 实际为 {value}"
            )));
        }
        Ok(())
    }

    pub fn validate_hour(value: u32, field: &str) -> OutreachResult<()> {
        if value > 23 {
            return Err(OutreachError::Configuration(format!(
                "{field} 必须是 0..=23 的小时值, 实际为 {value}"
            )));
        }
        Ok(())
    }

    pub fn validate_utc_offset_minutes(value: i32, field: &str) -> OutreachResult<()> {
        // UTC-12:00 到 UTC+14:00
        if !(-720..=840).contains(&value) {
            return Err(OutreachError::Configuration(format!(
                "{field} 必须在 -720..=840 分钟范围内, 实际为 {value}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("x", "f").is_ok());
        assert!(ValidationUtils::validate_not_empty("  ", "f").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(5, "f", 100).is_ok());
        assert!(ValidationUtils::validate_count(0, "f", 100).is_err());
        assert!(ValidationUtils::validate_count(101, "f", 100).is_err());
    }

    #[test]
    fn test_validate_hour() {
        assert!(ValidationUtils::validate_hour(9, "f").is_ok());
        assert!(ValidationUtils::validate_hour(24, "f").is_err());
    }

    #[test]
    fn test_validate_utc_offset_minutes() {
        assert!(ValidationUtils::validate_utc_offset_minutes(-300, "f").is_ok());
        assert!(ValidationUtils::validate_utc_offset_minutes(900, "f").is_err());
    }
}
