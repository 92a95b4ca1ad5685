use serde::{Deserialize, Serialize};

use super::validation::{ConfigValidator, ValidationUtils};
use crate::errors::{OutreachError, OutreachResult};

/// 数据库配置
///
/// `url` 以 `postgres://` 开头时使用Postgres存储, 为 `memory://` 时
/// 使用内置的内存存储(零配置模式, 进程退出后数据丢失)。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.url == "memory://"
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> OutreachResult<()> {
        ValidationUtils::validate_not_empty(&self.url, "database.url")?;

        if !self.url.starts_with("postgres://")
            && !self.url.starts_with("postgresql://")
            && !self.is_in_memory()
        {
            return Err(OutreachError::Configuration(format!(
                "不支持的数据库URL: {}, 仅支持 postgres:// 或 memory://",
                self.url
            )));
        }

        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(OutreachError::Configuration(
                "database 连接池大小配置不合法".to_string(),
            ));
        }

        ValidationUtils::validate_positive_seconds(
            self.connection_timeout_seconds,
            "database.connection_timeout_seconds",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DatabaseConfig {
        DatabaseConfig {
            url: "postgres://localhost/outreach".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }

    #[test]
    fn test_database_config_validation() {
        assert!(base().validate().is_ok());

        let mut invalid = base();
        invalid.url = "mysql://localhost/outreach".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = base();
        invalid.min_connections = 20;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_in_memory_url() {
        let mut config = base();
        config.url = "memory://".to_string();
        assert!(config.is_in_memory());
        assert!(config.validate().is_ok());
    }
}
