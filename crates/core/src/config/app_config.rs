use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    dispatcher::DispatcherConfig,
    gateway::GatewayConfig,
    planner::PlannerConfig,
    validation::ConfigValidator,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub dispatcher: DispatcherConfig,
    pub planner: PlannerConfig,
    pub gateway: GatewayConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/outreach".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_seconds: 30,
                idle_timeout_seconds: 600,
            },
            dispatcher: DispatcherConfig {
                enabled: true,
                poll_interval_seconds: 60,
                batch_size: 20,
                send_spacing_seconds: 30,
                stuck_claim_timeout_minutes: 15,
                cancel_chain_on_failure: false,
            },
            planner: PlannerConfig {
                follow_up_delay_days: vec![3, 8, 13, 18, 23],
                default_spacing_minutes: 30,
                default_daily_cap: 25,
                default_send_start_hour: 8,
                default_send_end_hour: 18,
                skip_weekends: true,
                failed_cooldown_hours: 24,
            },
            gateway: GatewayConfig {
                base_url: "https://api.provider.example".to_string(),
                api_key: String::new(),
                request_timeout_seconds: 30,
            },
            api: ApiConfig {
                enabled: true,
                bind_address: "0.0.0.0:8080".to_string(),
                cors_enabled: true,
                request_timeout_seconds: 30,
            },
            observability: ObservabilityConfig {
                metrics_enabled: true,
                metrics_endpoint: "/metrics".to_string(),
                log_level: "info".to_string(),
            },
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/outreach.toml",
                "outreach.toml",
                "/etc/outreach/config.toml",
            ];

            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = Self::set_defaults(builder)?;

        builder = builder.add_source(
            Environment::with_prefix("OUTREACH")
                .separator("_")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let builder =
            Self::set_defaults(ConfigBuilder::builder())?.add_source(File::from_str(toml_str, FileFormat::Toml));

        let config: AppConfig = builder
            .build()
            .context("解析TOML配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = builder
            .set_default("database.url", "postgres://localhost/outreach")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connection_timeout_seconds", 30)?
            .set_default("database.idle_timeout_seconds", 600)?
            .set_default("dispatcher.enabled", true)?
            .set_default("dispatcher.poll_interval_seconds", 60)?
            .set_default("dispatcher.batch_size", 20)?
            .set_default("dispatcher.send_spacing_seconds", 30)?
            .set_default("dispatcher.stuck_claim_timeout_minutes", 15)?
            .set_default("dispatcher.cancel_chain_on_failure", false)?
            .set_default("planner.follow_up_delay_days", vec![3, 8, 13, 18, 23])?
            .set_default("planner.default_spacing_minutes", 30)?
            .set_default("planner.default_daily_cap", 25)?
            .set_default("planner.default_send_start_hour", 8)?
            .set_default("planner.default_send_end_hour", 18)?
            .set_default("planner.skip_weekends", true)?
            .set_default("planner.failed_cooldown_hours", 24)?
            .set_default("gateway.base_url", "https://api.provider.example")?
            .set_default("gateway.api_key", "")?
            .set_default("gateway.request_timeout_seconds", 30)?
            .set_default("api.enabled", true)?
            .set_default("api.bind_address", "0.0.0.0:8080")?
            .set_default("api.cors_enabled", true)?
            .set_default("api.request_timeout_seconds", 30)?
            .set_default("observability.metrics_enabled", true)?
            .set_default("observability.metrics_endpoint", "/metrics")?
            .set_default("observability.log_level", "info")?;
        Ok(builder)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::errors::OutreachResult<()> {
        self.database.validate()?;
        self.dispatcher.validate()?;
        self.planner.validate()?;
        self.gateway.validate()?;
        self.api.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.dispatcher.poll_interval_seconds, 60);
        assert_eq!(config.planner.follow_up_delay_days, vec![3, 8, 13, 18, 23]);
        assert_eq!(config.api.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_app_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_serialization() {
        let config = AppConfig::default();
        let serialized = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: AppConfig =
            serde_json::from_str(&serialized).expect("Failed to deserialize");

        assert_eq!(
            config.database.max_connections,
            deserialized.database.max_connections
        );
        assert_eq!(
            config.planner.default_daily_cap,
            deserialized.planner.default_daily_cap
        );
    }

    #[test]
    fn test_app_config_from_toml() {
        let toml_str = r#"
[database]
url = "memory://"

[dispatcher]
poll_interval_seconds = 5
batch_size = 50

[planner]
follow_up_delay_days = [2, 5]
default_daily_cap = 3

[gateway]
base_url = "https://gw.test.example"
api_key = "test-key"
"#;

        let config = AppConfig::from_toml(toml_str).expect("Failed to parse TOML");
        assert!(config.database.is_in_memory());
        assert_eq!(config.dispatcher.poll_interval_seconds, 5);
        assert_eq!(config.dispatcher.batch_size, 50);
        assert_eq!(config.planner.follow_up_delay_days, vec![2, 5]);
        assert_eq!(config.planner.default_daily_cap, 3);
        // 未覆盖的节保持默认值
        assert_eq!(config.api.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_app_config_from_toml_rejects_invalid() {
        let toml_str = r#"
[planner]
follow_up_delay_days = [8, 3]
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }
}
