pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod dispatcher;
pub mod gateway;
pub mod planner;
pub mod validation;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use dispatcher::DispatcherConfig;
pub use gateway::GatewayConfig;
pub use planner::PlannerConfig;
pub use validation::ConfigValidator;
