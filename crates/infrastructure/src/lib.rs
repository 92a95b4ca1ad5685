//! 基础设施层: Postgres仓储、内存仓储、HTTP投递网关与指标采集。

pub mod database;
pub mod gateway;
pub mod memory;
pub mod observability;

pub use database::manager::DatabaseManager;
pub use gateway::HttpDeliveryGateway;
pub use memory::InMemoryStore;
pub use observability::MetricsCollector;
