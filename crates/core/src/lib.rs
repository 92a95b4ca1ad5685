//! 外联调度系统核心: 统一错误类型与分层配置。

pub mod config;
pub mod errors;

pub use config::AppConfig;
pub use errors::{OutreachError, OutreachResult};
