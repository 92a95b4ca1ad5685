use std::time::Duration;

use outreach_core::{config::DatabaseConfig, OutreachError, OutreachResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// 数据库连接管理
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> OutreachResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(OutreachError::Database)?;

        info!(
            "数据库连接池就绪: max_connections={}",
            config.max_connections
        );
        Ok(Self { pool })
    }

    /// 执行迁移, 建表幂等
    pub async fn migrate(&self) -> OutreachResult<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| OutreachError::DatabaseOperation(format!("执行迁移失败: {e}")))?;
        info!("数据库迁移完成");
        Ok(())
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn health_check(&self) -> OutreachResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(OutreachError::Database)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
