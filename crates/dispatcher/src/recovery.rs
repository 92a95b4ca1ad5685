//! 队列恢复: 把认领后长时间未完成的IN_FLIGHT事件释放回PENDING。
//!
//! 调度进程崩溃或被强杀时会留下僵死的认领, 依靠可见性超时在
//! 启动时和每轮调度前回收。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use outreach_core::OutreachResult;
use outreach_domain::repositories::SendQueueRepository;
use tracing::{info, warn};

/// 恢复配置
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// IN_FLIGHT超过该时长视为僵死
    pub stuck_claim_timeout_minutes: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stuck_claim_timeout_minutes: 15,
        }
    }
}

pub struct QueueRecovery {
    queue_repo: Arc<dyn SendQueueRepository>,
    config: RecoveryConfig,
}

impl QueueRecovery {
    pub fn new(queue_repo: Arc<dyn SendQueueRepository>, config: RecoveryConfig) -> Self {
        Self { queue_repo, config }
    }

    /// 释放僵死认领, 返回释放条数
    pub async fn release_stuck_claims(&self, now: DateTime<Utc>) -> OutreachResult<u64> {
        let older_than =
            now - Duration::minutes(self.config.stuck_claim_timeout_minutes as i64);
        let released = self.queue_repo.release_stuck(older_than).await?;
        if released > 0 {
            warn!("回收僵死认领 {released} 条 (认领早于 {older_than})");
        }
        Ok(released)
    }

    /// 启动时执行一次完整回收
    pub async fn recover_on_startup(&self) -> OutreachResult<u64> {
        info!("启动恢复: 检查遗留的IN_FLIGHT事件");
        self.release_stuck_claims(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::store_fixture;
    use outreach_domain::entities::{MessageSlot, SendEvent, SendEventStatus};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_release_stuck_claims_after_timeout() {
        let store = store_fixture();
        let now = Utc::now();
        store
            .insert(&[SendEvent::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                MessageSlot::ConnectionRequest,
                now - Duration::minutes(30),
                "你好".to_string(),
            )])
            .await
            .unwrap();
        let claimed = store.claim_due(now, 10, "dead-worker").await.unwrap();
        assert_eq!(claimed.len(), 1);

        let recovery = QueueRecovery::new(
            Arc::new(store.clone()),
            RecoveryConfig {
                stuck_claim_timeout_minutes: 15,
            },
        );

        // 未超时: 不回收
        let released = recovery.release_stuck_claims(now).await.unwrap();
        assert_eq!(released, 0);

        // 模拟16分钟后
        let released = recovery
            .release_stuck_claims(now + Duration::minutes(16))
            .await
            .unwrap();
        assert_eq!(released, 1);

        let event = store.find_by_id(claimed[0].id).await.unwrap().unwrap();
        assert_eq!(event.status, SendEventStatus::Pending);
        assert!(event.claimed_by.is_none());
    }
}
