//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口, 遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use outreach_core::OutreachResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{
    Campaign, MessageSlot, MessagingAccount, Prospect, ProspectStatus, SendEvent,
};

/// 队列状态统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueCounts {
    /// 已到期待发送
    pub due: u64,
    pub pending: u64,
    pub in_flight: u64,
    pub sent: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// 活动仓储抽象
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, campaign: &Campaign) -> OutreachResult<Campaign>;
    async fn find_by_id(&self, id: Uuid) -> OutreachResult<Option<Campaign>>;
    async fn find_active(&self) -> OutreachResult<Vec<Campaign>>;
    async fn update(&self, campaign: &Campaign) -> OutreachResult<Campaign>;
}

/// 潜在客户仓储抽象
#[async_trait]
pub trait ProspectRepository: Send + Sync {
    async fn create(&self, prospect: &Prospect) -> OutreachResult<Prospect>;
    async fn find_by_id(&self, id: Uuid) -> OutreachResult<Option<Prospect>>;
    /// 更新生命周期状态, 同时记录最近动作时间
    async fn update_status(
        &self,
        id: Uuid,
        status: ProspectStatus,
        last_action_at: Option<DateTime<Utc>>,
    ) -> OutreachResult<bool>;
    /// 活动下可入队的客户: 非终态, 或失败已超过冷却期的
    async fn find_enrollable(
        &self,
        campaign_id: Uuid,
        failed_before: DateTime<Utc>,
        limit: i64,
    ) -> OutreachResult<Vec<Prospect>>;
}

/// 发送账号仓储抽象
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create(&self, account: &MessagingAccount) -> OutreachResult<MessagingAccount>;
    async fn find_by_id(&self, id: Uuid) -> OutreachResult<Option<MessagingAccount>>;
    /// 原子递增账号在某本地日期的已发送计数, 返回递增后的值
    async fn increment_daily_count(&self, account_id: Uuid, day: NaiveDate)
        -> OutreachResult<u32>;
    async fn sent_count_on(&self, account_id: Uuid, day: NaiveDate) -> OutreachResult<u32>;
}

/// 发送队列仓储抽象
///
/// PENDING/IN_FLIGHT 是活动状态; SENT/FAILED/CANCELLED 是不可变历史。
#[async_trait]
pub trait SendQueueRepository: Send + Sync {
    /// 批量插入待发送事件, 返回实际插入条数
    ///
    /// 幂等: 同一(客户, 档位)已存在活动状态的事件时该条被跳过。
    async fn insert(&self, events: &[SendEvent]) -> OutreachResult<usize>;

    /// 认领到期事件: 原子地将至多`limit`条最早到期的PENDING事件
    /// 置为IN_FLIGHT并返回。并发调用互不重叠。
    async fn claim_due(
        &self,
        before: DateTime<Utc>,
        limit: i64,
        claimer: &str,
    ) -> OutreachResult<Vec<SendEvent>>;

    /// 标记发送成功。事件已处于终态时不做任何修改并返回false。
    async fn mark_sent(
        &self,
        id: i64,
        provider_message_id: Option<&str>,
        sent_at: DateTime<Utc>,
    ) -> OutreachResult<bool>;

    /// 标记发送失败。事件已处于终态时不做任何修改并返回false。
    async fn mark_failed(
        &self,
        id: i64,
        error_code: &str,
        error_detail: Option<&str>,
    ) -> OutreachResult<bool>;

    /// 取消一条事件(仅对PENDING/IN_FLIGHT生效)
    async fn cancel(&self, id: i64, reason: &str) -> OutreachResult<bool>;

    /// 调整一条PENDING事件的计划时间
    async fn reschedule(&self, id: i64, new_time: DateTime<Utc>) -> OutreachResult<bool>;

    /// 取消某客户指定档位之后的全部PENDING事件, 返回取消条数
    async fn cancel_pending_for_prospect(
        &self,
        prospect_id: Uuid,
        after_slot: MessageSlot,
        reason: &str,
    ) -> OutreachResult<u64>;

    /// 释放僵死的IN_FLIGHT事件(认领时间早于`older_than`)回PENDING,
    /// 返回释放条数
    async fn release_stuck(&self, older_than: DateTime<Utc>) -> OutreachResult<u64>;

    async fn find_by_id(&self, id: i64) -> OutreachResult<Option<SendEvent>>;

    /// 活动下全部PENDING事件, 按计划时间升序
    async fn find_pending_for_campaign(&self, campaign_id: Uuid)
        -> OutreachResult<Vec<SendEvent>>;

    /// 账号下全部PENDING事件(跨活动), 按计划时间升序
    ///
    /// 单日上限是账号级的: 排期前用它预置同账号全部活动已占用的额度。
    async fn find_pending_for_account(&self, account_id: Uuid)
        -> OutreachResult<Vec<SendEvent>>;

    async fn counts(&self, now: DateTime<Utc>) -> OutreachResult<QueueCounts>;
}
