//! 内存存储实现: 零配置模式与测试使用, 进程退出后数据丢失。
//!
//! 全部仓储共享同一把锁, 认领等复合操作在锁内完成, 语义与
//! Postgres实现的原子更新一致。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use outreach_core::{OutreachError, OutreachResult};
use outreach_domain::{
    entities::{
        Campaign, CampaignStatus, MessageSlot, MessagingAccount, Prospect, ProspectStatus,
        SendEvent, SendEventStatus,
    },
    repositories::{
        AccountRepository, CampaignRepository, ProspectRepository, QueueCounts,
        SendQueueRepository,
    },
};
use uuid::Uuid;

#[derive(Default)]
struct State {
    campaigns: HashMap<Uuid, Campaign>,
    prospects: HashMap<Uuid, Prospect>,
    accounts: HashMap<Uuid, MessagingAccount>,
    events: HashMap<i64, SendEvent>,
    next_event_id: i64,
    daily_counters: HashMap<(Uuid, NaiveDate), u32>,
}

/// 内存存储, 克隆共享同一份数据
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> OutreachResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| OutreachError::Internal("内存存储锁中毒".to_string()))
    }

    fn has_active_slot(state: &State, prospect_id: Uuid, slot: MessageSlot) -> bool {
        state.events.values().any(|e| {
            e.prospect_id == prospect_id
                && e.slot == slot
                && matches!(
                    e.status,
                    SendEventStatus::Pending | SendEventStatus::InFlight
                )
        })
    }
}

#[async_trait]
impl CampaignRepository for InMemoryStore {
    async fn create(&self, campaign: &Campaign) -> OutreachResult<Campaign> {
        let mut state = self.lock()?;
        state.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> OutreachResult<Option<Campaign>> {
        Ok(self.lock()?.campaigns.get(&id).cloned())
    }

    async fn find_active(&self) -> OutreachResult<Vec<Campaign>> {
        let state = self.lock()?;
        let mut campaigns: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|c| c.status == CampaignStatus::Active)
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.created_at);
        Ok(campaigns)
    }

    async fn update(&self, campaign: &Campaign) -> OutreachResult<Campaign> {
        let mut state = self.lock()?;
        if !state.campaigns.contains_key(&campaign.id) {
            return Err(OutreachError::CampaignNotFound { id: campaign.id });
        }
        let mut updated = campaign.clone();
        updated.updated_at = Utc::now();
        state.campaigns.insert(campaign.id, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl ProspectRepository for InMemoryStore {
    async fn create(&self, prospect: &Prospect) -> OutreachResult<Prospect> {
        let mut state = self.lock()?;
        state.prospects.insert(prospect.id, prospect.clone());
        Ok(prospect.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> OutreachResult<Option<Prospect>> {
        Ok(self.lock()?.prospects.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ProspectStatus,
        last_action_at: Option<DateTime<Utc>>,
    ) -> OutreachResult<bool> {
        let mut state = self.lock()?;
        match state.prospects.get_mut(&id) {
            Some(prospect) => {
                prospect.status = status;
                if last_action_at.is_some() {
                    prospect.last_action_at = last_action_at;
                }
                prospect.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_enrollable(
        &self,
        campaign_id: Uuid,
        failed_before: DateTime<Utc>,
        limit: i64,
    ) -> OutreachResult<Vec<Prospect>> {
        let state = self.lock()?;
        let mut prospects: Vec<Prospect> = state
            .prospects
            .values()
            .filter(|p| {
                p.campaign_id == campaign_id
                    && match p.status {
                        ProspectStatus::Pending
                        | ProspectStatus::Approved
                        | ProspectStatus::ReadyToMessage => true,
                        ProspectStatus::Failed => p.updated_at < failed_before,
                        _ => false,
                    }
            })
            .cloned()
            .collect();
        prospects.sort_by_key(|p| p.created_at);
        prospects.truncate(limit as usize);
        Ok(prospects)
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn create(&self, account: &MessagingAccount) -> OutreachResult<MessagingAccount> {
        let mut state = self.lock()?;
        state.accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> OutreachResult<Option<MessagingAccount>> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    async fn increment_daily_count(
        &self,
        account_id: Uuid,
        day: NaiveDate,
    ) -> OutreachResult<u32> {
        let mut state = self.lock()?;
        let count = state.daily_counters.entry((account_id, day)).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn sent_count_on(&self, account_id: Uuid, day: NaiveDate) -> OutreachResult<u32> {
        Ok(self
            .lock()?
            .daily_counters
            .get(&(account_id, day))
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl SendQueueRepository for InMemoryStore {
    async fn insert(&self, events: &[SendEvent]) -> OutreachResult<usize> {
        let mut state = self.lock()?;
        let mut inserted = 0usize;
        for event in events {
            if Self::has_active_slot(&state, event.prospect_id, event.slot) {
                continue;
            }
            state.next_event_id += 1;
            let mut stored = event.clone();
            stored.id = state.next_event_id;
            stored.status = SendEventStatus::Pending;
            state.events.insert(stored.id, stored);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn claim_due(
        &self,
        before: DateTime<Utc>,
        limit: i64,
        claimer: &str,
    ) -> OutreachResult<Vec<SendEvent>> {
        let mut state = self.lock()?;
        let now = Utc::now();

        let mut due_ids: Vec<(DateTime<Utc>, i64)> = state
            .events
            .values()
            .filter(|e| e.status == SendEventStatus::Pending && e.scheduled_for <= before)
            .map(|e| (e.scheduled_for, e.id))
            .collect();
        due_ids.sort();
        due_ids.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due_ids.len());
        for (_, id) in due_ids {
            if let Some(event) = state.events.get_mut(&id) {
                event.status = SendEventStatus::InFlight;
                event.claimed_by = Some(claimer.to_string());
                event.claimed_at = Some(now);
                event.updated_at = now;
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_sent(
        &self,
        id: i64,
        provider_message_id: Option<&str>,
        sent_at: DateTime<Utc>,
    ) -> OutreachResult<bool> {
        let mut state = self.lock()?;
        match state.events.get_mut(&id) {
            Some(event) if !event.is_terminal() => {
                event.status = SendEventStatus::Sent;
                if let Some(pmid) = provider_message_id {
                    event.provider_message_id = Some(pmid.to_string());
                }
                event.sent_at = Some(sent_at);
                event.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(
        &self,
        id: i64,
        error_code: &str,
        error_detail: Option<&str>,
    ) -> OutreachResult<bool> {
        let mut state = self.lock()?;
        match state.events.get_mut(&id) {
            Some(event) if !event.is_terminal() => {
                event.status = SendEventStatus::Failed;
                event.error_code = Some(error_code.to_string());
                event.error_detail = error_detail.map(str::to_string);
                event.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel(&self, id: i64, reason: &str) -> OutreachResult<bool> {
        let mut state = self.lock()?;
        match state.events.get_mut(&id) {
            Some(event) if !event.is_terminal() => {
                event.status = SendEventStatus::Cancelled;
                event.error_code = Some("CANCELLED".to_string());
                event.error_detail = Some(reason.to_string());
                event.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reschedule(&self, id: i64, new_time: DateTime<Utc>) -> OutreachResult<bool> {
        let mut state = self.lock()?;
        match state.events.get_mut(&id) {
            Some(event) if event.status == SendEventStatus::Pending => {
                event.scheduled_for = new_time;
                event.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_pending_for_prospect(
        &self,
        prospect_id: Uuid,
        after_slot: MessageSlot,
        reason: &str,
    ) -> OutreachResult<u64> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut cancelled = 0u64;
        for event in state.events.values_mut() {
            if event.prospect_id == prospect_id
                && event.status == SendEventStatus::Pending
                && event.slot > after_slot
            {
                event.status = SendEventStatus::Cancelled;
                event.error_code = Some("CANCELLED".to_string());
                event.error_detail = Some(reason.to_string());
                event.updated_at = now;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn release_stuck(&self, older_than: DateTime<Utc>) -> OutreachResult<u64> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut released = 0u64;
        for event in state.events.values_mut() {
            if event.status == SendEventStatus::InFlight
                && event.claimed_at.is_some_and(|t| t < older_than)
            {
                event.status = SendEventStatus::Pending;
                event.claimed_by = None;
                event.claimed_at = None;
                event.updated_at = now;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn find_by_id(&self, id: i64) -> OutreachResult<Option<SendEvent>> {
        Ok(self.lock()?.events.get(&id).cloned())
    }

    async fn find_pending_for_campaign(
        &self,
        campaign_id: Uuid,
    ) -> OutreachResult<Vec<SendEvent>> {
        let state = self.lock()?;
        let mut events: Vec<SendEvent> = state
            .events
            .values()
            .filter(|e| e.campaign_id == campaign_id && e.status == SendEventStatus::Pending)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.scheduled_for, e.id));
        Ok(events)
    }

    async fn find_pending_for_account(
        &self,
        account_id: Uuid,
    ) -> OutreachResult<Vec<SendEvent>> {
        let state = self.lock()?;
        let mut events: Vec<SendEvent> = state
            .events
            .values()
            .filter(|e| e.account_id == account_id && e.status == SendEventStatus::Pending)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.scheduled_for, e.id));
        Ok(events)
    }

    async fn counts(&self, now: DateTime<Utc>) -> OutreachResult<QueueCounts> {
        let state = self.lock()?;
        let mut counts = QueueCounts::default();
        for event in state.events.values() {
            match event.status {
                SendEventStatus::Pending => {
                    counts.pending += 1;
                    if event.scheduled_for <= now {
                        counts.due += 1;
                    }
                }
                SendEventStatus::InFlight => counts.in_flight += 1,
                SendEventStatus::Sent => counts.sent += 1,
                SendEventStatus::Failed => counts.failed += 1,
                SendEventStatus::Cancelled => counts.cancelled += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(prospect_id: Uuid, slot: MessageSlot, at: DateTime<Utc>) -> SendEvent {
        SendEvent::new(
            Uuid::new_v4(),
            prospect_id,
            Uuid::new_v4(),
            slot,
            at,
            "你好".to_string(),
        )
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_slot() {
        let store = InMemoryStore::new();
        let prospect_id = Uuid::new_v4();
        let now = Utc::now();

        let first = store
            .insert(&[event(prospect_id, MessageSlot::ConnectionRequest, now)])
            .await
            .unwrap();
        assert_eq!(first, 1);

        // 同档位重复入队被跳过
        let second = store
            .insert(&[event(prospect_id, MessageSlot::ConnectionRequest, now)])
            .await
            .unwrap();
        assert_eq!(second, 0);

        // 不同档位不受影响
        let third = store
            .insert(&[event(prospect_id, MessageSlot::FollowUp(1), now)])
            .await
            .unwrap();
        assert_eq!(third, 1);
    }

    #[tokio::test]
    async fn test_claim_due_only_claims_due_pending() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let p = Uuid::new_v4();

        store
            .insert(&[
                event(p, MessageSlot::ConnectionRequest, now - Duration::minutes(5)),
                event(p, MessageSlot::FollowUp(1), now + Duration::days(3)),
            ])
            .await
            .unwrap();

        let claimed = store.claim_due(now, 10, "worker-a").await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].slot, MessageSlot::ConnectionRequest);
        assert_eq!(claimed[0].status, SendEventStatus::InFlight);
        assert_eq!(claimed[0].claimed_by.as_deref(), Some("worker-a"));

        // 已被认领的事件不会被再次认领
        let again = store.claim_due(now, 10, "worker-b").await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_mark_sent_is_idempotent() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .insert(&[event(Uuid::new_v4(), MessageSlot::ConnectionRequest, now)])
            .await
            .unwrap();
        let claimed = store.claim_due(now, 1, "w").await.unwrap();
        let id = claimed[0].id;

        assert!(store.mark_sent(id, Some("msg-1"), now).await.unwrap());
        // 第二次是无操作
        assert!(!store.mark_sent(id, Some("msg-2"), now).await.unwrap());

        let stored = SendQueueRepository::find_by_id(&store, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.provider_message_id.as_deref(), Some("msg-1"));
        assert_eq!(stored.status, SendEventStatus::Sent);
    }

    #[tokio::test]
    async fn test_release_stuck_returns_events_to_pending() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .insert(&[event(Uuid::new_v4(), MessageSlot::ConnectionRequest, now)])
            .await
            .unwrap();
        let claimed = store.claim_due(now, 1, "w").await.unwrap();
        assert_eq!(claimed.len(), 1);

        // 认领时间在超时线之后: 不释放
        let released = store
            .release_stuck(now - Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(released, 0);

        // 超时线在未来: 释放
        let released = store
            .release_stuck(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(released, 1);

        let again = store.claim_due(now, 1, "w2").await.unwrap();
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_pending_after_slot() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let p = Uuid::new_v4();
        store
            .insert(&[
                event(p, MessageSlot::ConnectionRequest, now),
                event(p, MessageSlot::FollowUp(1), now + Duration::days(3)),
                event(p, MessageSlot::FollowUp(2), now + Duration::days(8)),
            ])
            .await
            .unwrap();

        let cancelled = store
            .cancel_pending_for_prospect(p, MessageSlot::ConnectionRequest, "客户已回复")
            .await
            .unwrap();
        assert_eq!(cancelled, 2);

        let counts = store.counts(now).await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.cancelled, 2);
    }

    #[tokio::test]
    async fn test_daily_counter_increments() {
        let store = InMemoryStore::new();
        let account = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();

        assert_eq!(store.sent_count_on(account, day).await.unwrap(), 0);
        assert_eq!(store.increment_daily_count(account, day).await.unwrap(), 1);
        assert_eq!(store.increment_daily_count(account, day).await.unwrap(), 2);
        assert_eq!(store.sent_count_on(account, day).await.unwrap(), 2);
    }
}
