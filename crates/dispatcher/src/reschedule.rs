//! 重排服务: 把活动下已排定的PENDING事件整体平移到新的起点。
//!
//! 重排保留事件之间的相对偏移, 并复用落位引擎重新校验窗口、
//! 间隔与单日上限, 因此对同样的输入总是产生同样的结果。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use outreach_core::{OutreachError, OutreachResult};
use outreach_domain::{
    calendar::SendWindow,
    repositories::{AccountRepository, CampaignRepository, SendQueueRepository},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::placement::PlacementEngine;

/// 重排参数
#[derive(Debug, Clone, Default)]
pub struct RescheduleParams {
    /// 新起点不早于该时刻; 缺省取当前时间
    pub not_before: Option<DateTime<Utc>>,
}

pub struct RescheduleService {
    campaign_repo: Arc<dyn CampaignRepository>,
    account_repo: Arc<dyn AccountRepository>,
    queue_repo: Arc<dyn SendQueueRepository>,
}

impl RescheduleService {
    pub fn new(
        campaign_repo: Arc<dyn CampaignRepository>,
        account_repo: Arc<dyn AccountRepository>,
        queue_repo: Arc<dyn SendQueueRepository>,
    ) -> Self {
        Self {
            campaign_repo,
            account_repo,
            queue_repo,
        }
    }

    /// 重排活动的全部PENDING事件, 返回实际移动的条数
    ///
    /// 已发送/失败/取消的历史不动; IN_FLIGHT的认领也不打断。
    pub async fn reschedule_campaign(
        &self,
        campaign_id: Uuid,
        params: RescheduleParams,
        now: DateTime<Utc>,
    ) -> OutreachResult<u64> {
        let campaign = self
            .campaign_repo
            .find_by_id(campaign_id)
            .await?
            .ok_or(OutreachError::CampaignNotFound { id: campaign_id })?;

        let pending = self.queue_repo.find_pending_for_campaign(campaign_id).await?;
        if pending.is_empty() {
            debug!("活动 {campaign_id} 没有PENDING事件, 无需重排");
            return Ok(0);
        }

        let window = SendWindow::from_settings(&campaign.settings)?;
        let earliest = pending[0].scheduled_for;

        // 新起点: 请求的下限与当前时间取大, 再对齐到可发送窗口;
        // 原最早事件尚在未来时保持原位, 只校验不平移
        let base = params.not_before.map_or(now, |t| t.max(now));
        let anchor = window.next_allowed(base)?.max(earliest);

        let today = window.local_date(now);
        let mut engine = PlacementEngine::new(
            window,
            campaign.settings.spacing_minutes,
            campaign.settings.daily_cap,
        );
        let sent_today = self
            .account_repo
            .sent_count_on(campaign.account_id, today)
            .await?;
        engine.seed(today, sent_today, None);

        // 同账号其他活动已排定的事件同样占用单日额度;
        // 本活动自己的PENDING正在重排, 不预置
        for event in self
            .queue_repo
            .find_pending_for_account(campaign.account_id)
            .await?
        {
            if event.campaign_id == campaign_id {
                continue;
            }
            let day = engine.window().local_date(event.scheduled_for);
            engine.seed(day, 0, Some(event.scheduled_for));
            engine.seed_count(day, 1);
        }

        let spacing = Duration::minutes(campaign.settings.spacing_minutes as i64);
        let mut prospect_last: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        let mut moved = 0u64;

        for event in &pending {
            // 平移保留相对偏移, 再钳制在同客户前一档位之后
            let candidate = anchor + (event.scheduled_for - earliest);
            let not_before = match prospect_last.get(&event.prospect_id) {
                Some(prev) => candidate.max(*prev + spacing),
                None => candidate,
            };
            let placed = engine.place(not_before)?;
            prospect_last.insert(event.prospect_id, placed);

            if placed != event.scheduled_for && self.queue_repo.reschedule(event.id, placed).await? {
                moved += 1;
            }
        }

        info!(
            "活动 {} 重排完成: {}条PENDING, 移动{}条, 新起点 {}",
            campaign_id,
            pending.len(),
            moved,
            anchor
        );
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{campaign_fixture, prospect_fixture, store_fixture};
    use chrono::TimeZone;
    use outreach_domain::entities::{MessageSlot, SendEvent};
    use outreach_domain::repositories::{CampaignRepository, SendQueueRepository};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    async fn service_with_chain() -> (
        RescheduleService,
        outreach_infrastructure::InMemoryStore,
        Uuid,
        Vec<i64>,
    ) {
        let store = store_fixture();
        let campaign = CampaignRepository::create(&store, &campaign_fixture(vec![3]))
            .await
            .unwrap();
        let prospect = prospect_fixture(campaign.id);

        // 建联1月6日周一9:00, 跟进1月9日周四9:00
        store
            .insert(&[
                SendEvent::new(
                    campaign.id,
                    prospect.id,
                    campaign.account_id,
                    MessageSlot::ConnectionRequest,
                    utc(2025, 1, 6, 9, 0),
                    "你好 Alice".to_string(),
                ),
                SendEvent::new(
                    campaign.id,
                    prospect.id,
                    campaign.account_id,
                    MessageSlot::FollowUp(1),
                    utc(2025, 1, 9, 9, 0),
                    "跟进1 Alice".to_string(),
                ),
            ])
            .await
            .unwrap();
        let ids: Vec<i64> = store
            .find_pending_for_campaign(campaign.id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        let service = RescheduleService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        (service, store, campaign.id, ids)
    }

    #[tokio::test]
    async fn test_reschedule_shifts_overdue_chain_preserving_offsets() {
        let (service, store, campaign_id, ids) = service_with_chain().await;

        // 1月7日周二10:00才恢复, 建联已过期一天
        let now = utc(2025, 1, 7, 10, 0);
        let moved = service
            .reschedule_campaign(campaign_id, RescheduleParams::default(), now)
            .await
            .unwrap();
        assert_eq!(moved, 2);

        let cr = SendQueueRepository::find_by_id(&store, ids[0]).await.unwrap().unwrap();
        let fu = SendQueueRepository::find_by_id(&store, ids[1]).await.unwrap().unwrap();
        // 整体平移1天1小时, 相对偏移3天保持不变
        assert_eq!(cr.scheduled_for, utc(2025, 1, 7, 10, 0));
        assert_eq!(fu.scheduled_for, utc(2025, 1, 10, 10, 0));
    }

    #[tokio::test]
    async fn test_reschedule_is_idempotent_for_future_chain() {
        let (service, store, campaign_id, ids) = service_with_chain().await;

        // 整条链仍在未来: 起点保持原位, 什么都不动
        let now = utc(2025, 1, 5, 12, 0);
        let moved = service
            .reschedule_campaign(campaign_id, RescheduleParams::default(), now)
            .await
            .unwrap();
        assert_eq!(moved, 0);

        let cr = SendQueueRepository::find_by_id(&store, ids[0]).await.unwrap().unwrap();
        assert_eq!(cr.scheduled_for, utc(2025, 1, 6, 9, 0));
    }

    #[tokio::test]
    async fn test_reschedule_repeats_produce_identical_times() {
        let (service, store, campaign_id, ids) = service_with_chain().await;

        let now = utc(2025, 1, 7, 10, 0);
        let first = service
            .reschedule_campaign(campaign_id, RescheduleParams::default(), now)
            .await
            .unwrap();
        assert_eq!(first, 2);
        let cr1 = SendQueueRepository::find_by_id(&store, ids[0]).await.unwrap().unwrap();
        let fu1 = SendQueueRepository::find_by_id(&store, ids[1]).await.unwrap().unwrap();

        // 同样的输入再跑一次: 不再移动, 时间逐条一致
        let second = service
            .reschedule_campaign(campaign_id, RescheduleParams::default(), now)
            .await
            .unwrap();
        assert_eq!(second, 0);
        let cr2 = SendQueueRepository::find_by_id(&store, ids[0]).await.unwrap().unwrap();
        let fu2 = SendQueueRepository::find_by_id(&store, ids[1]).await.unwrap().unwrap();
        assert_eq!(cr2.scheduled_for, cr1.scheduled_for);
        assert_eq!(fu2.scheduled_for, fu1.scheduled_for);
    }

    #[tokio::test]
    async fn test_reschedule_not_before_rolls_off_weekend() {
        let (service, store, campaign_id, ids) = service_with_chain().await;

        // 指定的下限落在周六, 新起点顺延到下周一8:00
        let now = utc(2025, 1, 10, 9, 0);
        let params = RescheduleParams {
            not_before: Some(utc(2025, 1, 11, 9, 0)),
        };
        let moved = service
            .reschedule_campaign(campaign_id, params, now)
            .await
            .unwrap();
        assert_eq!(moved, 2);

        let cr = SendQueueRepository::find_by_id(&store, ids[0]).await.unwrap().unwrap();
        let fu = SendQueueRepository::find_by_id(&store, ids[1]).await.unwrap().unwrap();
        assert_eq!(cr.scheduled_for, utc(2025, 1, 13, 8, 0));
        assert_eq!(fu.scheduled_for, utc(2025, 1, 16, 8, 0));
    }

    #[tokio::test]
    async fn test_reschedule_unknown_campaign() {
        let (service, _store, _campaign_id, _ids) = service_with_chain().await;
        let result = service
            .reschedule_campaign(
                Uuid::new_v4(),
                RescheduleParams::default(),
                utc(2025, 1, 6, 9, 0),
            )
            .await;
        assert!(matches!(result, Err(OutreachError::CampaignNotFound { .. })));
    }
}
