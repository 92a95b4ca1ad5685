//! 序列排期: 把活动的消息序列展开成具体的待发送事件。
//!
//! 跟进消息的目标日期以建联请求的落位时刻为锚点加上各自的天数偏移,
//! 并钳制在前一档位之后, 保证同一客户的档位时间严格递增。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use outreach_core::{config::PlannerConfig, OutreachError, OutreachResult};
use outreach_domain::{
    calendar::SendWindow,
    entities::{Campaign, MessageSlot, Prospect, SendEvent},
    repositories::{AccountRepository, CampaignRepository, ProspectRepository, SendQueueRepository},
    template,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::placement::PlacementEngine;

/// 批量入队结果
#[derive(Debug, Clone, Default)]
pub struct EnrollmentReport {
    /// 生成并写入队列的事件数
    pub inserted: usize,
    /// 参与排期的客户数
    pub planned_prospects: usize,
    /// 因缺少身份信息被跳过的客户
    pub skipped: Vec<Uuid>,
    /// 最后一条事件的计划时间
    pub estimated_completion: Option<DateTime<Utc>>,
}

pub struct SequencePlanner {
    campaign_repo: Arc<dyn CampaignRepository>,
    prospect_repo: Arc<dyn ProspectRepository>,
    account_repo: Arc<dyn AccountRepository>,
    queue_repo: Arc<dyn SendQueueRepository>,
    config: PlannerConfig,
}

impl SequencePlanner {
    pub fn new(
        campaign_repo: Arc<dyn CampaignRepository>,
        prospect_repo: Arc<dyn ProspectRepository>,
        account_repo: Arc<dyn AccountRepository>,
        queue_repo: Arc<dyn SendQueueRepository>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            campaign_repo,
            prospect_repo,
            account_repo,
            queue_repo,
            config,
        }
    }

    /// 为单个客户展开完整消息序列(不落库)
    ///
    /// 引擎由调用方提供, 同批次的多个客户共享同一个引擎,
    /// 以便间隔与单日上限跨客户生效。
    pub fn plan(
        &self,
        campaign: &Campaign,
        prospect: &Prospect,
        now: DateTime<Utc>,
        engine: &mut PlacementEngine,
    ) -> OutreachResult<Vec<SendEvent>> {
        if !prospect.has_identity() {
            return Err(OutreachError::ProspectNotPlannable { id: prospect.id });
        }

        let mut events = Vec::new();

        // 档位0: 建联请求。附言模板可为空, 为空时发不带附言的请求。
        let cr_at = engine.place(now)?;
        let cr_message = campaign
            .message_plan
            .connection_template
            .as_deref()
            .map(|t| template::render(t, prospect))
            .unwrap_or_default();
        events.push(SendEvent::new(
            campaign.id,
            prospect.id,
            campaign.account_id,
            MessageSlot::ConnectionRequest,
            cr_at,
            cr_message,
        ));

        let spacing = Duration::minutes(campaign.settings.spacing_minutes as i64);
        let mut prev_at = cr_at;

        for (idx, step) in campaign.message_plan.follow_ups.iter().enumerate() {
            // 空模板档位终止序列
            if step.template.trim().is_empty() {
                debug!(
                    "活动 {} 第{}条跟进模板为空, 序列在此截断",
                    campaign.id,
                    idx + 1
                );
                break;
            }

            let slot = MessageSlot::FollowUp(idx as u8 + 1);

            // 锚定在建联请求日期 + 偏移天数, 取当天首选小时
            let target_day = engine.window().local_date(cr_at)
                + Duration::days(step.delay_days as i64);
            let candidate = engine
                .window()
                .instant_at(target_day, campaign.settings.preferred_send_hour)?;

            // 钳制在前一档位之后, 维持严格递增
            let not_before = candidate.max(prev_at + spacing);
            let placed = engine.place(not_before)?;

            events.push(SendEvent::new(
                campaign.id,
                prospect.id,
                campaign.account_id,
                slot,
                placed,
                template::render(&step.template, prospect),
            ));
            prev_at = placed;
        }

        Ok(events)
    }

    /// 批量入队: 找出活动下可排期的客户, 展开序列并写入队列
    pub async fn enroll_campaign(
        &self,
        campaign_id: Uuid,
        limit: i64,
        now: DateTime<Utc>,
    ) -> OutreachResult<EnrollmentReport> {
        let campaign = self
            .campaign_repo
            .find_by_id(campaign_id)
            .await?
            .ok_or(OutreachError::CampaignNotFound { id: campaign_id })?;

        let failed_before = now - Duration::hours(self.config.failed_cooldown_hours as i64);
        let prospects = self
            .prospect_repo
            .find_enrollable(campaign_id, failed_before, limit)
            .await?;

        if prospects.is_empty() {
            debug!("活动 {campaign_id} 没有可排期的客户");
            return Ok(EnrollmentReport::default());
        }

        let mut engine = self.build_engine(&campaign, now).await?;

        let mut all_events = Vec::new();
        let mut report = EnrollmentReport::default();

        for prospect in &prospects {
            match self.plan(&campaign, prospect, now, &mut engine) {
                Ok(events) => {
                    report.planned_prospects += 1;
                    all_events.extend(events);
                }
                Err(OutreachError::ProspectNotPlannable { id }) => {
                    warn!("客户 {id} 缺少身份信息, 跳过排期");
                    report.skipped.push(id);
                }
                Err(e) => return Err(e),
            }
        }

        report.estimated_completion = all_events.iter().map(|e| e.scheduled_for).max();
        report.inserted = self.queue_repo.insert(&all_events).await?;

        info!(
            "活动 {} 入队完成: {}个客户, {}条事件, 跳过{}个",
            campaign_id,
            report.planned_prospects,
            report.inserted,
            report.skipped.len()
        );
        Ok(report)
    }

    /// 构建落位引擎并预置已占用的额度:
    /// 账号当日已发送计数 + 该账号下全部活动已排定的PENDING事件。
    /// 上限是账号级的, 共用账号的活动不能各占一份额度。
    pub async fn build_engine(
        &self,
        campaign: &Campaign,
        now: DateTime<Utc>,
    ) -> OutreachResult<PlacementEngine> {
        let window = SendWindow::from_settings(&campaign.settings)?;
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

        for event in self
            .queue_repo
            .find_pending_for_account(campaign.account_id)
            .await?
        {
            let day = engine.window().local_date(event.scheduled_for);
            engine.seed(day, 0, Some(event.scheduled_for));
            // seed只抬高last, 计数需要单独累加
            engine.seed_count(day, 1);
        }

        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{campaign_fixture, prospect_fixture, store_fixture};
    use chrono::TimeZone;
    use outreach_domain::entities::SendEventStatus;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn planner_with_store() -> (SequencePlanner, outreach_infrastructure::InMemoryStore) {
        let store = store_fixture();
        let planner = SequencePlanner::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            PlannerConfig {
                follow_up_delay_days: vec![3, 8, 13, 18, 23],
                default_spacing_minutes: 30,
                default_daily_cap: 25,
                default_send_start_hour: 8,
                default_send_end_hour: 18,
                skip_weekends: true,
                failed_cooldown_hours: 24,
            },
        );
        (planner, store)
    }

    #[tokio::test]
    async fn test_plan_january_2025_scenario() {
        // 活动: 建联 + 延迟[3, 8, 13]天的三条跟进, 周一到周五 8-18点
        let (planner, _store) = planner_with_store();
        let campaign = campaign_fixture(vec![3, 8, 13]);
        let prospect = prospect_fixture(campaign.id);

        // 2025-01-06 周一 09:00 UTC 入队
        let now = utc(2025, 1, 6, 9, 0);
        let mut engine = planner.build_engine(&campaign, now).await.unwrap();
        let events = planner.plan(&campaign, &prospect, now, &mut engine).unwrap();

        assert_eq!(events.len(), 4);
        // 建联请求当即可发
        assert_eq!(events[0].scheduled_for, utc(2025, 1, 6, 9, 0));
        // +3天 -> 1月9日周四
        assert_eq!(events[1].scheduled_for, utc(2025, 1, 9, 9, 0));
        // +8天 -> 1月14日周二
        assert_eq!(events[2].scheduled_for, utc(2025, 1, 14, 9, 0));
        // +13天 -> 1月19日周日, 顺延到1月20日周一
        assert_eq!(events[3].scheduled_for, utc(2025, 1, 20, 8, 0));

        // 档位时间严格递增
        for pair in events.windows(2) {
            assert!(pair[0].scheduled_for < pair[1].scheduled_for);
            assert!(pair[0].slot < pair[1].slot);
        }
    }

    #[tokio::test]
    async fn test_plan_empty_template_truncates_chain() {
        let (planner, _store) = planner_with_store();
        let mut campaign = campaign_fixture(vec![3, 8, 13]);
        campaign.message_plan.follow_ups[1].template = "   ".to_string();
        let prospect = prospect_fixture(campaign.id);

        let now = utc(2025, 1, 6, 9, 0);
        let mut engine = planner.build_engine(&campaign, now).await.unwrap();
        let events = planner.plan(&campaign, &prospect, now, &mut engine).unwrap();

        // 建联 + 第一条跟进, 空模板处截断
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].slot, MessageSlot::FollowUp(1));
    }

    #[tokio::test]
    async fn test_plan_rejects_prospect_without_identity() {
        let (planner, _store) = planner_with_store();
        let campaign = campaign_fixture(vec![3]);
        let mut prospect = prospect_fixture(campaign.id);
        prospect.external_profile_id = None;
        prospect.profile_url = None;

        let now = utc(2025, 1, 6, 9, 0);
        let mut engine = planner.build_engine(&campaign, now).await.unwrap();
        let result = planner.plan(&campaign, &prospect, now, &mut engine);
        assert!(matches!(
            result,
            Err(OutreachError::ProspectNotPlannable { .. })
        ));
    }

    #[tokio::test]
    async fn test_plan_batch_daily_cap_two_of_five() {
        // 上限2/天: 5个客户的建联请求分摊到连续3个可发送日
        let (planner, store) = planner_with_store();
        let mut campaign = campaign_fixture(vec![]);
        campaign.settings.daily_cap = 2;
        use outreach_domain::repositories::CampaignRepository;
        let campaign = CampaignRepository::create(&store, &campaign).await.unwrap();

        use outreach_domain::repositories::ProspectRepository;
        for _ in 0..5 {
            ProspectRepository::create(&store, &prospect_fixture(campaign.id))
                .await
                .unwrap();
        }

        let now = utc(2025, 1, 6, 9, 0);
        let report = planner.enroll_campaign(campaign.id, 100, now).await.unwrap();
        assert_eq!(report.inserted, 5);

        use outreach_domain::repositories::SendQueueRepository;
        let pending = store.find_pending_for_campaign(campaign.id).await.unwrap();
        let days: Vec<_> = pending
            .iter()
            .map(|e| e.scheduled_for.date_naive())
            .collect();
        // 1月6/6/7/7/8
        assert_eq!(days[0], days[1]);
        assert_eq!(days[2], days[3]);
        assert!(days[1] < days[2]);
        assert!(days[3] < days[4]);
        assert!(pending.iter().all(|e| e.status == SendEventStatus::Pending));
    }

    #[tokio::test]
    async fn test_enroll_shared_account_respects_daily_cap() {
        // 两个活动共用同一个发送账号, 上限2/天:
        // 第二个活动排期时必须看见第一个已占掉的当日额度
        let (planner, store) = planner_with_store();
        let account_id = Uuid::new_v4();

        use outreach_domain::repositories::{CampaignRepository, ProspectRepository};
        let mut campaigns = Vec::new();
        for _ in 0..2 {
            let mut campaign = campaign_fixture(vec![]);
            campaign.account_id = account_id;
            campaign.settings.daily_cap = 2;
            let campaign = CampaignRepository::create(&store, &campaign).await.unwrap();
            for _ in 0..2 {
                ProspectRepository::create(&store, &prospect_fixture(campaign.id))
                    .await
                    .unwrap();
            }
            campaigns.push(campaign);
        }

        let now = utc(2025, 1, 6, 9, 0);
        for campaign in &campaigns {
            let report = planner.enroll_campaign(campaign.id, 100, now).await.unwrap();
            assert_eq!(report.inserted, 2);
        }

        use outreach_domain::repositories::SendQueueRepository;
        let pending = store.find_pending_for_account(account_id).await.unwrap();
        assert_eq!(pending.len(), 4);

        // 账号全量逐日统计, 任何一天不超过2条
        let mut per_day: std::collections::HashMap<chrono::NaiveDate, u32> =
            std::collections::HashMap::new();
        for event in &pending {
            *per_day.entry(event.scheduled_for.date_naive()).or_default() += 1;
        }
        assert!(per_day.values().all(|&n| n <= 2));

        // 第一个活动占满1月6日, 第二个活动顺延到1月7日
        assert_eq!(pending[0].scheduled_for, utc(2025, 1, 6, 9, 0));
        assert_eq!(pending[1].scheduled_for, utc(2025, 1, 6, 9, 30));
        assert_eq!(pending[2].scheduled_for, utc(2025, 1, 7, 8, 0));
        assert_eq!(pending[3].scheduled_for, utc(2025, 1, 7, 8, 30));
    }

    #[tokio::test]
    async fn test_enroll_is_idempotent() {
        let (planner, store) = planner_with_store();
        let campaign = campaign_fixture(vec![3]);
        use outreach_domain::repositories::{CampaignRepository, ProspectRepository};
        let campaign = CampaignRepository::create(&store, &campaign).await.unwrap();
        ProspectRepository::create(&store, &prospect_fixture(campaign.id))
            .await
            .unwrap();

        let now = utc(2025, 1, 6, 9, 0);
        let first = planner.enroll_campaign(campaign.id, 100, now).await.unwrap();
        assert_eq!(first.inserted, 2);

        // 再次入队: 同(客户, 档位)已有活动事件, 全部跳过
        let second = planner.enroll_campaign(campaign.id, 100, now).await.unwrap();
        assert_eq!(second.inserted, 0);
    }

    #[tokio::test]
    async fn test_enroll_reports_estimated_completion() {
        let (planner, store) = planner_with_store();
        let campaign = campaign_fixture(vec![3, 8]);
        use outreach_domain::repositories::{CampaignRepository, ProspectRepository};
        let campaign = CampaignRepository::create(&store, &campaign).await.unwrap();
        ProspectRepository::create(&store, &prospect_fixture(campaign.id))
            .await
            .unwrap();

        let now = utc(2025, 1, 6, 9, 0);
        let report = planner.enroll_campaign(campaign.id, 100, now).await.unwrap();
        assert_eq!(report.estimated_completion, Some(utc(2025, 1, 14, 9, 0)));
    }
}
