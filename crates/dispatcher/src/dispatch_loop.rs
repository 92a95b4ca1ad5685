//! 调度循环: 周期性认领到期事件并逐条投递。
//!
//! 认领-完成两段式: 事件先被原子地置为IN_FLIGHT(带认领者与认领时间),
//! 投递结束后进入SENT/FAILED终态。进程崩溃留下的IN_FLIGHT由可见性
//! 超时回收。单条事件的失败不会中断本轮其余事件。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use outreach_core::{config::DispatcherConfig, OutreachError, OutreachResult};
use outreach_domain::{
    entities::{Campaign, MessageSlot, SendEvent},
    ports::{DeliveryGateway, GatewayError},
    repositories::{AccountRepository, CampaignRepository, ProspectRepository, SendQueueRepository},
    SendWindow,
};
use outreach_infrastructure::MetricsCollector;
use rand::Rng;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::recovery::{QueueRecovery, RecoveryConfig};

/// 单轮调度结果
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub released: u64,
    pub claimed: usize,
    pub sent: usize,
    /// 已带服务商消息ID, 仅补记状态未实际发送
    pub marked_only: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub cancelled: u64,
}

enum EventOutcome {
    Sent,
    MarkedOnly,
    Duplicate,
    Failed { chain_cancelled: u64 },
    Cancelled,
}

pub struct DispatchLoop {
    campaign_repo: Arc<dyn CampaignRepository>,
    prospect_repo: Arc<dyn ProspectRepository>,
    account_repo: Arc<dyn AccountRepository>,
    queue_repo: Arc<dyn SendQueueRepository>,
    gateway: Arc<dyn DeliveryGateway>,
    recovery: QueueRecovery,
    metrics: Arc<MetricsCollector>,
    config: DispatcherConfig,
    claimer: String,
}

impl DispatchLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        campaign_repo: Arc<dyn CampaignRepository>,
        prospect_repo: Arc<dyn ProspectRepository>,
        account_repo: Arc<dyn AccountRepository>,
        queue_repo: Arc<dyn SendQueueRepository>,
        gateway: Arc<dyn DeliveryGateway>,
        metrics: Arc<MetricsCollector>,
        config: DispatcherConfig,
        claimer: String,
    ) -> Self {
        let recovery = QueueRecovery::new(
            queue_repo.clone(),
            RecoveryConfig {
                stuck_claim_timeout_minutes: config.stuck_claim_timeout_minutes,
            },
        );
        Self {
            campaign_repo,
            prospect_repo,
            account_repo,
            queue_repo,
            gateway,
            recovery,
            metrics,
            config,
            claimer,
        }
    }

    /// 主循环: 固定间隔轮询, 收到停机信号后退出
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "调度循环启动: 认领者={}, 轮询间隔={}秒, 单轮上限={}",
            self.claimer, self.config.poll_interval_seconds, self.config.batch_size
        );

        if let Err(e) = self.recovery.recover_on_startup().await {
            error!("启动恢复失败: {e}");
        }

        let mut interval =
            tokio::time::interval(StdDuration::from_secs(self.config.poll_interval_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_cycle(Utc::now(), Some(&mut shutdown_rx)).await {
                        Ok(report) => {
                            if report.claimed > 0 {
                                info!(
                                    "本轮调度完成: 认领{}, 发送{}, 补记{}, 重复{}, 失败{}, 取消{}",
                                    report.claimed, report.sent, report.marked_only,
                                    report.duplicates, report.failed, report.cancelled
                                );
                            }
                        }
                        Err(e) => error!("调度循环出错: {e}"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("调度循环收到停机信号, 退出");
                    break;
                }
            }
        }
    }

    /// 执行一轮调度
    ///
    /// `shutdown`为Some时, 账号间隔等待可被停机信号打断;
    /// 打断后完成当前事件即停止, 剩余认领交由可见性超时回收。
    pub async fn run_cycle(
        &self,
        now: DateTime<Utc>,
        mut shutdown: Option<&mut broadcast::Receiver<()>>,
    ) -> OutreachResult<CycleReport> {
        let started = std::time::Instant::now();
        let mut report = CycleReport {
            released: self.recovery.release_stuck_claims(now).await?,
            ..Default::default()
        };
        self.metrics.record_released(report.released);

        let events = self
            .queue_repo
            .claim_due(now, self.config.batch_size as i64, &self.claimer)
            .await?;
        report.claimed = events.len();
        debug!("认领到期事件 {} 条", events.len());

        let mut campaign_cache: HashMap<Uuid, Campaign> = HashMap::new();
        let mut last_sent_account: Option<Uuid> = None;

        for event in &events {
            // 同账号两次实际发送之间的强制间隔
            if last_sent_account == Some(event.account_id) {
                if !self.spacing_wait(&mut shutdown).await {
                    warn!(
                        "停机信号打断账号间隔等待, 本轮剩余事件交由下一次回收"
                    );
                    break;
                }
            }

            match self.process_event(event, now, &mut campaign_cache).await {
                Ok(outcome) => match outcome {
                    EventOutcome::Sent => {
                        report.sent += 1;
                        self.metrics.record_sent();
                        last_sent_account = Some(event.account_id);
                    }
                    EventOutcome::MarkedOnly => report.marked_only += 1,
                    EventOutcome::Duplicate => {
                        report.duplicates += 1;
                        self.metrics.record_duplicate();
                        last_sent_account = Some(event.account_id);
                    }
                    EventOutcome::Failed { chain_cancelled } => {
                        report.failed += 1;
                        report.cancelled += chain_cancelled;
                        self.metrics.record_failed();
                        self.metrics.record_cancelled(chain_cancelled);
                    }
                    EventOutcome::Cancelled => {
                        report.cancelled += 1;
                        self.metrics.record_cancelled(1);
                    }
                },
                Err(e) => {
                    // 单条事件的错误不中断本轮
                    error!("处理事件 {} 出错: {e}", event.id);
                    report.failed += 1;
                    self.metrics.record_failed();
                    let _ = self
                        .queue_repo
                        .mark_failed(event.id, "INTERNAL_ERROR", Some(&e.to_string()))
                        .await;
                }
            }
        }

        if let Ok(counts) = self.queue_repo.counts(Utc::now()).await {
            self.metrics.record_queue_depth(&counts);
        }
        self.metrics
            .record_cycle_duration(started.elapsed().as_secs_f64());
        Ok(report)
    }

    async fn process_event(
        &self,
        event: &SendEvent,
        now: DateTime<Utc>,
        campaign_cache: &mut HashMap<Uuid, Campaign>,
    ) -> OutreachResult<EventOutcome> {
        let campaign = match campaign_cache.get(&event.campaign_id) {
            Some(c) => c.clone(),
            None => match self.campaign_repo.find_by_id(event.campaign_id).await? {
                Some(c) => {
                    campaign_cache.insert(c.id, c.clone());
                    c
                }
                None => {
                    self.queue_repo
                        .mark_failed(event.id, "CAMPAIGN_NOT_FOUND", None)
                        .await?;
                    return Ok(EventOutcome::Failed { chain_cancelled: 0 });
                }
            },
        };

        let prospect = match self.prospect_repo.find_by_id(event.prospect_id).await? {
            Some(p) => p,
            None => {
                self.queue_repo
                    .mark_failed(event.id, "PROSPECT_NOT_FOUND", None)
                    .await?;
                return Ok(EventOutcome::Failed { chain_cancelled: 0 });
            }
        };

        // 客户已进入终态(完成/失败/退订): 事件取消而非发送
        if prospect.status.is_terminal() {
            self.queue_repo
                .cancel(event.id, &format!("客户已处于终态 {}", prospect.status.as_str()))
                .await?;
            return Ok(EventOutcome::Cancelled);
        }

        // 已带服务商消息ID: 上次投递已成功但状态未落库, 仅补记
        if event.provider_message_id.is_some() {
            self.queue_repo.mark_sent(event.id, None, now).await?;
            info!("事件 {} 已有服务商消息ID, 补记为已发送", event.id);
            return Ok(EventOutcome::MarkedOnly);
        }

        let account = match self.account_repo.find_by_id(event.account_id).await? {
            Some(a) => a,
            None => {
                self.queue_repo
                    .mark_failed(event.id, "ACCOUNT_NOT_FOUND", None)
                    .await?;
                return Ok(EventOutcome::Failed { chain_cancelled: 0 });
            }
        };
        if !account.is_connected() {
            // 账号掉线不调用网关, 也不自动重试
            self.queue_repo
                .mark_failed(event.id, "ACCOUNT_DISCONNECTED", None)
                .await?;
            return Ok(EventOutcome::Failed { chain_cancelled: 0 });
        }

        // 计数日期按活动窗口折算; 窗口配置非法要在触达网关之前失败
        let window = SendWindow::from_settings(&campaign.settings)?;

        match self
            .gateway
            .send(&account, &prospect, event.slot, &event.message)
            .await
        {
            Ok(receipt) => {
                let marked = self
                    .queue_repo
                    .mark_sent(
                        event.id,
                        receipt.provider_message_id.as_deref(),
                        receipt.sent_at,
                    )
                    .await?;
                if !marked {
                    // 并发下已被其他认领者完成, 不重复推进生命周期
                    debug!("事件 {} 已被并发完成, 跳过后续处理", event.id);
                    return Ok(EventOutcome::MarkedOnly);
                }

                self.advance_prospect(&campaign, &prospect, event.slot, receipt.sent_at)
                    .await;
                self.account_repo
                    .increment_daily_count(account.id, window.local_date(receipt.sent_at))
                    .await?;
                Ok(EventOutcome::Sent)
            }
            Err(GatewayError::Duplicate { message })
                if event.slot == MessageSlot::ConnectionRequest =>
            {
                // 已是好友/已有邀请: 软成功, 生命周期照常推进, 跟进链保留
                info!(
                    "客户 {} 的建联请求重复, 按软成功处理: {message}",
                    prospect.id
                );
                self.queue_repo
                    .mark_failed(event.id, "DUPLICATE_INVITATION", Some(&message))
                    .await?;
                self.advance_prospect(&campaign, &prospect, event.slot, now)
                    .await;
                Ok(EventOutcome::Duplicate)
            }
            Err(e) => {
                self.queue_repo
                    .mark_failed(event.id, e.error_code(), Some(&e.to_string()))
                    .await?;
                self.prospect_repo
                    .update_status(
                        prospect.id,
                        outreach_domain::entities::ProspectStatus::Failed,
                        None,
                    )
                    .await?;

                let chain_cancelled = if self.config.cancel_chain_on_failure {
                    self.queue_repo
                        .cancel_pending_for_prospect(
                            prospect.id,
                            event.slot,
                            "前序消息发送失败",
                        )
                        .await?
                } else {
                    0
                };
                Ok(EventOutcome::Failed { chain_cancelled })
            }
        }
    }

    /// 推进客户生命周期并刷新最近动作时间。
    /// 消息已实际发出, 流转失败只记日志, 不回滚事件。
    async fn advance_prospect(
        &self,
        campaign: &Campaign,
        prospect: &outreach_domain::entities::Prospect,
        slot: MessageSlot,
        action_at: DateTime<Utc>,
    ) {
        match prospect.advance_after(slot, campaign.message_plan.follow_up_count()) {
            Ok(next) => {
                if let Err(e) = self
                    .prospect_repo
                    .update_status(prospect.id, next, Some(action_at))
                    .await
                {
                    error!("更新客户 {} 状态失败: {e}", prospect.id);
                }
            }
            Err(OutreachError::InvalidStateTransition { from, to }) => {
                warn!(
                    "客户 {} 生命周期流转被跳过: {from} -> {to}",
                    prospect.id
                );
            }
            Err(e) => error!("推进客户 {} 生命周期出错: {e}", prospect.id),
        }
    }

    /// 同账号间隔等待, 带±30%抖动; 返回false表示被停机信号打断
    async fn spacing_wait(&self, shutdown: &mut Option<&mut broadcast::Receiver<()>>) -> bool {
        let base = self.config.send_spacing_seconds as f64;
        let jitter = rand::rng().random_range(0.7..=1.3);
        let wait = StdDuration::from_secs_f64(base * jitter);
        debug!("同账号间隔等待 {:.1}秒", wait.as_secs_f64());

        match shutdown {
            Some(rx) => {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => true,
                    _ = rx.recv() => false,
                }
            }
            None => {
                tokio::time::sleep(wait).await;
                true
            }
        }
    }
}
