//! 运维API处理器测试: 内存存储直连, 不经过HTTP层。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use mockall::mock;
use outreach_api::handlers::campaigns::{enroll_campaign, get_campaign, reschedule_campaign};
use outreach_api::handlers::queue::{queue_stats, run_cycle};
use outreach_api::{ApiError, AppState};
use outreach_core::config::{DispatcherConfig, PlannerConfig};
use outreach_core::OutreachError;
use outreach_dispatcher::test_utils::{account_fixture, campaign_fixture, prospect_fixture};
use outreach_dispatcher::{DispatchLoop, RescheduleService, SequencePlanner};
use outreach_domain::entities::{MessageSlot, MessagingAccount, Prospect, SendEvent};
use outreach_domain::ports::{DeliveryGateway, DeliveryReceipt, GatewayError};
use outreach_domain::repositories::{
    AccountRepository, CampaignRepository, ProspectRepository, SendQueueRepository,
};
use outreach_infrastructure::{InMemoryStore, MetricsCollector};
use uuid::Uuid;

mock! {
    Gateway {}

    #[async_trait::async_trait]
    impl DeliveryGateway for Gateway {
        async fn send(
            &self,
            account: &MessagingAccount,
            prospect: &Prospect,
            slot: MessageSlot,
            message: &str,
        ) -> Result<DeliveryReceipt, GatewayError>;
    }
}

fn app_state(store: &InMemoryStore, gateway: MockGateway) -> AppState {
    let campaign_repo: Arc<dyn CampaignRepository> = Arc::new(store.clone());
    let prospect_repo: Arc<dyn ProspectRepository> = Arc::new(store.clone());
    let account_repo: Arc<dyn AccountRepository> = Arc::new(store.clone());
    let queue_repo: Arc<dyn SendQueueRepository> = Arc::new(store.clone());

    let planner = Arc::new(SequencePlanner::new(
        campaign_repo.clone(),
        prospect_repo.clone(),
        account_repo.clone(),
        queue_repo.clone(),
        PlannerConfig {
            follow_up_delay_days: vec![3, 8, 13],
            default_spacing_minutes: 30,
            default_daily_cap: 25,
            default_send_start_hour: 8,
            default_send_end_hour: 18,
            skip_weekends: true,
            failed_cooldown_hours: 24,
        },
    ));
    let rescheduler = Arc::new(RescheduleService::new(
        campaign_repo.clone(),
        account_repo.clone(),
        queue_repo.clone(),
    ));
    let dispatcher = Arc::new(DispatchLoop::new(
        campaign_repo.clone(),
        prospect_repo,
        account_repo,
        queue_repo.clone(),
        Arc::new(gateway),
        Arc::new(MetricsCollector::new()),
        DispatcherConfig {
            enabled: true,
            poll_interval_seconds: 60,
            batch_size: 20,
            send_spacing_seconds: 1,
            stuck_claim_timeout_minutes: 15,
            cancel_chain_on_failure: false,
        },
        "api-test".to_string(),
    ));

    AppState {
        campaign_repo,
        queue_repo,
        planner,
        rescheduler,
        dispatcher,
        metrics_handle: None,
    }
}

#[tokio::test]
async fn test_queue_stats_reports_counts() {
    let store = InMemoryStore::new();
    store
        .insert(&[SendEvent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            MessageSlot::ConnectionRequest,
            chrono::Utc::now() - chrono::Duration::minutes(1),
            "你好".to_string(),
        )])
        .await
        .unwrap();
    let state = app_state(&store, MockGateway::new());

    let response = queue_stats(State(state)).await.unwrap();
    let counts = response.data.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.due, 1);
}

#[tokio::test]
async fn test_enroll_and_get_campaign() {
    let store = InMemoryStore::new();
    let campaign = CampaignRepository::create(&store, &campaign_fixture(vec![3]))
        .await
        .unwrap();
    ProspectRepository::create(&store, &prospect_fixture(campaign.id))
        .await
        .unwrap();
    let state = app_state(&store, MockGateway::new());

    let response = enroll_campaign(State(state.clone()), Path(campaign.id), None)
        .await
        .unwrap();
    let enroll = response.data.unwrap();
    // 建联 + 一条跟进
    assert_eq!(enroll.inserted, 2);
    assert_eq!(enroll.planned_prospects, 1);
    assert!(enroll.estimated_completion.is_some());

    let fetched = get_campaign(State(state), Path(campaign.id)).await.unwrap();
    assert_eq!(fetched.data.unwrap().id, campaign.id);
}

#[tokio::test]
async fn test_get_unknown_campaign_is_not_found() {
    let store = InMemoryStore::new();
    let state = app_state(&store, MockGateway::new());

    let result = get_campaign(State(state), Path(Uuid::new_v4())).await;
    assert!(matches!(
        result,
        Err(ApiError::Outreach(OutreachError::CampaignNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_run_cycle_dispatches_due_events() {
    let store = InMemoryStore::new();
    let account = AccountRepository::create(&store, &account_fixture())
        .await
        .unwrap();
    let mut campaign = campaign_fixture(vec![]);
    campaign.account_id = account.id;
    let campaign = CampaignRepository::create(&store, &campaign).await.unwrap();
    let prospect = ProspectRepository::create(&store, &prospect_fixture(campaign.id))
        .await
        .unwrap();
    store
        .insert(&[SendEvent::new(
            campaign.id,
            prospect.id,
            account.id,
            MessageSlot::ConnectionRequest,
            chrono::Utc::now() - chrono::Duration::minutes(1),
            "你好 Alice".to_string(),
        )])
        .await
        .unwrap();

    let mut gateway = MockGateway::new();
    gateway.expect_send().times(1).returning(|_, _, _, _| {
        Ok(DeliveryReceipt {
            provider_message_id: Some("prov-1".to_string()),
            sent_at: chrono::Utc::now(),
        })
    });
    let state = app_state(&store, gateway);

    let response = run_cycle(State(state)).await.unwrap();
    let summary = response.data.unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.sent, 1);
}

#[tokio::test]
async fn test_reschedule_without_pending_moves_nothing() {
    let store = InMemoryStore::new();
    let campaign = CampaignRepository::create(&store, &campaign_fixture(vec![]))
        .await
        .unwrap();
    let state = app_state(&store, MockGateway::new());

    let response = reschedule_campaign(
        State(state),
        Path(campaign.id),
        Some(Json(Default::default())),
    )
    .await
    .unwrap();
    assert_eq!(response.data.unwrap().moved, 0);
}
