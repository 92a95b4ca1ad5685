//! 测试夹具: 单元测试与集成测试共用的实体构造器。

use chrono::Utc;
use outreach_domain::entities::{
    AccountStatus, Campaign, CampaignSettings, CampaignStatus, FollowUpStep, MessagePlan,
    MessagingAccount, Prospect, ProspectStatus,
};
use outreach_infrastructure::InMemoryStore;
use uuid::Uuid;

pub fn store_fixture() -> InMemoryStore {
    InMemoryStore::new()
}

pub fn account_fixture() -> MessagingAccount {
    let now = Utc::now();
    MessagingAccount {
        id: Uuid::new_v4(),
        provider_account_id: "provider-acc-1".to_string(),
        display_name: "测试账号".to_string(),
        status: AccountStatus::Connected,
        created_at: now,
        updated_at: now,
    }
}

/// UTC时区、工作日8-18点、首选9点、上限25/天、间隔30分钟的活动
pub fn campaign_fixture(follow_up_delays: Vec<u32>) -> Campaign {
    let now = Utc::now();
    Campaign {
        id: Uuid::new_v4(),
        name: "测试活动".to_string(),
        account_id: Uuid::new_v4(),
        status: CampaignStatus::Active,
        message_plan: MessagePlan {
            connection_template: Some("你好 {first_name}".to_string()),
            follow_ups: follow_up_delays
                .into_iter()
                .enumerate()
                .map(|(i, delay_days)| FollowUpStep {
                    template: format!("跟进{} {{first_name}}", i + 1),
                    delay_days,
                })
                .collect(),
        },
        settings: CampaignSettings {
            utc_offset_minutes: 0,
            send_start_hour: 8,
            send_end_hour: 18,
            preferred_send_hour: 9,
            skip_weekends: true,
            holidays: vec![],
            daily_cap: 25,
            spacing_minutes: 30,
        },
        created_at: now,
        updated_at: now,
    }
}

pub fn prospect_fixture(campaign_id: Uuid) -> Prospect {
    let now = Utc::now();
    Prospect {
        id: Uuid::new_v4(),
        campaign_id,
        first_name: "Alice".to_string(),
        last_name: "Wang".to_string(),
        external_profile_id: Some(format!("profile-{}", Uuid::new_v4())),
        profile_url: None,
        status: ProspectStatus::ReadyToMessage,
        last_action_at: None,
        created_at: now,
        updated_at: now,
    }
}
