use async_trait::async_trait;
use outreach_core::{OutreachError, OutreachResult};
use outreach_domain::{
    entities::{Campaign, CampaignSettings, CampaignStatus, MessagePlan},
    repositories::CampaignRepository,
};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct PostgresCampaignRepository {
    pool: PgPool,
}

impl PostgresCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_campaign(row: &sqlx::postgres::PgRow) -> OutreachResult<Campaign> {
        let plan_json: serde_json::Value = row.try_get("message_plan")?;
        let settings_json: serde_json::Value = row.try_get("settings")?;
        let message_plan: MessagePlan = serde_json::from_value(plan_json)
            .map_err(|e| OutreachError::DatabaseOperation(format!("解析消息序列失败: {e}")))?;
        let settings: CampaignSettings = serde_json::from_value(settings_json)
            .map_err(|e| OutreachError::DatabaseOperation(format!("解析活动设置失败: {e}")))?;

        Ok(Campaign {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            account_id: row.try_get("account_id")?,
            status: row.try_get("status")?,
            message_plan,
            settings,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const CAMPAIGN_COLUMNS: &str =
    "id, name, account_id, status, message_plan, settings, created_at, updated_at";

#[async_trait]
impl CampaignRepository for PostgresCampaignRepository {
    #[instrument(skip(self, campaign), fields(campaign_id = %campaign.id, name = %campaign.name))]
    async fn create(&self, campaign: &Campaign) -> OutreachResult<Campaign> {
        let plan_json = serde_json::to_value(&campaign.message_plan)
            .map_err(|e| OutreachError::Internal(format!("序列化消息序列失败: {e}")))?;
        let settings_json = serde_json::to_value(&campaign.settings)
            .map_err(|e| OutreachError::Internal(format!("序列化活动设置失败: {e}")))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO campaigns (id, name, account_id, status, message_plan, settings, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        ))
        .bind(campaign.id)
        .bind(&campaign.name)
        .bind(campaign.account_id)
        .bind(campaign.status)
        .bind(plan_json)
        .bind(settings_json)
        .fetch_one(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        let created = Self::row_to_campaign(&row)?;
        debug!("创建活动成功: {}", created.entity_description());
        Ok(created)
    }

    #[instrument(skip(self), fields(campaign_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> OutreachResult<Option<Campaign>> {
        let row = sqlx::query(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        row.as_ref().map(Self::row_to_campaign).transpose()
    }

    async fn find_active(&self) -> OutreachResult<Vec<Campaign>> {
        let rows = sqlx::query(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE status = $1 ORDER BY created_at"
        ))
        .bind(CampaignStatus::Active)
        .fetch_all(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        rows.iter().map(Self::row_to_campaign).collect()
    }

    #[instrument(skip(self, campaign), fields(campaign_id = %campaign.id))]
    async fn update(&self, campaign: &Campaign) -> OutreachResult<Campaign> {
        let plan_json = serde_json::to_value(&campaign.message_plan)
            .map_err(|e| OutreachError::Internal(format!("序列化消息序列失败: {e}")))?;
        let settings_json = serde_json::to_value(&campaign.settings)
            .map_err(|e| OutreachError::Internal(format!("序列化活动设置失败: {e}")))?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE campaigns
            SET name = $2, account_id = $3, status = $4, message_plan = $5, settings = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        ))
        .bind(campaign.id)
        .bind(&campaign.name)
        .bind(campaign.account_id)
        .bind(campaign.status)
        .bind(plan_json)
        .bind(settings_json)
        .fetch_optional(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        match row {
            Some(row) => Self::row_to_campaign(&row),
            None => Err(OutreachError::CampaignNotFound { id: campaign.id }),
        }
    }
}
