use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_core::{OutreachError, OutreachResult};
use outreach_domain::{
    entities::{Prospect, ProspectStatus},
    repositories::ProspectRepository,
};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct PostgresProspectRepository {
    pool: PgPool,
}

const PROSPECT_COLUMNS: &str = "id, campaign_id, first_name, last_name, external_profile_id, \
     profile_url, status, last_action_at, created_at, updated_at";

impl PostgresProspectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_prospect(row: &sqlx::postgres::PgRow) -> OutreachResult<Prospect> {
        Ok(Prospect {
            id: row.try_get("id")?,
            campaign_id: row.try_get("campaign_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            external_profile_id: row.try_get("external_profile_id")?,
            profile_url: row.try_get("profile_url")?,
            status: row.try_get("status")?,
            last_action_at: row.try_get("last_action_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ProspectRepository for PostgresProspectRepository {
    #[instrument(skip(self, prospect), fields(prospect_id = %prospect.id))]
    async fn create(&self, prospect: &Prospect) -> OutreachResult<Prospect> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO campaign_prospects
                (id, campaign_id, first_name, last_name, external_profile_id, profile_url, status, last_action_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            RETURNING {PROSPECT_COLUMNS}
            "#
        ))
        .bind(prospect.id)
        .bind(prospect.campaign_id)
        .bind(&prospect.first_name)
        .bind(&prospect.last_name)
        .bind(&prospect.external_profile_id)
        .bind(&prospect.profile_url)
        .bind(prospect.status)
        .bind(prospect.last_action_at)
        .fetch_one(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        let created = Self::row_to_prospect(&row)?;
        debug!("创建客户成功: {}", created.entity_description());
        Ok(created)
    }

    #[instrument(skip(self), fields(prospect_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> OutreachResult<Option<Prospect>> {
        let row = sqlx::query(&format!(
            "SELECT {PROSPECT_COLUMNS} FROM campaign_prospects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        row.as_ref().map(Self::row_to_prospect).transpose()
    }

    #[instrument(skip(self), fields(prospect_id = %id, status = %status.as_str()))]
    async fn update_status(
        &self,
        id: Uuid,
        status: ProspectStatus,
        last_action_at: Option<DateTime<Utc>>,
    ) -> OutreachResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_prospects
            SET status = $2, last_action_at = COALESCE($3, last_action_at), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(last_action_at)
        .execute(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(campaign_id = %campaign_id))]
    async fn find_enrollable(
        &self,
        campaign_id: Uuid,
        failed_before: DateTime<Utc>,
        limit: i64,
    ) -> OutreachResult<Vec<Prospect>> {
        // 未进入发送链路的客户, 以及失败后已过冷却期的客户
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PROSPECT_COLUMNS} FROM campaign_prospects
            WHERE campaign_id = $1
              AND (
                status IN ('PENDING', 'APPROVED', 'READY_TO_MESSAGE')
                OR (status = 'FAILED' AND updated_at < $2)
              )
            ORDER BY created_at
            LIMIT $3
            "#
        ))
        .bind(campaign_id)
        .bind(failed_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        rows.iter().map(Self::row_to_prospect).collect()
    }
}
