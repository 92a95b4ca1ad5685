use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_core::{OutreachError, OutreachResult};
use outreach_domain::{
    entities::{MessageSlot, SendEvent},
    repositories::{QueueCounts, SendQueueRepository},
};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub struct PostgresSendQueueRepository {
    pool: PgPool,
}

const EVENT_COLUMNS: &str = "id, campaign_id, prospect_id, account_id, message_slot, \
     scheduled_for, message, status, provider_message_id, error_code, error_detail, \
     sent_at, claimed_by, claimed_at, created_at, updated_at";

impl PostgresSendQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: &sqlx::postgres::PgRow) -> OutreachResult<SendEvent> {
        Ok(SendEvent {
            id: row.try_get("id")?,
            campaign_id: row.try_get("campaign_id")?,
            prospect_id: row.try_get("prospect_id")?,
            account_id: row.try_get("account_id")?,
            slot: row.try_get("message_slot")?,
            scheduled_for: row.try_get("scheduled_for")?,
            message: row.try_get("message")?,
            status: row.try_get("status")?,
            provider_message_id: row.try_get("provider_message_id")?,
            error_code: row.try_get("error_code")?,
            error_detail: row.try_get("error_detail")?,
            sent_at: row.try_get("sent_at")?,
            claimed_by: row.try_get("claimed_by")?,
            claimed_at: row.try_get("claimed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl SendQueueRepository for PostgresSendQueueRepository {
    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn insert(&self, events: &[SendEvent]) -> OutreachResult<usize> {
        let mut tx = self.pool.begin().await.map_err(OutreachError::Database)?;
        let mut inserted = 0usize;

        for event in events {
            // 依赖部分唯一索引: 同一(客户, 档位)已有活动事件时跳过
            let result = sqlx::query(
                r#"
                INSERT INTO send_queue
                    (campaign_id, prospect_id, account_id, message_slot, scheduled_for, message, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', NOW(), NOW())
                ON CONFLICT (prospect_id, message_slot)
                    WHERE status IN ('PENDING', 'IN_FLIGHT')
                    DO NOTHING
                "#,
            )
            .bind(event.campaign_id)
            .bind(event.prospect_id)
            .bind(event.account_id)
            .bind(event.slot)
            .bind(event.scheduled_for)
            .bind(&event.message)
            .execute(&mut *tx)
            .await
            .map_err(OutreachError::Database)?;

            if result.rows_affected() > 0 {
                inserted += 1;
            } else {
                debug!(
                    "跳过重复入队: 客户 {} 档位 {}",
                    event.prospect_id,
                    event.slot.as_str()
                );
            }
        }

        tx.commit().await.map_err(OutreachError::Database)?;
        Ok(inserted)
    }

    #[instrument(skip(self), fields(claimer = %claimer, limit = limit))]
    async fn claim_due(
        &self,
        before: DateTime<Utc>,
        limit: i64,
        claimer: &str,
    ) -> OutreachResult<Vec<SendEvent>> {
        // SKIP LOCKED保证并发的调度循环互不认领同一事件
        let rows = sqlx::query(&format!(
            r#"
            UPDATE send_queue
            SET status = 'IN_FLIGHT', claimed_by = $3, claimed_at = NOW(), updated_at = NOW()
            WHERE id IN (
                SELECT id FROM send_queue
                WHERE status = 'PENDING' AND scheduled_for <= $1
                ORDER BY scheduled_for ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(before)
        .bind(limit)
        .bind(claimer)
        .fetch_all(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        let mut events: Vec<SendEvent> = rows
            .iter()
            .map(Self::row_to_event)
            .collect::<OutreachResult<_>>()?;
        // RETURNING不保序, 按到期时间重排
        events.sort_by_key(|e| e.scheduled_for);
        Ok(events)
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn mark_sent(
        &self,
        id: i64,
        provider_message_id: Option<&str>,
        sent_at: DateTime<Utc>,
    ) -> OutreachResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE send_queue
            SET status = 'SENT',
                provider_message_id = COALESCE($2, provider_message_id),
                sent_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('PENDING', 'IN_FLIGHT')
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, error_detail), fields(event_id = %id, error_code = %error_code))]
    async fn mark_failed(
        &self,
        id: i64,
        error_code: &str,
        error_detail: Option<&str>,
    ) -> OutreachResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE send_queue
            SET status = 'FAILED', error_code = $2, error_detail = $3, updated_at = NOW()
            WHERE id = $1 AND status IN ('PENDING', 'IN_FLIGHT')
            "#,
        )
        .bind(id)
        .bind(error_code)
        .bind(error_detail)
        .execute(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn cancel(&self, id: i64, reason: &str) -> OutreachResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE send_queue
            SET status = 'CANCELLED', error_code = 'CANCELLED', error_detail = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('PENDING', 'IN_FLIGHT')
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn reschedule(&self, id: i64, new_time: DateTime<Utc>) -> OutreachResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE send_queue
            SET scheduled_for = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(new_time)
        .execute(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(prospect_id = %prospect_id))]
    async fn cancel_pending_for_prospect(
        &self,
        prospect_id: Uuid,
        after_slot: MessageSlot,
        reason: &str,
    ) -> OutreachResult<u64> {
        // 档位序号无法直接在SQL里比较, 先取出再按序号过滤
        let rows = sqlx::query(
            "SELECT id, message_slot FROM send_queue WHERE prospect_id = $1 AND status = 'PENDING'",
        )
        .bind(prospect_id)
        .fetch_all(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        let mut ids = Vec::new();
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let slot: MessageSlot = row.try_get("message_slot")?;
            if slot > after_slot {
                ids.push(id);
            }
        }

        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE send_queue
            SET status = 'CANCELLED', error_code = 'CANCELLED', error_detail = $2, updated_at = NOW()
            WHERE id = ANY($1) AND status = 'PENDING'
            "#,
        )
        .bind(&ids)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn release_stuck(&self, older_than: DateTime<Utc>) -> OutreachResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE send_queue
            SET status = 'PENDING', claimed_by = NULL, claimed_at = NULL, updated_at = NOW()
            WHERE status = 'IN_FLIGHT' AND claimed_at < $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        let released = result.rows_affected();
        if released > 0 {
            warn!("释放僵死认领 {released} 条");
        }
        Ok(released)
    }

    async fn find_by_id(&self, id: i64) -> OutreachResult<Option<SendEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM send_queue WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        row.as_ref().map(Self::row_to_event).transpose()
    }

    async fn find_pending_for_campaign(
        &self,
        campaign_id: Uuid,
    ) -> OutreachResult<Vec<SendEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM send_queue
            WHERE campaign_id = $1 AND status = 'PENDING'
            ORDER BY scheduled_for ASC, id ASC
            "#
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn find_pending_for_account(
        &self,
        account_id: Uuid,
    ) -> OutreachResult<Vec<SendEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM send_queue
            WHERE account_id = $1 AND status = 'PENDING'
            ORDER BY scheduled_for ASC, id ASC
            "#
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn counts(&self, now: DateTime<Utc>) -> OutreachResult<QueueCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'PENDING' AND scheduled_for <= $1) AS due,
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending,
                COUNT(*) FILTER (WHERE status = 'IN_FLIGHT') AS in_flight,
                COUNT(*) FILTER (WHERE status = 'SENT') AS sent,
                COUNT(*) FILTER (WHERE status = 'FAILED') AS failed,
                COUNT(*) FILTER (WHERE status = 'CANCELLED') AS cancelled
            FROM send_queue
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        Ok(QueueCounts {
            due: row.try_get::<i64, _>("due")? as u64,
            pending: row.try_get::<i64, _>("pending")? as u64,
            in_flight: row.try_get::<i64, _>("in_flight")? as u64,
            sent: row.try_get::<i64, _>("sent")? as u64,
            failed: row.try_get::<i64, _>("failed")? as u64,
            cancelled: row.try_get::<i64, _>("cancelled")? as u64,
        })
    }
}
