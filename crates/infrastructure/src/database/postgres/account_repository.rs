use async_trait::async_trait;
use chrono::NaiveDate;
use outreach_core::{OutreachError, OutreachResult};
use outreach_domain::{entities::MessagingAccount, repositories::AccountRepository};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct PostgresAccountRepository {
    pool: PgPool,
}

const ACCOUNT_COLUMNS: &str =
    "id, provider_account_id, display_name, status, created_at, updated_at";

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_account(row: &sqlx::postgres::PgRow) -> OutreachResult<MessagingAccount> {
        Ok(MessagingAccount {
            id: row.try_get("id")?,
            provider_account_id: row.try_get("provider_account_id")?,
            display_name: row.try_get("display_name")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn create(&self, account: &MessagingAccount) -> OutreachResult<MessagingAccount> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO messaging_accounts (id, provider_account_id, display_name, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.id)
        .bind(&account.provider_account_id)
        .bind(&account.display_name)
        .bind(account.status)
        .fetch_one(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        Self::row_to_account(&row)
    }

    #[instrument(skip(self), fields(account_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> OutreachResult<Option<MessagingAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM messaging_accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    #[instrument(skip(self), fields(account_id = %account_id, day = %day))]
    async fn increment_daily_count(
        &self,
        account_id: Uuid,
        day: NaiveDate,
    ) -> OutreachResult<u32> {
        // 原子upsert递增, 并发安全
        let row = sqlx::query(
            r#"
            INSERT INTO account_daily_counters (account_id, day, sent_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (account_id, day)
            DO UPDATE SET sent_count = account_daily_counters.sent_count + 1
            RETURNING sent_count
            "#,
        )
        .bind(account_id)
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        let count: i32 = row.try_get("sent_count")?;
        debug!("账号 {account_id} 在 {day} 的发送计数递增至 {count}");
        Ok(count as u32)
    }

    async fn sent_count_on(&self, account_id: Uuid, day: NaiveDate) -> OutreachResult<u32> {
        let row = sqlx::query(
            "SELECT sent_count FROM account_daily_counters WHERE account_id = $1 AND day = $2",
        )
        .bind(account_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await
        .map_err(OutreachError::Database)?;

        match row {
            Some(row) => {
                let count: i32 = row.try_get("sent_count")?;
                Ok(count as u32)
            }
            None => Ok(0),
        }
    }
}
