use async_trait::async_trait;
use sqlx::SqlitePool;

use super::base_table::BaseTable;
use super::table::TableBase;
use crate::database::error::DatabaseError;
use crate::database::model::SubscriptionModel;

pub struct SubscriptionTable {
    base: BaseTable,
}

impl SubscriptionTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            base: BaseTable::new(pool),
        }
    }

    /// Creates the subscription or reactivates a soft-deleted one. The
    /// watermark of a reactivated subscription is preserved.
    pub async fn upsert_active(
        &self,
        user_id: i64,
        chat_id: i64,
        chat_title: &str,
    ) -> Result<SubscriptionModel, DatabaseError> {
        let sub = sqlx::query_as::<_, SubscriptionModel>(
            r#"
            INSERT INTO subscriptions (user_id, chat_id, chat_title, is_active)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(user_id, chat_id)
            DO UPDATE SET is_active = 1, chat_title = excluded.chat_title
            RETURNING id, user_id, chat_id, chat_title, is_active, last_processed_message_id
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(chat_title)
        .fetch_one(&self.base.pool)
        .await?;
        Ok(sub)
    }

    /// Soft-deletes a subscription. Returns false when no active row matched.
    pub async fn deactivate(&self, user_id: i64, chat_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET is_active = 0 WHERE user_id = ? AND chat_id = ? AND is_active = 1",
        )
        .bind(user_id)
        .bind(chat_id)
        .execute(&self.base.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn select(&self, id: i64) -> Result<Option<SubscriptionModel>, DatabaseError> {
        let sub = sqlx::query_as::<_, SubscriptionModel>(
            r#"
            SELECT id, user_id, chat_id, chat_title, is_active, last_processed_message_id
            FROM subscriptions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.base.pool)
        .await?;
        Ok(sub)
    }

    pub async fn select_active_by_user_id(
        &self,
        user_id: i64,
    ) -> Result<Vec<SubscriptionModel>, DatabaseError> {
        let subs = sqlx::query_as::<_, SubscriptionModel>(
            r#"
            SELECT id, user_id, chat_id, chat_title, is_active, last_processed_message_id
            FROM subscriptions
            WHERE user_id = ? AND is_active = 1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.base.pool)
        .await?;
        Ok(subs)
    }

    /// Advances the watermark to `message_id`. The guard keeps the watermark
    /// monotone: a stale or duplicate run can never move it backwards.
    /// Returns false when nothing was updated.
    pub async fn advance_watermark(
        &self,
        id: i64,
        message_id: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET last_processed_message_id = ?
            WHERE id = ?
              AND (last_processed_message_id IS NULL OR last_processed_message_id < ?)
            "#,
        )
        .bind(message_id)
        .bind(id)
        .bind(message_id)
        .execute(&self.base.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TableBase for SubscriptionTable {
    async fn drop_table(&self) -> Result<(), DatabaseError> {
        sqlx::query("DROP TABLE IF EXISTS subscriptions")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM subscriptions")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }
}
