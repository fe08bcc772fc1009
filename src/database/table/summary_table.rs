use async_trait::async_trait;
use sqlx::SqlitePool;

use super::base_table::BaseTable;
use super::table::TableBase;
use crate::database::error::DatabaseError;
use crate::database::model::SummaryModel;

/// Summaries are append-only; there is deliberately no update or delete
/// beyond `delete_all` for tests.
pub struct SummaryTable {
    base: BaseTable,
}

impl SummaryTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            base: BaseTable::new(pool),
        }
    }

    pub async fn insert(&self, model: &SummaryModel) -> Result<i64, DatabaseError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO summaries
                (subscription_id, content, created_at, from_message_id, to_message_id, model_used)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(model.subscription_id)
        .bind(&model.content)
        .bind(model.created_at)
        .bind(model.from_message_id)
        .bind(model.to_message_id)
        .bind(model.model_used.as_deref())
        .fetch_one(&self.base.pool)
        .await?;
        Ok(id)
    }

    pub async fn select_latest_by_subscription_id(
        &self,
        subscription_id: i64,
    ) -> Result<Option<SummaryModel>, DatabaseError> {
        let summary = sqlx::query_as::<_, SummaryModel>(
            r#"
            SELECT id, subscription_id, content, created_at, from_message_id,
                   to_message_id, model_used
            FROM summaries
            WHERE subscription_id = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.base.pool)
        .await?;
        Ok(summary)
    }

    pub async fn select_all_by_subscription_id(
        &self,
        subscription_id: i64,
    ) -> Result<Vec<SummaryModel>, DatabaseError> {
        let summaries = sqlx::query_as::<_, SummaryModel>(
            r#"
            SELECT id, subscription_id, content, created_at, from_message_id,
                   to_message_id, model_used
            FROM summaries
            WHERE subscription_id = ?
            ORDER BY id
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.base.pool)
        .await?;
        Ok(summaries)
    }
}

#[async_trait]
impl TableBase for SummaryTable {
    async fn drop_table(&self) -> Result<(), DatabaseError> {
        sqlx::query("DROP TABLE IF EXISTS summaries")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM summaries")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }
}
