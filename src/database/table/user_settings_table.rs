use async_trait::async_trait;
use sqlx::SqlitePool;

use super::base_table::BaseTable;
use super::table::TableBase;
use crate::database::error::DatabaseError;
use crate::database::model::UserSettingsModel;

/// Partial settings update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserSettingsUpdate {
    pub delivery_time: Option<String>,
    pub delivery_frequency: Option<String>,
    pub timezone: Option<String>,
    pub openrouter_model: Option<String>,
    pub is_active: Option<bool>,
}

pub struct UserSettingsTable {
    base: BaseTable,
}

impl UserSettingsTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            base: BaseTable::new(pool),
        }
    }

    pub async fn select_by_user_id(
        &self,
        user_id: i64,
    ) -> Result<Option<UserSettingsModel>, DatabaseError> {
        let settings = sqlx::query_as::<_, UserSettingsModel>(
            r#"
            SELECT id, user_id, delivery_time, delivery_frequency, timezone,
                   openrouter_model, is_active
            FROM user_settings
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.base.pool)
        .await?;
        Ok(settings)
    }

    pub async fn update_fields(
        &self,
        user_id: i64,
        update: &UserSettingsUpdate,
    ) -> Result<UserSettingsModel, DatabaseError> {
        let settings = sqlx::query_as::<_, UserSettingsModel>(
            r#"
            UPDATE user_settings
            SET delivery_time = COALESCE(?, delivery_time),
                delivery_frequency = COALESCE(?, delivery_frequency),
                timezone = COALESCE(?, timezone),
                openrouter_model = COALESCE(?, openrouter_model),
                is_active = COALESCE(?, is_active)
            WHERE user_id = ?
            RETURNING id, user_id, delivery_time, delivery_frequency, timezone,
                      openrouter_model, is_active
            "#,
        )
        .bind(update.delivery_time.as_deref())
        .bind(update.delivery_frequency.as_deref())
        .bind(update.timezone.as_deref())
        .bind(update.openrouter_model.as_deref())
        .bind(update.is_active)
        .bind(user_id)
        .fetch_optional(&self.base.pool)
        .await?;

        settings.ok_or(DatabaseError::InternalError {
            message: format!("No settings row for user {user_id}"),
        })
    }

    /// The user's configured model, or `default_model` if the user has no
    /// settings row.
    pub async fn effective_model(
        &self,
        user_id: i64,
        default_model: &str,
    ) -> Result<String, DatabaseError> {
        let model = self
            .select_by_user_id(user_id)
            .await?
            .map(|s| s.openrouter_model);
        Ok(model.unwrap_or(default_model.to_string()))
    }
}

#[async_trait]
impl TableBase for UserSettingsTable {
    async fn drop_table(&self) -> Result<(), DatabaseError> {
        sqlx::query("DROP TABLE IF EXISTS user_settings")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM user_settings")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }
}
