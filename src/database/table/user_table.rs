use async_trait::async_trait;
use sqlx::SqlitePool;

use super::base_table::BaseTable;
use super::table::TableBase;
use crate::database::error::DatabaseError;
use crate::database::model::ScheduledUserRow;
use crate::database::model::UserModel;

pub struct UserTable {
    base: BaseTable,
}

impl UserTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            base: BaseTable::new(pool),
        }
    }

    /// Fetches the user with the given Telegram id, creating it together with
    /// a default settings row when missing. Profile fields are refreshed on
    /// every contact.
    pub async fn get_or_create(
        &self,
        telegram_id: i64,
        first_name: &str,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<UserModel, DatabaseError> {
        if let Some(existing) = self.select_by_telegram_id(telegram_id).await? {
            let updated = sqlx::query_as::<_, UserModel>(
                r#"
                UPDATE users
                SET first_name = ?, last_name = ?, username = ?
                WHERE id = ?
                RETURNING id, telegram_id, username, first_name, last_name, is_active
                "#,
            )
            .bind(first_name)
            .bind(last_name)
            .bind(username)
            .bind(existing.id)
            .fetch_one(&self.base.pool)
            .await?;
            return Ok(updated);
        }

        let mut tx = self.base.pool.begin().await?;

        let user = sqlx::query_as::<_, UserModel>(
            r#"
            INSERT INTO users (telegram_id, username, first_name, last_name, is_active)
            VALUES (?, ?, ?, ?, 1)
            RETURNING id, telegram_id, username, first_name, last_name, is_active
            "#,
        )
        .bind(telegram_id)
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .fetch_one(&mut *tx)
        .await?;

        // Settings defaults come from the schema.
        sqlx::query("INSERT INTO user_settings (user_id) VALUES (?)")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    pub async fn select(&self, id: i64) -> Result<Option<UserModel>, DatabaseError> {
        let user = sqlx::query_as::<_, UserModel>(
            "SELECT id, telegram_id, username, first_name, last_name, is_active FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.base.pool)
        .await?;
        Ok(user)
    }

    pub async fn select_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<UserModel>, DatabaseError> {
        let user = sqlx::query_as::<_, UserModel>(
            "SELECT id, telegram_id, username, first_name, last_name, is_active FROM users WHERE telegram_id = ?",
        )
        .bind(telegram_id)
        .fetch_optional(&self.base.pool)
        .await?;
        Ok(user)
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }

    /// Scheduling row for one user, if they are active with active settings.
    pub async fn select_scheduled_by_user_id(
        &self,
        user_id: i64,
    ) -> Result<Option<ScheduledUserRow>, DatabaseError> {
        let row = sqlx::query_as::<_, ScheduledUserRow>(
            r#"
            SELECT
                u.id AS user_id,
                u.telegram_id,
                u.first_name,
                s.delivery_time,
                s.delivery_frequency,
                s.timezone
            FROM users u
            JOIN user_settings s ON s.user_id = u.id
            WHERE u.id = ? AND u.is_active = 1 AND s.is_active = 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.base.pool)
        .await?;
        Ok(row)
    }

    /// Users eligible for scheduling: active, with active settings.
    pub async fn select_scheduled(&self) -> Result<Vec<ScheduledUserRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ScheduledUserRow>(
            r#"
            SELECT
                u.id AS user_id,
                u.telegram_id,
                u.first_name,
                s.delivery_time,
                s.delivery_frequency,
                s.timezone
            FROM users u
            JOIN user_settings s ON s.user_id = u.id
            WHERE u.is_active = 1 AND s.is_active = 1
            "#,
        )
        .fetch_all(&self.base.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl TableBase for UserTable {
    async fn drop_table(&self) -> Result<(), DatabaseError> {
        sqlx::query("DROP TABLE IF EXISTS users")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM users")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }
}
