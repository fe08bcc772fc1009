use std::str::FromStr;

use log::debug;
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use crate::database::table::SubscriptionTable;
use crate::database::table::SummaryTable;
use crate::database::table::TableBase;
use crate::database::table::UserSettingsTable;
use crate::database::table::UserTable;

pub mod error;
pub mod model;
pub mod table;

pub struct Database {
    pub pool: SqlitePool,
    pub user_table: UserTable,
    pub user_settings_table: UserSettingsTable,
    pub subscription_table: SubscriptionTable,
    pub summary_table: SummaryTable,
}

impl Database {
    pub async fn new(db_url: &str, db_path: &str) -> anyhow::Result<Self> {
        let path = std::path::Path::new(db_path);
        if db_path != ":memory:" && !path.exists() {
            debug!("Database path {db_path} does not exist. Creating...");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, "")?;
            info!("Created {db_path}");
        }

        debug!("Connecting to db...");
        let opts = SqliteConnectOptions::from_str(db_url)?.foreign_keys(true);
        let pool = SqlitePool::connect_with(opts).await?;
        info!("Connected to db.");

        let user_table = UserTable::new(pool.clone());
        let user_settings_table = UserSettingsTable::new(pool.clone());
        let subscription_table = SubscriptionTable::new(pool.clone());
        let summary_table = SummaryTable::new(pool.clone());

        Ok(Self {
            pool,
            user_table,
            user_settings_table,
            subscription_table,
            summary_table,
        })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn drop_all_tables(&self) -> anyhow::Result<()> {
        self.summary_table.drop_table().await?;
        self.subscription_table.drop_table().await?;
        self.user_settings_table.drop_table().await?;
        self.user_table.drop_table().await?;
        Ok(())
    }

    pub async fn delete_all_tables(&self) -> anyhow::Result<()> {
        self.summary_table.delete_all().await?;
        self.subscription_table.delete_all().await?;
        self.user_settings_table.delete_all().await?;
        self.user_table.delete_all().await?;
        Ok(())
    }
}
