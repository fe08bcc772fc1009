use crate::database::error::DatabaseError;

/// Base trait for table operations shared by every gateway.
#[async_trait::async_trait]
pub trait TableBase {
    /// Drops the table.
    async fn drop_table(&self) -> Result<(), DatabaseError>;
    /// Deletes all rows from the table.
    async fn delete_all(&self) -> Result<(), DatabaseError>;
}
