use async_trait::async_trait;
use log::info;

use crate::delivery::DeliverySink;
use crate::delivery::Notice;

/// Sink that only logs notices. Used when no delivery channel is configured.
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, telegram_id: i64, notice: &Notice) -> anyhow::Result<()> {
        info!("Notice for user {telegram_id}: {}", notice.render());
        Ok(())
    }
}
