use async_trait::async_trait;
use serde::Serialize;

use crate::delivery::DeliverySink;
use crate::delivery::Notice;

#[derive(Serialize)]
struct NoticeDto<'a> {
    text: &'a str,
}

/// Sink that pushes notices through the chat gateway sidecar.
pub struct GatewaySink {
    client: reqwest::Client,
    base_url: String,
}

impl GatewaySink {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DeliverySink for GatewaySink {
    async fn deliver(&self, telegram_id: i64, notice: &Notice) -> anyhow::Result<()> {
        let text = notice.render();
        let resp = self
            .client
            .post(format!("{}/users/{}/notices", self.base_url, telegram_id))
            .json(&NoticeDto { text: &text })
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("notice delivery returned {}", resp.status());
        }
        Ok(())
    }
}
