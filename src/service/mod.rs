use std::sync::Arc;

use crate::database::Database;
use crate::source::ChatSource;
use crate::summarizer::Summarizer;

pub mod error;
pub mod subscription_service;
pub mod summary_service;

use crate::service::subscription_service::SubscriptionService;
use crate::service::summary_service::SummaryService;

pub struct Services {
    pub summary: Arc<SummaryService>,
    pub subscription: Arc<SubscriptionService>,
}

impl Services {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn ChatSource>,
        summarizer: Arc<dyn Summarizer>,
        default_model: String,
        fetch_limit: u32,
    ) -> Self {
        Self {
            summary: Arc::new(SummaryService::new(
                db.clone(),
                source.clone(),
                summarizer,
                default_model,
                fetch_limit,
            )),
            subscription: Arc::new(SubscriptionService::new(db, source)),
        }
    }
}
