//! Application entry point for digest-bot.
//!
//! Wires the store, the chat gateway, the summarizer and the scheduler, then
//! runs until interrupted.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use dotenv::dotenv;
use log::debug;
use log::info;

use digest_bot::config::Config;
use digest_bot::database::Database;
use digest_bot::delivery::DeliverySink;
use digest_bot::delivery::GatewaySink;
use digest_bot::logging::setup_logging;
use digest_bot::service::Services;
use digest_bot::source::ChatSource;
use digest_bot::source::GatewaySource;
use digest_bot::summarizer::OpenRouterSummarizer;
use digest_bot::summarizer::Summarizer;
use digest_bot::task::digest_scheduler::DigestScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let init_start = Instant::now();
    let config = Config::new()?;
    setup_logging(&config)?;
    info!("Starting digest-bot...");

    let db = setup_database(&config, init_start).await?;

    let source: Arc<dyn ChatSource> = Arc::new(GatewaySource::new(&config.gateway_url));
    let summarizer: Arc<dyn Summarizer> = Arc::new(OpenRouterSummarizer::new(
        &config.openrouter_url,
        &config.openrouter_api_key,
    ));
    let sink: Arc<dyn DeliverySink> = Arc::new(GatewaySink::new(&config.gateway_url));

    debug!("Setting up Services...");
    let services = Arc::new(Services::new(
        db.clone(),
        source,
        summarizer,
        config.default_model.clone(),
        config.fetch_limit,
    ));

    let scheduler = setup_scheduler(&config, db, &services, sink, init_start).await?;

    info!(
        "digest-bot is up in {:.2}s. Press Ctrl+C to stop.",
        init_start.elapsed().as_secs_f64()
    );

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down.");

    // Let in-flight digest runs complete their current write before exiting.
    scheduler.shutdown().await;

    Ok(())
}

async fn setup_database(config: &Config, init_start: Instant) -> Result<Arc<Database>> {
    debug!("Setting up Database...");
    let db = Arc::new(Database::new(&config.db_url, &config.db_path).await?);

    info!("Running database migrations...");
    db.run_migrations().await?;
    info!(
        "Database setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );

    Ok(db)
}

async fn setup_scheduler(
    config: &Config,
    db: Arc<Database>,
    services: &Services,
    sink: Arc<dyn DeliverySink>,
    init_start: Instant,
) -> Result<Arc<DigestScheduler>> {
    debug!("Setting up DigestScheduler...");
    let scheduler = DigestScheduler::new(
        db,
        services.summary.clone(),
        sink,
        config.poll_interval,
        config.rebuild_interval,
        config.weekly_anchor,
    );

    let scheduled = scheduler.rebuild().await?;
    info!("Loaded {scheduled} digest jobs from the store.");

    scheduler.clone().start()?;
    info!(
        "Scheduler setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );

    Ok(scheduler)
}
