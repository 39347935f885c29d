//! Stelo Ledger service entry point
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌─────────────┐    ┌──────────┐
//! │  Config  │───▶│ Postgres │───▶│ Price Cache │───▶│  Engine  │
//! │  (YAML)  │    │ (schema) │    │ (bulk load) │    │          │
//! └──────────┘    └──────────┘    └─────────────┘    └──────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use stelo_ledger::activity::{MemoryActivitySink, NotificationHub};
use stelo_ledger::clock::{Clock, SystemClock};
use stelo_ledger::config::AppConfig;
use stelo_ledger::db::Database;
use stelo_ledger::ledger::PgLedger;
use stelo_ledger::pricing::{PgPriceSource, PriceCache};
use stelo_ledger::transfer::HttpWebhookNotifier;
use stelo_ledger::{EngineParts, LedgerEngine};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).with_context(|| format!("loading config for {}", env))?;
    let _log_guard = stelo_ledger::logging::init_logging(&app_config);

    tracing::info!("Starting Stelo Ledger in {} mode", env);

    let url = app_config
        .postgres_url
        .as_deref()
        .context("postgres_url is not configured")?;
    let db = Database::connect(url)
        .await
        .context("connecting to PostgreSQL")?;
    db.health_check().await?;
    db.init_schema().await.context("initializing schema")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let prices = PriceCache::init(
        Arc::new(PgPriceSource::new(db.pool().clone())),
        clock.clone(),
        &app_config.pricing,
    )
    .await
    .context("loading price table")?;

    let webhook = HttpWebhookNotifier::new(Duration::from_millis(app_config.webhook.timeout_ms))?;
    let hub = Arc::new(NotificationHub::new());
    let engine = LedgerEngine::new(
        EngineParts {
            store: Arc::new(PgLedger::new(db.pool().clone())),
            prices: Arc::new(prices),
            webhook: Arc::new(webhook),
            activity: Arc::new(MemoryActivitySink::new(&app_config.activity, clock.clone())),
            hub: hub.clone(),
            clock,
        },
        &app_config.ledger,
    )?;

    tracing::info!(
        reserve = %engine.valuator().reserve_asset(),
        priced_assets = engine.valuator().cache().len(),
        "Ledger engine ready"
    );

    tokio::signal::ctrl_c().await?;
    let (channels, subscriptions) = hub.stats();
    tracing::info!(channels, subscriptions, "Shutting down");
    Ok(())
}
