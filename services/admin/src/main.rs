use anyhow::Result;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use admin::{AdminCore, catalog, mailer::LogMailer, settings::Settings, store::PgStore};
use common::database;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_max_level(Level::INFO)
        .init();

    info!("Starting admin maintenance service");

    let settings = Settings::load()?;

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let store = PgStore::new(pool);
    store.migrate().await?;

    let core = AdminCore::new(Arc::new(store), Arc::new(LogMailer), settings);
    catalog::seed_permissions(&core.store).await?;

    // Clear what expired while the service was down, then keep sweeping
    let maintenance = core.maintenance();
    let report = maintenance.run_once().await;
    info!(
        sessions = report.sessions,
        reset_tokens = report.reset_tokens,
        "Startup sweep finished"
    );
    let mut scheduler = maintenance
        .start(&core.settings.sweep_schedule)
        .await?;

    info!("Admin maintenance service started successfully");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down admin maintenance service");
    scheduler.shutdown().await?;

    Ok(())
}
