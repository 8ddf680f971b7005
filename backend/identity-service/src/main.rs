/// Identity Service Main Entry Point
///
/// Wires the login orchestrator with:
/// - PostgreSQL connection pool (migrations applied at startup)
/// - Configured OAuth providers
/// - Twilio Verify second factor (when configured)
use anyhow::{Context, Result};
use identity_service::{config::Settings, db, telemetry, LoginOrchestrator};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing("identity-service")?;

    let settings = Settings::load().context("Failed to load configuration")?;

    let pool = db::connect(&settings.database)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool).await?;
    info!("Database migrations applied");

    let orchestrator = LoginOrchestrator::from_settings(&settings, pool.clone())?;
    info!(
        issuer = %settings.jwt.issuer,
        base_url = %settings.flow.base_url,
        two_factor = orchestrator.two_factor_enabled(),
        "Identity service ready"
    );

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down identity service");
    pool.close().await;
    Ok(())
}
