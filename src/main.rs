use std::sync::Arc;

use diesel_migrations::MigrationHarness;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deskserver::config::AppConfig;
use deskserver::email::SmtpSender;
use deskserver::shared::state::AppState;
use deskserver::shared::utils::create_conn;
use deskserver::MIGRATIONS;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let pool = create_conn(&config.database_url)?;

    {
        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    }

    let mailer = Arc::new(SmtpSender::new(config.email.clone()));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(pool, config, mailer));

    let app = deskserver::build_router(state);

    info!("Starting HTTP server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
