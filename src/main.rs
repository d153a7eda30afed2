use chrono::Duration;
use doodle_dome::{
    AppState, BcryptJwtCredentials, SystemClock,
    bootstrap::ensure_default_admin,
    clock::ClockState,
    config::{AppConfig, Env},
    create_router,
    credentials::CredentialState,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::{error::Error, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, connects to Postgres, applies the
/// schema, makes sure an admin exists and starts the HTTP server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let config = AppConfig::load()?;

    // RUST_LOG wins; otherwise debug for this crate, info for the HTTP layer.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "doodle_dome=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "failed to connect to Postgres"))?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database schema up to date");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;
    let credentials = Arc::new(BcryptJwtCredentials::new(
        config.jwt_secret.clone(),
        Duration::hours(config.jwt_expires_in_hours),
        config.bcrypt_cost,
    )) as CredentialState;
    let clock = Arc::new(SystemClock) as ClockState;

    // Failures are logged inside and never abort startup.
    ensure_default_admin(repo.as_ref(), credentials.as_ref(), &config).await;

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        credentials,
        clock,
        config,
    });

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    axum::serve(listener, app).await?;
    Ok(())
}
