//! Making Tax Digital submission API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use mtd_core::store::PgStore;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "mtd_api_server", about = "Making Tax Digital submission API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/mtd"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mtd_api=debug,mtd_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    // Refuse to start with a category table that would drop figures.
    mtd_core::boxes::validate_mapping()?;

    let mut config = mtd_api::config::ApiConfig::from_env()?;
    config.bind_addr = args.bind_addr;
    config.pg_connection_url = args.database_url;

    info!(
        environment = %config.mtd.environment,
        hmrc = %config.mtd.api_base_url,
        max_connections = args.max_connections,
        "starting mtd_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    mtd_api::migrate(&pool).await?;

    let store = Arc::new(PgStore::new(pool, config.mtd.encryption_key.clone()));
    let state = mtd_api::AppState::new(config.clone(), store);
    let app = mtd_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
