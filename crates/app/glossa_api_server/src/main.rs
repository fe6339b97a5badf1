//! Glossa API server binary.
//!
//! Connects to PostgreSQL, applies migrations and serves the authentication
//! API until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use glossa_api::AppState;
use glossa_api::config::ApiConfig;
use glossa_core::mail::LogMailer;
use glossa_core::rate_limit::RateLimitAction;
use glossa_core::store::{MemoryStore, PgStore, Store};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "glossa_api_server", about = "Glossa authentication API server")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long, env = "BIND_ADDR")]
    bind_addr: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/glossa"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep everything in process memory instead of PostgreSQL. Development only.
    #[arg(long, default_value_t = false)]
    memory_store: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,glossa_api=debug,glossa_core=debug")
                }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    config.pg_connection_url = args.database_url;

    let store: Arc<dyn Store> = if args.memory_store {
        warn!("using in-memory store; all data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.pg_connection_url)
            .await?;

        info!("running database migrations");
        glossa_api::migrate(&pool).await?;
        Arc::new(PgStore::new(pool))
    };

    if config.production && config.app_base_url.starts_with("http://") {
        warn!(app_base_url = %config.app_base_url, "production links are not https");
    }

    let state = AppState::new(store, config.clone(), Arc::new(LogMailer));
    spawn_limiter_pruning(&state);
    let audit = state.audit.clone();

    let app = glossa_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, production = config.production, "REST API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    audit.flush().await;
    info!("shut down");
    Ok(())
}

/// Drop expired session-read windows once a minute.
fn spawn_limiter_pruning(state: &AppState) {
    let limiter = state.read_limiter.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            limiter.prune(RateLimitAction::SessionRead.rule(), chrono::Utc::now());
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
