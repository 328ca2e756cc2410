use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capstan_client::ExecutorClient;
use capstan_engine::api::{self, AppState};
use capstan_engine::bus::NotificationBus;
use capstan_engine::config::Config;
use capstan_engine::db;
use capstan_engine::service::builder::Builder;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capstan_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Capstan engine...");

    let config = Config::from_env().expect("Invalid configuration");

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let bus = NotificationBus::start(pool.clone())
        .await
        .expect("Failed to start notification bus");

    let http_client = reqwest::Client::builder()
        .timeout(config.executor_request_timeout)
        .build()
        .expect("Failed to build executor HTTP client");
    let executor = ExecutorClient::with_client(config.executor_url.clone(), http_client);

    let builder = Builder::new(pool.clone(), executor, config.external_url.clone());

    let app = api::create_router(AppState { pool, bus, builder });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
