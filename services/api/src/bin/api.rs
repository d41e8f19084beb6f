//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, MemoryStore, SampleReceiptScanner, SampleShelfLife},
    config::{Config, StoreBackend},
    error::ApiError,
    web::{self, state::AppState},
};
use pantry_core::{
    AuthGateway, Clock, IdentityProvider, PantryBackend, PantryStore, ReceiptScanner,
    ShelfLifeLookup, SystemClock,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Connects the configured backend. Both ports come from the same adapter.
async fn open_backend(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> Result<(Arc<dyn PantryBackend>, Arc<dyn IdentityProvider>), ApiError> {
    match config.backend {
        StoreBackend::Postgres => {
            let database_url = config.database_url.as_deref().ok_or_else(|| {
                ApiError::Internal("DATABASE_URL is required for the postgres backend".to_string())
            })?;
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");

            let backend: Arc<dyn PantryBackend> = db_adapter.clone();
            let provider: Arc<dyn IdentityProvider> = db_adapter;
            Ok((backend, provider))
        }
        StoreBackend::Memory => {
            let memory = match &config.mock_store_path {
                Some(path) => {
                    info!("Using mock store at {}", path.display());
                    MemoryStore::open(path.clone(), clock).await?
                }
                None => {
                    info!("Using in-memory mock store; data is lost on exit");
                    MemoryStore::new(clock)
                }
            };
            let memory = Arc::new(memory);
            let backend: Arc<dyn PantryBackend> = memory.clone();
            let provider: Arc<dyn IdentityProvider> = memory;
            Ok((backend, provider))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!(backend = ?config.backend, "Configuration loaded. Starting server...");

    // --- 2. Select the Storage Backend ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (backend, provider) = open_backend(&config, clock.clone()).await?;

    // --- 3. Build the Pantry Store, Auth Gateway and Intake Adapters ---
    let store = PantryStore::new(backend, clock.clone());
    let auth = AuthGateway::new(
        provider,
        clock,
        chrono::Duration::days(config.session_ttl_days),
    );
    let scanner: Arc<dyn ReceiptScanner> = Arc::new(SampleReceiptScanner);
    let shelf_life: Arc<dyn ShelfLifeLookup> = Arc::new(SampleShelfLife);

    // --- 4. Build the Shared AppState & Router ---
    let app_state = AppState::new(config.clone(), store, auth, scanner, shelf_life);
    let app = web::router(app_state)?;

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
