use oauth2_service::{
    build_router,
    config::{OAuth2Config, StoreBackend},
    services::{EngineSettings, GrantEngine, MemoryStore, MongoDb, StoreHealth, Stores},
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on invalid configuration
    let config = OAuth2Config::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        store = ?config.store,
        "Starting OAuth2 service"
    );

    let (stores, health): (Stores, Arc<dyn StoreHealth>) = match (&config.store, &config.mongodb) {
        (StoreBackend::Mongo, Some(mongodb)) => {
            tracing::info!("Initializing database connections");
            let db = MongoDb::connect(&mongodb.uri, &mongodb.database).await?;
            db.initialize_indexes().await?;
            tracing::info!("Database initialized successfully");

            let db = Arc::new(db);
            let health: Arc<dyn StoreHealth> = db.clone();
            (Stores::from_shared(db), health)
        }
        (StoreBackend::Mongo, None) => {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MongoDB settings are missing"
            )));
        }
        (StoreBackend::Memory, _) => {
            tracing::warn!("Using the in-memory store; state is lost on restart");
            let store = Arc::new(MemoryStore::new());
            let health: Arc<dyn StoreHealth> = store.clone();
            (Stores::from_shared(store), health)
        }
    };

    let code_lifetime = chrono::Duration::try_seconds(config.engine.code_lifetime_seconds)
        .ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "OAUTH2_CODE_LIFETIME_SECONDS is out of range"
            ))
        })?;
    let settings = EngineSettings { code_lifetime };
    let engine = GrantEngine::new(stores, settings);

    let state = AppState {
        config: config.clone(),
        engine,
        health,
    };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
