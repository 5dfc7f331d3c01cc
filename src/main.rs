use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vassistant_backend::{
    AppState,
    assistant::{AssistantState, HttpAssistant},
    config::{AppConfig, Env, StoreBackend},
    create_router,
    storage::{S3StorageClient, StorageService, StorageState},
    store::{DynamoStore, MemoryStore, StoreState},
};

/// main
///
/// Loads configuration, installs logging, builds the store, assistant and storage
/// clients, and serves the HTTP application.
#[tokio::main]
async fn main() {
    // 1. Configuration (fails fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise crate debug and request summaries.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vassistant_backend=debug,tower_http=info,axum=info".into());

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

    // 3. Store
    let store = match config.store_backend {
        StoreBackend::DynamoDb => {
            tracing::info!(
                region = %config.aws_region,
                endpoint = ?config.dynamodb_endpoint,
                "using DynamoDB store"
            );
            Arc::new(
                DynamoStore::connect(&config.aws_region, config.dynamodb_endpoint.as_deref())
                    .await,
            ) as StoreState
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new()) as StoreState
        }
    };

    // 4. Assistant and receipt storage
    let assistant = Arc::new(HttpAssistant::new(&config.target_api_hostname)) as AssistantState;

    let s3_client = S3StorageClient::new(
        &config.aws_region,
        config.s3_endpoint.as_deref(),
        &config.s3_bucket,
    )
    .await;
    // LOCAL-ONLY: provision the bucket on an S3-compatible dev endpoint.
    if config.env == Env::Local && config.s3_endpoint.is_some() {
        s3_client.ensure_bucket_exists().await;
    }
    let storage = Arc::new(s3_client) as StorageState;

    // 5. Unified State Assembly
    let bind_address = config.bind_address.clone();
    let app_state = AppState {
        store,
        tables: Arc::new(config.catalog()),
        assistant,
        storage,
        config,
    };

    // 6. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| panic!("FATAL: cannot bind {bind_address}: {e}"));

    tracing::info!("Listening on {bind_address}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_address}/swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server stopped");
    }
}
