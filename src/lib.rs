use axum::{
    Router,
    extract::{Request, State},
    http::HeaderName,
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core engines: path routing, user enrichment and the store adapter.
pub mod enrich;
pub mod router;
pub mod store;

// HTTP surface.
pub mod auth;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

// Outbound services and configuration.
pub mod assistant;
pub mod config;
pub mod models;
pub mod storage;

// --- Public Re-exports ---

pub use assistant::{AssistantState, HttpAssistant, MockAssistant};
pub use config::AppConfig;
pub use storage::{MockStorageService, S3StorageClient, StorageState};
pub use store::{Catalog, DynamoStore, MemoryStore, StoreState};

use enrich::UserDirectory;
use error::ApiError;
use handlers::{BoxedHandler, MAX_BODY_BYTES, dispatch_request, financial, messages};
use router::RouteTable;

/// ApiDoc
///
/// OpenAPI description of every API endpoint and schema, served at
/// `/api-docs/openapi.json` behind the Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        messages::list_messages, messages::post_message,
        financial::list_groups, financial::get_group, financial::list_group_users,
        financial::list_group_expenses, financial::create_expense, financial::get_expense,
        financial::list_categories, financial::list_split_types,
        financial::create_receipt_upload,
    ),
    components(
        schemas(
            models::UserView, models::Participant, models::Expense, models::GroupMember,
            models::ChatMessage, models::PostMessageRequest, models::CreateExpenseRequest,
            models::ReceiptUploadRequest, models::ReceiptUploadResponse,
        )
    ),
    tags(
        (name = "vassistant", description = "Chat assistant and expense splitter API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of every service a handler may use. Each
/// service sits behind an `Arc<dyn Trait>` so tests can substitute in-memory
/// implementations.
#[derive(Clone)]
pub struct AppState {
    /// Store adapter (DynamoDB or in-memory).
    pub store: StoreState,
    /// Configured table names bound to their schemas.
    pub tables: Arc<Catalog>,
    /// Chat assistant client.
    pub assistant: AssistantState,
    /// Receipt upload URL signer.
    pub storage: StorageState,
    pub config: AppConfig,
}

impl AppState {
    /// Batched user lookup over the users table, for enrichment.
    pub fn user_directory(&self) -> UserDirectory {
        UserDirectory::new(self.store.clone(), self.tables.users.clone())
    }
}

/// create_router
///
/// Assembles the HTTP application. `/health` and the Swagger UI are plain axum
/// routes; every other request falls through to the API route table, which is
/// built once here with the configured base path.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. API Route Table
    let api = Arc::new(routes::api_routes(&state.config.api_base_path));
    tracing::debug!(routes = api.len(), base_path = %state.config.api_base_path, "route table built");

    // 3. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(|| async { "ok" }))
        .fallback(move |State(state): State<AppState>, request: Request| {
            let api = Arc::clone(&api);
            async move { serve_api(&api, state, request).await }
        })
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// serve_api
///
/// Buffers the body and hands the request to the route table.
async fn serve_api(api: &RouteTable<BoxedHandler>, state: AppState, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "request body rejected");
            return ApiError::validation("Invalid request body").into_response();
        }
    };

    dispatch_request(
        api,
        state,
        parts.method,
        parts.uri.path(),
        &parts.headers,
        body,
    )
    .await
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying method, URI and the `x-request-id`, so every log
/// line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
