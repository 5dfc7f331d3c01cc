//! Handler plumbing shared by every API endpoint.
//!
//! The axum fallback hands each request to [`dispatch_request`], which looks the
//! path up in the route table, resolves the caller's identity once, and runs the
//! matched handler with an owned [`ApiRequest`].

use axum::{
    body::Bytes,
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use std::{future::Future, pin::Pin, sync::Arc};

use crate::{
    AppState,
    auth::{AuthError, Identity, identify},
    error::ApiError,
    response::ApiResponse,
    router::{PathParams, RouteTable},
};

pub mod financial;
pub mod messages;

/// Largest request body accepted, matching the gateway payload limit.
pub const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

pub type HandlerResult = Result<ApiResponse, ApiError>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// BoxedHandler
///
/// A type-erased endpoint stored in the route table.
pub type BoxedHandler = Arc<dyn Fn(AppState, ApiRequest) -> HandlerFuture + Send + Sync>;

/// Wraps an `async fn(AppState, ApiRequest) -> HandlerResult` for registration.
pub fn handler<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(AppState, ApiRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |state, request| Box::pin(f(state, request)))
}

/// ApiRequest
///
/// Everything a handler may look at. `identity` is resolved before the handler
/// runs; handlers that need a caller call [`ApiRequest::identity`].
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub params: PathParams,
    pub identity: Result<Identity, AuthError>,
    pub body: Bytes,
}

impl ApiRequest {
    /// The validated caller, or 403.
    pub fn identity(&self) -> Result<&Identity, ApiError> {
        self.identity.as_ref().map_err(|e| {
            tracing::warn!(
                method = %self.method,
                path = %self.path,
                reason = %e,
                "request without valid identity"
            );
            ApiError::Unauthorized(e.clone())
        })
    }

    /// A non-empty path variable, or 400 `"<label> is missing"`.
    pub fn param(&self, name: &str, label: &str) -> Result<&str, ApiError> {
        self.params
            .get(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::validation(format!("{label} is missing")))
    }

    /// The body parsed as JSON, or 400 `Invalid request body`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            tracing::debug!(path = %self.path, error = %e, "unparseable request body");
            ApiError::validation("Invalid request body")
        })
    }
}

/// dispatch_request
///
/// Routes one request through `routes`. Unmatched method/path pairs get 404.
pub async fn dispatch_request(
    routes: &RouteTable<BoxedHandler>,
    state: AppState,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let Some(matched) = routes.dispatch(&method, path) else {
        tracing::debug!(%method, path, "no route matched");
        return ApiError::RouteNotFound.into_response();
    };

    tracing::debug!(%method, route = matched.template, "route matched");
    let identity = identify(headers, &state.config);
    let request = ApiRequest {
        method,
        path: path.to_string(),
        params: matched.params,
        identity,
        body,
    };

    match (matched.handler)(state, request).await {
        Ok(response) => response.into_response(),
        Err(err) => err.into_response(),
    }
}
