pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::OAuth2Config;
use crate::middleware::ScopedAuth;
use crate::models::ScopeSet;
use crate::services::{GrantEngine, StoreHealth};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::oauth2::authorize,
        handlers::oauth2::token,
        handlers::oauth2::revoke,
        handlers::oauth2::introspect,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::oauth2::AuthorizeRequest,
            dtos::oauth2::AuthorizeResponse,
            dtos::oauth2::TokenRequest,
            dtos::oauth2::TokenResponse,
            dtos::oauth2::TokenTypeHint,
            dtos::oauth2::RevokeRequest,
            dtos::oauth2::RevokeResponse,
            dtos::oauth2::IntrospectResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "OAuth2", description = "Grant, token and revocation endpoints"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: OAuth2Config,
    pub engine: GrantEngine,
    pub health: Arc<dyn StoreHealth>,
}

pub fn build_router(state: AppState) -> Router {
    // Any valid token may introspect itself.
    let introspect_auth = ScopedAuth::new(state.engine.clone(), ScopeSet::new());

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { service_core::axum::Json(ApiDoc::openapi()) }),
        )
        .route("/oauth2/authorize", post(handlers::authorize))
        .route("/oauth2/token", post(handlers::token))
        .route("/oauth2/revoke", post(handlers::revoke))
        .merge(
            Router::new()
                .route("/oauth2/introspect", get(handlers::introspect))
                .layer(from_fn_with_state(
                    introspect_auth,
                    middleware::auth_middleware,
                )),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        // Outermost so the trace span sees the request id
        .layer(from_fn(request_id_middleware))
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<service_core::axum::Json<serde_json::Value>, AppError> {
    state.health.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(service_core::axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up"
        }
    })))
}
