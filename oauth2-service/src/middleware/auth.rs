use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::dtos::ErrorResponse;
use crate::models::ScopeSet;
use crate::services::{AuthContext, GrantEngine};

/// State for [`auth_middleware`]: the engine plus the scope a route demands.
#[derive(Clone)]
pub struct ScopedAuth {
    pub engine: GrantEngine,
    pub required: ScopeSet,
}

impl ScopedAuth {
    pub fn new(engine: GrantEngine, required: ScopeSet) -> Self {
        Self { engine, required }
    }
}

/// Require a valid bearer access token carrying the configured scope.
pub async fn auth_middleware(
    State(auth): State<ScopedAuth>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let token = match token {
        Some(token) => token.to_string(),
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "invalid_request".to_string(),
                    error_description: "Missing or invalid Authorization header".to_string(),
                    account_id: None,
                }),
            )
                .into_response());
        }
    };

    let context = auth
        .engine
        .authenticate(&token, &auth.required)
        .await
        .map_err(IntoResponse::into_response)?;

    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

/// Extractor for the context stored by [`auth_middleware`].
pub struct Authenticated(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<AuthContext>().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "server_error".to_string(),
                error_description: "Auth context missing from request extensions".to_string(),
                account_id: None,
            }),
        ))?;

        Ok(Authenticated(context.clone()))
    }
}
