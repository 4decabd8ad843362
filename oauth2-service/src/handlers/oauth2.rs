use std::net::{IpAddr, SocketAddr};

use service_core::axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Form, Json,
};

use crate::{
    dtos::oauth2::{
        AuthorizeRequest, AuthorizeResponse, CallerContext, IntrospectResponse, RevokeRequest,
        RevokeResponse, TokenRequest, TokenResponse,
    },
    dtos::ErrorResponse,
    middleware::Authenticated,
    services::GrantError,
    AppState,
};

/// Caller facts for the client restriction check.
///
/// The IP is the socket peer. When the peer is a trusted proxy, the
/// `x-forwarded-for` chain is walked from the right and the first hop that is
/// not itself a trusted proxy is used instead.
pub fn caller_context(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> CallerContext {
    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                value
                    .rsplit(',')
                    .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
                    .find(|hop| !trusted_proxies.contains(hop))
            })
    };

    let ip = match peer {
        Some(peer) if trusted_proxies.contains(&peer) => Some(forwarded().unwrap_or(peer)),
        other => other,
    };

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    CallerContext {
        ip: ip.map(|ip| ip.to_string()),
        origin,
    }
}

fn peer_ip(connect_info: Option<ConnectInfo<SocketAddr>>) -> Option<IpAddr> {
    connect_info.map(|ConnectInfo(addr)| addr.ip())
}

/// Issue an authorization code for an authenticated user
#[utoipa::path(
    post,
    path = "/oauth2/authorize",
    request_body(content = AuthorizeRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Authorization code issued", body = AuthorizeResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Unknown or disabled client", body = ErrorResponse),
        (status = 403, description = "User may not sign in", body = ErrorResponse)
    ),
    tag = "OAuth2"
)]
pub async fn authorize(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Form(mut req): Form<AuthorizeRequest>,
) -> Result<impl IntoResponse, GrantError> {
    req.caller = caller_context(
        &headers,
        peer_ip(connect_info),
        &state.config.trusted_proxies,
    );
    let state_param = req.state.clone();

    let code = state.engine.authorize(req).await?;
    Ok((StatusCode::OK, Json(AuthorizeResponse::new(code, state_param))))
}

/// Token endpoint for every supported grant
#[utoipa::path(
    post,
    path = "/oauth2/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or scope", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 403, description = "User may not sign in", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "OAuth2"
)]
pub async fn token(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Form(mut req): Form<TokenRequest>,
) -> Result<impl IntoResponse, GrantError> {
    req.caller = caller_context(
        &headers,
        peer_ip(connect_info),
        &state.config.trusted_proxies,
    );

    let token = state.engine.token(req).await?;
    Ok((StatusCode::OK, Json(TokenResponse::from(token))))
}

/// Revoke an access or refresh token
#[utoipa::path(
    post,
    path = "/oauth2/revoke",
    request_body(content = RevokeRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Revocation result", body = RevokeResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "OAuth2"
)]
pub async fn revoke(
    State(state): State<AppState>,
    Form(req): Form<RevokeRequest>,
) -> Result<impl IntoResponse, GrantError> {
    let revoked = state.engine.revoke(&req.token, req.token_type_hint).await?;
    Ok((StatusCode::OK, Json(RevokeResponse { revoked })))
}

/// Describe the bearer token of the request
#[utoipa::path(
    get,
    path = "/oauth2/introspect",
    responses(
        (status = 200, description = "Token is active", body = IntrospectResponse),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorResponse),
        (status = 403, description = "User may no longer sign in", body = ErrorResponse)
    ),
    tag = "OAuth2",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn introspect(Authenticated(context): Authenticated) -> impl IntoResponse {
    Json(IntrospectResponse::from(&context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::HeaderValue;

    fn ip(raw: &str) -> IpAddr {
        raw.parse().expect("ip")
    }

    fn forwarded(chain: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(chain));
        headers
    }

    #[test]
    fn test_direct_peer_ignores_forwarded_header() {
        let caller = caller_context(&forwarded("203.0.113.7"), Some(ip("198.51.100.9")), &[]);
        assert_eq!(caller.ip.as_deref(), Some("198.51.100.9"));
    }

    #[test]
    fn test_trusted_proxy_forwards_client_ip() {
        let proxies = [ip("10.0.0.1")];
        let caller = caller_context(
            &forwarded("203.0.113.7, 10.0.0.1"),
            Some(ip("10.0.0.1")),
            &proxies,
        );
        assert_eq!(caller.ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_trusted_proxy_uses_rightmost_untrusted_hop() {
        // The client prepended a fake hop; the proxy appended the real one.
        let proxies = [ip("10.0.0.1")];
        let caller = caller_context(
            &forwarded("203.0.113.7, 198.51.100.9"),
            Some(ip("10.0.0.1")),
            &proxies,
        );
        assert_eq!(caller.ip.as_deref(), Some("198.51.100.9"));
    }

    #[test]
    fn test_trusted_proxy_without_header_falls_back_to_peer() {
        let proxies = [ip("10.0.0.1")];
        let caller = caller_context(&HeaderMap::new(), Some(ip("10.0.0.1")), &proxies);
        assert_eq!(caller.ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_caller_context_reads_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://app.example.com"));

        let caller = caller_context(&headers, None, &[]);
        assert!(caller.ip.is_none());
        assert_eq!(caller.origin.as_deref(), Some("https://app.example.com"));
    }
}
