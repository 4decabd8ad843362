use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{AuthorizationCode, Token, TokenType};
use crate::services::AuthContext;

/// Network facts about the caller, checked against the client restriction.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub ip: Option<String>,
    pub origin: Option<String>,
}

/// Body of `POST /oauth2/token`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[schema(example = "password")]
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    /// Space-joined scope list.
    #[schema(example = "read write")]
    pub scope: Option<String>,
    #[serde(skip)]
    pub caller: CallerContext,
}

/// Body of `POST /oauth2/authorize`. The user id comes from the session
/// layer in front of this service.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    #[serde(skip)]
    pub caller: CallerContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

/// Body of `POST /oauth2/revoke`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: String,
    pub token_type_hint: Option<TokenTypeHint>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Milliseconds since epoch.
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<i64>,
    #[schema(example = "read default user")]
    pub scope: String,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            access_token: token.access_token,
            token_type: "Bearer".to_string(),
            expires_at: token.access_token_expires_at.timestamp_millis(),
            refresh_token: token.refresh_token,
            refresh_token_expires_at: token
                .refresh_token_expires_at
                .map(|expires| expires.timestamp_millis()),
            scope: token.scope.to_wire(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeResponse {
    pub code: String,
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizeResponse {
    pub fn new(code: AuthorizationCode, state: Option<String>) -> Self {
        Self {
            code: code.code,
            expires_at: code.expires_at.timestamp_millis(),
            redirect_uri: code.redirect_uri,
            scope: code.scope.to_wire(),
            state,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntrospectResponse {
    pub active: bool,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub scope: String,
    #[schema(example = "user")]
    pub token_type: String,
    pub expires_at: i64,
}

impl From<&AuthContext> for IntrospectResponse {
    fn from(context: &AuthContext) -> Self {
        let token_type = match context.token_type {
            TokenType::Module => "module",
            TokenType::Application => "application",
            TokenType::User => "user",
            TokenType::UserSocial => "user_social",
        };
        Self {
            active: true,
            client_id: context.application.id.clone(),
            user_id: context.account.as_ref().map(|account| account.id.clone()),
            scope: context.scope.to_wire(),
            token_type: token_type.to_string(),
            expires_at: context.expires_at.timestamp_millis(),
        }
    }
}
