use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;
use thiserror::Error;

use crate::dtos::ErrorResponse;

/// Failure reported by a store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Duplicate key: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::from(e),
            StoreError::Conflict(key) => AppError::Conflict(anyhow::anyhow!(key)),
            StoreError::Internal(e) => AppError::InternalError(e),
        }
    }
}

/// Why the access policy refused a sign-in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeniedReason {
    #[error("account {account_id} is temporarily blocked")]
    AccountBlocked { account_id: String },

    #[error("account {account_id} is cancelled")]
    AccountCancelled { account_id: String },

    #[error("account {account_id} is disabled")]
    AccountDisabled { account_id: String },

    #[error("account {account_id} is not allowed to sign in")]
    NotAllowedSignin { account_id: String },

    #[error("email of account {account_id} is not confirmed")]
    EmailNotConfirmed { account_id: String },
}

impl DeniedReason {
    pub fn account_id(&self) -> &str {
        match self {
            DeniedReason::AccountBlocked { account_id }
            | DeniedReason::AccountCancelled { account_id }
            | DeniedReason::AccountDisabled { account_id }
            | DeniedReason::NotAllowedSignin { account_id }
            | DeniedReason::EmailNotConfirmed { account_id } => account_id,
        }
    }
}

/// Every failure the grant engine can return.
#[derive(Error, Debug)]
pub enum GrantError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidClient(String),

    #[error("{0}")]
    UnauthorizedClient(String),

    #[error("{0}")]
    UnsupportedGrantType(String),

    #[error("{0}")]
    InvalidGrant(String),

    #[error("{0}")]
    InvalidScope(String),

    #[error("access token is invalid or has expired")]
    TokenExpired,

    #[error("account {account_id} is temporarily blocked")]
    AccountBlocked { account_id: String },

    #[error("account {account_id} is cancelled")]
    AccountCancelled { account_id: String },

    #[error("account {account_id} is disabled")]
    AccountDisabled { account_id: String },

    #[error("email of account {account_id} is not confirmed")]
    EmailNotConfirmed { account_id: String },

    #[error("account {account_id} is not allowed to sign in")]
    NotAllowedSignin { account_id: String },

    #[error("account {account_id} is not registered in this project")]
    AccountNotRegistered { account_id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<DeniedReason> for GrantError {
    fn from(reason: DeniedReason) -> Self {
        match reason {
            DeniedReason::AccountBlocked { account_id } => {
                GrantError::AccountBlocked { account_id }
            }
            DeniedReason::AccountCancelled { account_id } => {
                GrantError::AccountCancelled { account_id }
            }
            DeniedReason::AccountDisabled { account_id } => {
                GrantError::AccountDisabled { account_id }
            }
            DeniedReason::NotAllowedSignin { account_id } => {
                GrantError::NotAllowedSignin { account_id }
            }
            DeniedReason::EmailNotConfirmed { account_id } => {
                GrantError::EmailNotConfirmed { account_id }
            }
        }
    }
}

impl GrantError {
    /// Stable snake_case kind used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            GrantError::InvalidRequest(_) => "invalid_request",
            GrantError::InvalidClient(_) => "invalid_client",
            GrantError::UnauthorizedClient(_) => "unauthorized_client",
            GrantError::UnsupportedGrantType(_) => "unsupported_grant_type",
            GrantError::InvalidGrant(_) => "invalid_grant",
            GrantError::InvalidScope(_) => "invalid_scope",
            GrantError::TokenExpired => "token_expired",
            GrantError::AccountBlocked { .. } => "account_blocked",
            GrantError::AccountCancelled { .. } => "account_cancelled",
            GrantError::AccountDisabled { .. } => "account_disabled",
            GrantError::EmailNotConfirmed { .. } => "email_not_confirmed",
            GrantError::NotAllowedSignin { .. } => "not_allowed_signin",
            GrantError::AccountNotRegistered { .. } => "account_not_registered",
            GrantError::Store(_) => "server_error",
        }
    }

    /// Account the error concerns, for policy errors.
    pub fn account_id(&self) -> Option<&str> {
        match self {
            GrantError::AccountBlocked { account_id }
            | GrantError::AccountCancelled { account_id }
            | GrantError::AccountDisabled { account_id }
            | GrantError::EmailNotConfirmed { account_id }
            | GrantError::NotAllowedSignin { account_id }
            | GrantError::AccountNotRegistered { account_id } => Some(account_id),
            _ => None,
        }
    }

    pub fn is_policy_error(&self) -> bool {
        matches!(
            self,
            GrantError::AccountBlocked { .. }
                | GrantError::AccountCancelled { .. }
                | GrantError::AccountDisabled { .. }
                | GrantError::EmailNotConfirmed { .. }
                | GrantError::NotAllowedSignin { .. }
                | GrantError::AccountNotRegistered { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GrantError::InvalidClient(_) | GrantError::TokenExpired => StatusCode::UNAUTHORIZED,
            GrantError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            e if e.is_policy_error() => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GrantError {
    fn into_response(self) -> Response {
        let description = match &self {
            GrantError::Store(e) => {
                tracing::error!(error = %e, "Store failure while serving OAuth2 request");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            error_description: description,
            account_id: self.account_id().map(str::to_string),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_reason_maps_to_matching_kind() {
        let err = GrantError::from(DeniedReason::AccountCancelled {
            account_id: "user_1".to_string(),
        });
        assert!(matches!(
            err,
            GrantError::AccountCancelled { ref account_id } if account_id == "user_1"
        ));
        assert_eq!(err.code(), "account_cancelled");
        assert_eq!(err.account_id(), Some("user_1"));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GrantError::InvalidClient("bad".to_string()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GrantError::InvalidGrant("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GrantError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GrantError::Store(StoreError::Conflict("code".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_error_hides_details() {
        let err = GrantError::Store(StoreError::Internal(anyhow::anyhow!("socket closed")));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
