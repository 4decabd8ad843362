use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{optional_chrono_datetime_as_bson_datetime, ScopeSet, NEVER_EXPIRES};

/// How far in the future a non-expiring token is dated. Keeps every expiry
/// comparable instead of special-casing null.
pub const KEEP_HORIZON_DAYS: i64 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Module,
    Application,
    User,
    UserSocial,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("a non-expiring token cannot be bound to user {user_id}")]
    KeepBoundToUser { user_id: String },

    #[error("token lifetime {lifetime} is out of range")]
    InvalidLifetime { lifetime: i64 },
}

/// Inputs for a freshly issued token.
#[derive(Debug, Clone)]
pub struct TokenParams {
    pub application_id: String,
    pub user_id: Option<String>,
    pub scope: ScopeSet,
    pub token_type: TokenType,
    /// Access token lifetime in seconds, `-1` for never.
    pub access_lifetime: i64,
    /// Refresh token lifetime in seconds. `None` issues no refresh token.
    pub refresh_lifetime: Option<i64>,
}

/// Access token plus optional refresh token, stored as one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub access_token_expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        with = "optional_chrono_datetime_as_bson_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: ScopeSet,
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub keep: bool,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Expiry for a lifetime in seconds and whether it is the never-expires
/// sentinel. Zero, other negative values and lifetimes past chrono's range
/// are rejected.
pub fn expiry_for(lifetime: i64, now: DateTime<Utc>) -> Result<(DateTime<Utc>, bool), TokenError> {
    if lifetime == NEVER_EXPIRES {
        let expires = Duration::try_days(KEEP_HORIZON_DAYS)
            .and_then(|horizon| now.checked_add_signed(horizon))
            .ok_or(TokenError::InvalidLifetime { lifetime })?;
        return Ok((expires, true));
    }
    if lifetime <= 0 {
        return Err(TokenError::InvalidLifetime { lifetime });
    }

    let expires = Duration::try_seconds(lifetime)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or(TokenError::InvalidLifetime { lifetime })?;
    Ok((expires, false))
}

impl Token {
    /// Generate token values and expiries.
    ///
    /// Fails when a never-expiring access token would represent a user other
    /// than the application itself.
    pub fn issue(params: TokenParams, now: DateTime<Utc>) -> Result<Self, TokenError> {
        let (access_token_expires_at, keep) = expiry_for(params.access_lifetime, now)?;

        if keep {
            if let Some(user_id) = &params.user_id {
                if user_id != &params.application_id {
                    return Err(TokenError::KeepBoundToUser {
                        user_id: user_id.clone(),
                    });
                }
            }
        }

        let (refresh_token, refresh_token_expires_at) = match params.refresh_lifetime {
            Some(lifetime) => (
                Some(crate::utils::generate_token()),
                Some(expiry_for(lifetime, now)?.0),
            ),
            None => (None, None),
        };

        Ok(Self {
            access_token: crate::utils::generate_token(),
            access_token_expires_at,
            refresh_token,
            refresh_token_expires_at,
            scope: params.scope,
            application_id: params.application_id,
            user_id: params.user_id,
            keep,
            token_type: params.token_type,
            created_at: now,
        })
    }

    /// Id of whoever the token speaks for: the user, or the application.
    pub fn subject_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.application_id)
    }

    /// True when a human user distinct from the application is bound.
    pub fn is_user_bound(&self) -> bool {
        self.user_id
            .as_deref()
            .is_some_and(|user_id| user_id != self.application_id)
    }

    /// A non-expiring token bound to a user can only come from a bad write.
    pub fn is_corrupt(&self) -> bool {
        self.keep && self.is_user_bound()
    }

    pub fn access_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.access_token_expires_at
    }

    pub fn refresh_active_at(&self, now: DateTime<Utc>) -> bool {
        self.refresh_token.is_some()
            && self
                .refresh_token_expires_at
                .is_some_and(|expires| now < expires)
    }

    pub fn is_social(&self) -> bool {
        self.token_type == TokenType::UserSocial
    }
}
