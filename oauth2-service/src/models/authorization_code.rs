use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ScopeSet;

/// Single-use code handed out by `/authorize` and redeemed by `/token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    pub scope: ScopeSet,
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn new(
        application_id: String,
        user_id: Option<String>,
        redirect_uri: Option<String>,
        scope: ScopeSet,
        lifetime: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            code: crate::utils::generate_token(),
            expires_at: now + lifetime,
            redirect_uri,
            scope,
            application_id,
            user_id,
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_expiry() {
        let code = AuthorizationCode::new(
            "app_1".to_string(),
            Some("user_1".to_string()),
            None,
            ScopeSet::parse("read"),
            Duration::seconds(300),
        );

        assert_eq!(code.code.len(), 64);
        assert!(!code.is_expired_at(code.created_at));
        assert!(!code.is_expired_at(code.expires_at - Duration::seconds(1)));
        assert!(code.is_expired_at(code.expires_at));
    }
}
