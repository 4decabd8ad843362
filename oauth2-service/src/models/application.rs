use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::ScopeSet;

/// Lifetime sentinel meaning "never expires".
pub const NEVER_EXPIRES: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    Password,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported grant type: {0}")]
pub struct UnknownGrantType(pub String);

impl FromStr for GrantType {
    type Err = UnknownGrantType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "password" => Ok(GrantType::Password),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(UnknownGrantType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Enabled,
    Disabled,
    Cancelled,
}

/// OAuth2 client registered under a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    #[serde(rename = "_id")]
    pub id: String,
    /// SHA-256 of the client secret, hex encoded.
    pub secret_hash: String,
    pub project_id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub grants: Vec<GrantType>,
    pub scope: ScopeSet,
    /// Seconds. `None` falls back to the project default, `-1` never expires.
    #[serde(default)]
    pub access_token_lifetime: Option<i64>,
    #[serde(default)]
    pub refresh_token_lifetime: Option<i64>,
    /// IP addresses or origins allowed to use this client. Empty allows all.
    #[serde(default)]
    pub restriction: Vec<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub status: ApplicationStatus,
}

impl Application {
    pub fn new(
        id: String,
        secret: &str,
        project_id: String,
        grants: Vec<GrantType>,
        scope: ScopeSet,
    ) -> Self {
        Self {
            id,
            secret_hash: Self::hash_secret(secret),
            project_id,
            owner_id: None,
            grants,
            scope,
            access_token_lifetime: None,
            refresh_token_lifetime: None,
            restriction: Vec::new(),
            redirect_uris: Vec::new(),
            status: ApplicationStatus::Enabled,
        }
    }

    pub fn hash_secret(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify_secret(&self, secret: &str) -> bool {
        let candidate = Self::hash_secret(secret);
        candidate
            .as_bytes()
            .ct_eq(self.secret_hash.as_bytes())
            .into()
    }

    pub fn is_enabled(&self) -> bool {
        self.status == ApplicationStatus::Enabled
    }

    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grants.contains(&grant)
    }

    /// Checks the restriction list against the caller's IP or origin.
    pub fn allows_caller(&self, ip: Option<&str>, origin: Option<&str>) -> bool {
        if self.restriction.is_empty() {
            return true;
        }
        [ip, origin]
            .into_iter()
            .flatten()
            .any(|candidate| self.restriction.iter().any(|allowed| allowed == candidate))
    }

    pub fn allows_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.is_empty() || self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    pub fn is_owned_by(&self, subject_id: &str) -> bool {
        self.owner_id.as_deref() == Some(subject_id)
    }
}
