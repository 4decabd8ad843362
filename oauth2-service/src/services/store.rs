//! Collaborator interfaces the grant engine reads and writes through.
//!
//! Every call is async and may cross the network. Implementations own their
//! own retry policy; the engine never retries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::StoreError;
use crate::models::{Account, Application, AuthorizationCode, Profile, Project, Token};

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Fetch an application. With a secret, only returns it when the secret
    /// matches.
    async fn get(&self, id: &str, secret: Option<&str>) -> Result<Option<Application>, StoreError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Account>, StoreError>;

    /// Look an account up by one of its email addresses and check the password.
    async fn get_by_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn get_profile(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Option<Profile>, StoreError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Project>, StoreError>;
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Persist a new code. A duplicate value fails with `StoreError::Conflict`.
    async fn create(&self, code: &AuthorizationCode) -> Result<(), StoreError>;

    /// Unexpired code by value. Expired records are invisible.
    async fn find_active(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Atomically remove and return a code, expired or not. Of two concurrent
    /// callers at most one receives the record.
    async fn take(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError>;

    async fn delete(&self, code: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a new token. Duplicate access or refresh values fail with
    /// `StoreError::Conflict`.
    async fn create(&self, token: &Token) -> Result<(), StoreError>;

    async fn find_active_access(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, StoreError>;

    async fn find_active_refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, StoreError>;

    /// Atomically swap in a new access token, its expiry and `keep` flag on
    /// the record holding an active refresh token. Returns the updated record.
    async fn refresh_access(
        &self,
        refresh_token: &str,
        new_access_token: &str,
        access_token_expires_at: DateTime<Utc>,
        keep: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, StoreError>;

    /// Delete the whole record. `false` when nothing matched.
    async fn revoke_access(&self, access_token: &str) -> Result<bool, StoreError>;

    /// Clear the refresh fields, leaving the access token usable. `false`
    /// when nothing matched.
    async fn revoke_refresh(&self, refresh_token: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// The store handles injected into the engine.
#[derive(Clone)]
pub struct Stores {
    pub clients: Arc<dyn ClientStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub codes: Arc<dyn CodeStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl Stores {
    /// Use one backend for every collaborator.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: ClientStore + AccountStore + ProjectStore + CodeStore + TokenStore + 'static,
    {
        Self {
            clients: store.clone(),
            accounts: store.clone(),
            projects: store.clone(),
            codes: store.clone(),
            tokens: store,
        }
    }
}
