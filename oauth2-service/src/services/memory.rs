//! In-process store backing tests and local runs without MongoDB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{
    AccountStore, ClientStore, CodeStore, ProjectStore, StoreError, StoreHealth, TokenStore,
};
use crate::models::{Account, Application, AuthorizationCode, Profile, Project, Token};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

#[derive(Default)]
struct MemoryState {
    applications: HashMap<String, Application>,
    projects: HashMap<String, Project>,
    accounts: HashMap<String, (Account, PasswordHashString)>,
    profiles: HashMap<(String, String), Profile>,
    codes: HashMap<String, AuthorizationCode>,
    /// Keyed by access token.
    tokens: HashMap<String, Token>,
}

impl MemoryState {
    fn access_key_for_refresh(&self, refresh_token: &str) -> Option<String> {
        self.tokens
            .values()
            .find(|token| token.refresh_token.as_deref() == Some(refresh_token))
            .map(|token| token.access_token.clone())
    }
}

/// Every operation takes one lock, so take and refresh are atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Internal(anyhow::anyhow!("memory store lock poisoned")))
    }

    pub fn insert_application(&self, application: Application) -> Result<(), StoreError> {
        self.state()?
            .applications
            .insert(application.id.clone(), application);
        Ok(())
    }

    pub fn insert_project(&self, project: Project) -> Result<(), StoreError> {
        self.state()?.projects.insert(project.id.clone(), project);
        Ok(())
    }

    /// Store an account with the password it signs in with.
    pub fn insert_account(&self, account: Account, password: &str) -> Result<(), StoreError> {
        let hash = hash_password(&Password::new(password))?;
        self.insert_account_hashed(account, hash)
    }

    pub fn insert_account_hashed(
        &self,
        account: Account,
        password_hash: PasswordHashString,
    ) -> Result<(), StoreError> {
        self.state()?
            .accounts
            .insert(account.id.clone(), (account, password_hash));
        Ok(())
    }

    /// Replace a stored account, keeping its password.
    pub fn update_account(&self, account: Account) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        match state.accounts.get_mut(&account.id) {
            Some(entry) => {
                entry.0 = account;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn insert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        self.state()?.profiles.insert(
            (profile.user_id.clone(), profile.project_id.clone()),
            profile,
        );
        Ok(())
    }

    /// Raw token record, expired or not.
    pub fn token_record(&self, access_token: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.state()?.tokens.get(access_token).cloned())
    }

    /// Write a token record as is, bypassing issuance checks.
    pub fn put_token(&self, token: Token) -> Result<(), StoreError> {
        self.state()?
            .tokens
            .insert(token.access_token.clone(), token);
        Ok(())
    }

    pub fn code_count(&self) -> Result<usize, StoreError> {
        Ok(self.state()?.codes.len())
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn get(&self, id: &str, secret: Option<&str>) -> Result<Option<Application>, StoreError> {
        let application = self.state()?.applications.get(id).cloned();
        Ok(application.filter(|app| secret.map_or(true, |secret| app.verify_secret(secret))))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .state()?
            .accounts
            .get(id)
            .map(|(account, _)| account.clone()))
    }

    async fn get_by_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Account>, StoreError> {
        let candidate = self
            .state()?
            .accounts
            .values()
            .find(|(account, _)| account.find_email(username).is_some())
            .cloned();

        // Hash verification is slow; keep it outside the lock.
        let Some((account, hash)) = candidate else {
            return Ok(None);
        };
        if verify_password(&Password::new(password), &hash)? {
            Ok(Some(account))
        } else {
            Ok(None)
        }
    }

    async fn get_profile(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Option<Profile>, StoreError> {
        Ok(self
            .state()?
            .profiles
            .get(&(user_id.to_string(), project_id.to_string()))
            .cloned())
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.state()?.projects.get(id).cloned())
    }
}

#[async_trait]
impl CodeStore for MemoryStore {
    async fn create(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.codes.contains_key(&code.code) {
            return Err(StoreError::Conflict("authorization code".to_string()));
        }
        state.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn find_active(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self
            .state()?
            .codes
            .get(code)
            .filter(|code| !code.is_expired_at(now))
            .cloned())
    }

    async fn take(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self.state()?.codes.remove(code))
    }

    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.state()?.codes.remove(code).is_some())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create(&self, token: &Token) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.tokens.contains_key(&token.access_token) {
            return Err(StoreError::Conflict("access token".to_string()));
        }
        if let Some(refresh_token) = &token.refresh_token {
            if state.access_key_for_refresh(refresh_token).is_some() {
                return Err(StoreError::Conflict("refresh token".to_string()));
            }
        }
        state
            .tokens
            .insert(token.access_token.clone(), token.clone());
        Ok(())
    }

    async fn find_active_access(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, StoreError> {
        Ok(self
            .state()?
            .tokens
            .get(access_token)
            .filter(|token| token.access_active_at(now))
            .cloned())
    }

    async fn find_active_refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, StoreError> {
        let state = self.state()?;
        Ok(state
            .access_key_for_refresh(refresh_token)
            .and_then(|key| state.tokens.get(&key))
            .filter(|token| token.refresh_active_at(now))
            .cloned())
    }

    async fn refresh_access(
        &self,
        refresh_token: &str,
        new_access_token: &str,
        access_token_expires_at: DateTime<Utc>,
        keep: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, StoreError> {
        let mut state = self.state()?;
        if state.tokens.contains_key(new_access_token) {
            return Err(StoreError::Conflict("access token".to_string()));
        }

        let Some(key) = state.access_key_for_refresh(refresh_token) else {
            return Ok(None);
        };
        let Some(mut token) = state.tokens.remove(&key) else {
            return Ok(None);
        };
        if !token.refresh_active_at(now) {
            state.tokens.insert(key, token);
            return Ok(None);
        }

        token.access_token = new_access_token.to_string();
        token.access_token_expires_at = access_token_expires_at;
        token.keep = keep;
        state
            .tokens
            .insert(token.access_token.clone(), token.clone());
        Ok(Some(token))
    }

    async fn revoke_access(&self, access_token: &str) -> Result<bool, StoreError> {
        Ok(self.state()?.tokens.remove(access_token).is_some())
    }

    async fn revoke_refresh(&self, refresh_token: &str) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        let Some(key) = state.access_key_for_refresh(refresh_token) else {
            return Ok(false);
        };
        match state.tokens.get_mut(&key) {
            Some(token) => {
                token.refresh_token = None;
                token.refresh_token_expires_at = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.state().map(|_| ())
    }
}
