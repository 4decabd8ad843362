use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use super::{
    AccountStore, ClientStore, CodeStore, ProjectStore, StoreError, StoreHealth, TokenStore,
};
use crate::models::{Account, Application, AuthorizationCode, Profile, Project, Token};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

const DUPLICATE_KEY: i32 = 11000;

/// Account as stored: the domain record plus its credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDocument {
    #[serde(flatten)]
    pub account: Account,
    pub password_hash: String,
    /// Lowercased addresses for credential lookups.
    #[serde(default)]
    pub email_keys: Vec<String>,
}

impl AccountDocument {
    pub fn new(account: Account, password_hash: PasswordHashString) -> Self {
        let email_keys = account
            .emails
            .iter()
            .map(|email| email.address.to_lowercase())
            .collect();
        Self {
            account,
            password_hash: password_hash.into_string(),
            email_keys,
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

fn map_write_error(err: mongodb::error::Error, key: &str) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Conflict(key.to_string())
    } else {
        StoreError::Database(err)
    }
}

fn bson_now(now: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_chrono(now)
}

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for oauth2-service");

        let code_index = IndexModel::builder()
            .keys(doc! { "code": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("code_unique".to_string())
                    .build(),
            )
            .build();
        self.authorization_codes()
            .create_index(code_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create code index on authorization_codes: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created unique index on authorization_codes.code");

        let access_index = IndexModel::builder()
            .keys(doc! { "access_token": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("access_token_unique".to_string())
                    .build(),
            )
            .build();
        // Sparse: client credential tokens carry no refresh token.
        let refresh_index = IndexModel::builder()
            .keys(doc! { "refresh_token": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .sparse(true)
                    .name("refresh_token_unique".to_string())
                    .build(),
            )
            .build();
        self.tokens()
            .create_indexes(vec![access_index, refresh_index], None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create indexes on tokens: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created unique indexes on tokens.access_token and tokens.refresh_token");

        let profile_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "project_id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_project_unique".to_string())
                    .build(),
            )
            .build();
        self.profiles()
            .create_index(profile_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create profile index: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created unique index on profiles.(user_id, project_id)");

        let email_index = IndexModel::builder()
            .keys(doc! { "email_keys": 1 })
            .options(
                IndexOptions::builder()
                    .name("email_lookup".to_string())
                    .build(),
            )
            .build();
        self.accounts()
            .create_index(email_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create email index on accounts: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created index on accounts.email_keys");

        Ok(())
    }

    pub fn applications(&self) -> Collection<Application> {
        self.db.collection("applications")
    }

    pub fn projects(&self) -> Collection<Project> {
        self.db.collection("projects")
    }

    pub fn accounts(&self) -> Collection<AccountDocument> {
        self.db.collection("accounts")
    }

    pub fn profiles(&self) -> Collection<Profile> {
        self.db.collection("profiles")
    }

    pub fn authorization_codes(&self) -> Collection<AuthorizationCode> {
        self.db.collection("authorization_codes")
    }

    pub fn tokens(&self) -> Collection<Token> {
        self.db.collection("tokens")
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn insert_application(&self, application: &Application) -> Result<(), StoreError> {
        self.applications()
            .insert_one(application, None)
            .await
            .map_err(|e| map_write_error(e, "application"))?;
        Ok(())
    }

    pub async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.projects()
            .insert_one(project, None)
            .await
            .map_err(|e| map_write_error(e, "project"))?;
        Ok(())
    }

    pub async fn insert_account(&self, account: Account, password: &str) -> Result<(), StoreError> {
        let hash = hash_password(&Password::new(password))?;
        self.accounts()
            .insert_one(AccountDocument::new(account, hash), None)
            .await
            .map_err(|e| map_write_error(e, "account"))?;
        Ok(())
    }

    pub async fn insert_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        self.profiles()
            .insert_one(profile, None)
            .await
            .map_err(|e| map_write_error(e, "profile"))?;
        Ok(())
    }
}

#[async_trait]
impl ClientStore for MongoDb {
    async fn get(&self, id: &str, secret: Option<&str>) -> Result<Option<Application>, StoreError> {
        let application = self
            .applications()
            .find_one(doc! { "_id": id }, None)
            .await?;
        Ok(application.filter(|app| secret.map_or(true, |secret| app.verify_secret(secret))))
    }
}

#[async_trait]
impl AccountStore for MongoDb {
    async fn get(&self, id: &str) -> Result<Option<Account>, StoreError> {
        let document = self.accounts().find_one(doc! { "_id": id }, None).await?;
        Ok(document.map(|document| document.account))
    }

    async fn get_by_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Account>, StoreError> {
        let document = self
            .accounts()
            .find_one(doc! { "email_keys": username.to_lowercase() }, None)
            .await?;

        let Some(document) = document else {
            return Ok(None);
        };
        let hash = PasswordHashString::new(document.password_hash);
        if verify_password(&Password::new(password), &hash)? {
            Ok(Some(document.account))
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
            .profiles()
            .find_one(doc! { "user_id": user_id, "project_id": project_id }, None)
            .await?)
    }
}

#[async_trait]
impl ProjectStore for MongoDb {
    async fn get(&self, id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.projects().find_one(doc! { "_id": id }, None).await?)
    }
}

#[async_trait]
impl CodeStore for MongoDb {
    async fn create(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        self.authorization_codes()
            .insert_one(code, None)
            .await
            .map_err(|e| map_write_error(e, "authorization code"))?;
        Ok(())
    }

    async fn find_active(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self
            .authorization_codes()
            .find_one(
                doc! { "code": code, "expires_at": { "$gt": bson_now(now) } },
                None,
            )
            .await?)
    }

    async fn take(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self
            .authorization_codes()
            .find_one_and_delete(doc! { "code": code }, None)
            .await?)
    }

    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        let result = self
            .authorization_codes()
            .delete_one(doc! { "code": code }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }
}

#[async_trait]
impl TokenStore for MongoDb {
    async fn create(&self, token: &Token) -> Result<(), StoreError> {
        self.tokens()
            .insert_one(token, None)
            .await
            .map_err(|e| map_write_error(e, "token"))?;
        Ok(())
    }

    async fn find_active_access(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, StoreError> {
        Ok(self
            .tokens()
            .find_one(
                doc! {
                    "access_token": access_token,
                    "access_token_expires_at": { "$gt": bson_now(now) },
                },
                None,
            )
            .await?)
    }

    async fn find_active_refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, StoreError> {
        Ok(self
            .tokens()
            .find_one(
                doc! {
                    "refresh_token": refresh_token,
                    "refresh_token_expires_at": { "$gt": bson_now(now) },
                },
                None,
            )
            .await?)
    }

    async fn refresh_access(
        &self,
        refresh_token: &str,
        new_access_token: &str,
        access_token_expires_at: DateTime<Utc>,
        keep: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.tokens()
            .find_one_and_update(
                doc! {
                    "refresh_token": refresh_token,
                    "refresh_token_expires_at": { "$gt": bson_now(now) },
                },
                doc! {
                    "$set": {
                        "access_token": new_access_token,
                        "access_token_expires_at": bson_now(access_token_expires_at),
                        "keep": keep,
                    }
                },
                options,
            )
            .await
            .map_err(|e| map_write_error(e, "access token"))
    }

    async fn revoke_access(&self, access_token: &str) -> Result<bool, StoreError> {
        let result = self
            .tokens()
            .delete_one(doc! { "access_token": access_token }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn revoke_refresh(&self, refresh_token: &str) -> Result<bool, StoreError> {
        let result = self
            .tokens()
            .update_one(
                doc! { "refresh_token": refresh_token },
                doc! { "$unset": { "refresh_token": "", "refresh_token_expires_at": "" } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl StoreHealth for MongoDb {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                StoreError::from(e)
            })?;
        Ok(())
    }
}
