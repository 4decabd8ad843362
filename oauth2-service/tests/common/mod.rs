//! Shared fixtures for oauth2-service integration tests.
//!
//! Builds a grant engine over a seeded in-memory store.

#![allow(dead_code)]

use oauth2_service::{
    config::{EngineConfig, Environment, OAuth2Config, StoreBackend},
    dtos::oauth2::{AuthorizeRequest, TokenRequest},
    models::{
        Account, AccountStatus, Application, ApplicationStatus, Email, EmailConfirmation,
        EmailStatus, GrantType, Profile, Project, ScopeSet, NEVER_EXPIRES,
    },
    services::{AccountStore, ClientStore, EngineSettings, GrantEngine, MemoryStore, Stores},
    utils::{hash_password, Password, PasswordHashString},
    AppState,
};
use std::sync::{Arc, OnceLock};

pub const PROJECT_ID: &str = "project_1";
pub const STRICT_PROJECT_ID: &str = "project_strict";
pub const PROJECT_OWNER_ID: &str = "user_owner";

pub const WEB_APP: &str = "app_web";
pub const WEB_SECRET: &str = "web-secret";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";

pub const SERVICE_APP: &str = "app_service";
pub const SERVICE_SECRET: &str = "service-secret";

pub const FOREVER_APP: &str = "app_forever";
pub const FOREVER_SECRET: &str = "forever-secret";

pub const DISABLED_APP: &str = "app_disabled";
pub const DISABLED_SECRET: &str = "disabled-secret";

pub const RESTRICTED_APP: &str = "app_restricted";
pub const RESTRICTED_SECRET: &str = "restricted-secret";
pub const ALLOWED_IP: &str = "203.0.113.7";

pub const STRICT_APP: &str = "app_strict";
pub const STRICT_SECRET: &str = "strict-secret";

pub const ALICE: &str = "user_alice";
pub const ALICE_EMAIL: &str = "alice@example.com";
pub const BOB: &str = "user_bob";
pub const BOB_EMAIL: &str = "bob@example.com";
pub const CAROL: &str = "user_carol";
pub const CAROL_EMAIL: &str = "carol@example.com";
pub const DAVE: &str = "user_dave";
pub const DAVE_EMAIL: &str = "dave@example.com";

/// Every fixture account signs in with this password.
pub const PASSWORD: &str = "correct-horse-battery";

fn password_hash() -> PasswordHashString {
    static HASH: OnceLock<PasswordHashString> = OnceLock::new();
    HASH.get_or_init(|| hash_password(&Password::new(PASSWORD)).expect("hash fixture password"))
        .clone()
}

fn application(
    id: &str,
    secret: &str,
    project_id: &str,
    grants: Vec<GrantType>,
    scope: &str,
) -> Application {
    Application::new(
        id.to_string(),
        secret,
        project_id.to_string(),
        grants,
        ScopeSet::parse(scope),
    )
}

fn account(id: &str, email: &str, email_status: EmailStatus) -> Account {
    Account::new(id.to_string(), vec![Email::new(email.to_string(), email_status)])
}

fn profile(user_id: &str, project_id: &str, scope: &str) -> Profile {
    Profile {
        user_id: user_id.to_string(),
        project_id: project_id.to_string(),
        scope: ScopeSet::parse(scope),
    }
}

pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub engine: GrantEngine,
}

impl TestEnv {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        seed(&store);
        let engine = GrantEngine::new(
            Stores::from_shared(store.clone()),
            EngineSettings::default(),
        );
        Self { store, engine }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            config: test_config(),
            engine: self.engine.clone(),
            health: self.store.clone(),
        }
    }

    /// Change a client registration in place.
    pub async fn update_application(&self, id: &str, change: impl FnOnce(&mut Application)) {
        let mut application = ClientStore::get(self.store.as_ref(), id, None)
            .await
            .expect("read application")
            .expect("application exists");
        change(&mut application);
        self.store
            .insert_application(application)
            .expect("update application");
    }

    /// Change an account in place, e.g. to block it after issuance.
    pub async fn update_account(&self, id: &str, change: impl FnOnce(&mut Account)) {
        let mut account = AccountStore::get(self.store.as_ref(), id)
            .await
            .expect("read account")
            .expect("account exists");
        change(&mut account);
        self.store.update_account(account).expect("update account");
    }
}

pub fn test_config() -> OAuth2Config {
    OAuth2Config {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "oauth2-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store: StoreBackend::Memory,
        mongodb: None,
        engine: EngineConfig {
            code_lifetime_seconds: 300,
        },
        trusted_proxies: Vec::new(),
    }
}

fn seed(store: &MemoryStore) {
    let mut project = Project::new(
        PROJECT_ID.to_string(),
        "domain_1".to_string(),
        EmailConfirmation::NotRequired,
    );
    project.owner_id = Some(PROJECT_OWNER_ID.to_string());
    store.insert_project(project).expect("seed project");
    store
        .insert_project(Project::new(
            STRICT_PROJECT_ID.to_string(),
            "domain_1".to_string(),
            EmailConfirmation::Required,
        ))
        .expect("seed project");

    let mut web = application(
        WEB_APP,
        WEB_SECRET,
        PROJECT_ID,
        vec![
            GrantType::AuthorizationCode,
            GrantType::Password,
            GrantType::RefreshToken,
        ],
        "read write admin",
    );
    web.redirect_uris = vec![REDIRECT_URI.to_string()];
    web.owner_id = Some(ALICE.to_string());
    store.insert_application(web).expect("seed application");

    let mut service = application(
        SERVICE_APP,
        SERVICE_SECRET,
        PROJECT_ID,
        vec![GrantType::ClientCredentials],
        "read metrics",
    );
    service.access_token_lifetime = Some(60);
    store.insert_application(service).expect("seed application");

    let mut forever = application(
        FOREVER_APP,
        FOREVER_SECRET,
        PROJECT_ID,
        vec![
            GrantType::ClientCredentials,
            GrantType::Password,
            GrantType::AuthorizationCode,
        ],
        "read",
    );
    forever.access_token_lifetime = Some(NEVER_EXPIRES);
    store.insert_application(forever).expect("seed application");

    let mut disabled = application(
        DISABLED_APP,
        DISABLED_SECRET,
        PROJECT_ID,
        vec![GrantType::ClientCredentials],
        "read",
    );
    disabled.status = ApplicationStatus::Disabled;
    store.insert_application(disabled).expect("seed application");

    let mut restricted = application(
        RESTRICTED_APP,
        RESTRICTED_SECRET,
        PROJECT_ID,
        vec![GrantType::ClientCredentials],
        "read",
    );
    restricted.restriction = vec![ALLOWED_IP.to_string()];
    store.insert_application(restricted).expect("seed application");

    store
        .insert_application(application(
            STRICT_APP,
            STRICT_SECRET,
            STRICT_PROJECT_ID,
            vec![GrantType::Password],
            "read",
        ))
        .expect("seed application");

    let hash = password_hash();
    store
        .insert_account_hashed(account(ALICE, ALICE_EMAIL, EmailStatus::Confirmed), hash.clone())
        .expect("seed account");
    store
        .insert_account_hashed(account(BOB, BOB_EMAIL, EmailStatus::Confirmed), hash.clone())
        .expect("seed account");
    store
        .insert_account_hashed(account(CAROL, CAROL_EMAIL, EmailStatus::Registered), hash.clone())
        .expect("seed account");
    let mut dave = account(DAVE, DAVE_EMAIL, EmailStatus::Confirmed);
    dave.status = AccountStatus::Cancelled;
    store.insert_account_hashed(dave, hash).expect("seed account");

    store
        .insert_profile(profile(ALICE, PROJECT_ID, "read write"))
        .expect("seed profile");
    store
        .insert_profile(profile(DAVE, PROJECT_ID, "read"))
        .expect("seed profile");
    store
        .insert_profile(profile(CAROL, STRICT_PROJECT_ID, "read"))
        .expect("seed profile");
    // Bob has no profile in any project.
}

pub fn client_credentials(client_id: &str, secret: &str, scope: Option<&str>) -> TokenRequest {
    TokenRequest {
        grant_type: "client_credentials".to_string(),
        client_id: Some(client_id.to_string()),
        client_secret: Some(secret.to_string()),
        scope: scope.map(str::to_string),
        ..Default::default()
    }
}

pub fn password_grant(
    client_id: &str,
    secret: &str,
    username: &str,
    scope: Option<&str>,
) -> TokenRequest {
    TokenRequest {
        grant_type: "password".to_string(),
        client_id: Some(client_id.to_string()),
        client_secret: Some(secret.to_string()),
        username: Some(username.to_string()),
        password: Some(PASSWORD.to_string()),
        scope: scope.map(str::to_string),
        ..Default::default()
    }
}

pub fn code_grant(
    client_id: &str,
    secret: &str,
    code: &str,
    redirect_uri: Option<&str>,
) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".to_string(),
        client_id: Some(client_id.to_string()),
        client_secret: Some(secret.to_string()),
        code: Some(code.to_string()),
        redirect_uri: redirect_uri.map(str::to_string),
        ..Default::default()
    }
}

pub fn refresh_grant(
    client_id: &str,
    secret: &str,
    refresh_token: &str,
    scope: Option<&str>,
) -> TokenRequest {
    TokenRequest {
        grant_type: "refresh_token".to_string(),
        client_id: Some(client_id.to_string()),
        client_secret: Some(secret.to_string()),
        refresh_token: Some(refresh_token.to_string()),
        scope: scope.map(str::to_string),
        ..Default::default()
    }
}

pub fn authorize_request(client_id: &str, user_id: &str, scope: Option<&str>) -> AuthorizeRequest {
    AuthorizeRequest {
        client_id: client_id.to_string(),
        user_id: user_id.to_string(),
        redirect_uri: Some(REDIRECT_URI.to_string()),
        scope: scope.map(str::to_string),
        state: Some("xyz".to_string()),
        ..Default::default()
    }
}
