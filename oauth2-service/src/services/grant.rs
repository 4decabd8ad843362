//! The grant engine: one state machine per OAuth2 grant.
//!
//! A request moves through REQUESTED, CLIENT_RESOLVED, USER_RESOLVED (user
//! grants only), SCOPE_RESOLVED and PERSISTED before a response is built.
//! Any failure returns immediately with a typed [`GrantError`].

use chrono::{DateTime, Duration, Utc};

use super::{AccessPolicy, GrantError, ScopeResolver, Stores};
use crate::dtos::oauth2::{AuthorizeRequest, CallerContext, TokenRequest, TokenTypeHint};
use crate::models::token::expiry_for;
use crate::models::{
    Account, Application, AuthorizationCode, Email, GrantType, Project, ScopeSet, Token,
    TokenError, TokenParams, TokenType,
};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long an authorization code stays redeemable.
    pub code_lifetime: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            code_lifetime: Duration::seconds(300),
        }
    }
}

/// What a validated access token grants its bearer.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub application: Application,
    /// Set only when the token speaks for a user other than the client.
    pub account: Option<Account>,
    pub scope: ScopeSet,
    pub token_type: TokenType,
    pub expires_at: DateTime<Utc>,
}

/// Stateless between requests; every piece of state lives in the stores.
#[derive(Clone)]
pub struct GrantEngine {
    stores: Stores,
    scopes: ScopeResolver,
    settings: EngineSettings,
}

fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, GrantError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GrantError::InvalidRequest(format!("missing parameter: {}", name)))
}

fn invalid_code() -> GrantError {
    GrantError::InvalidGrant("invalid authorization code".to_string())
}

fn invalid_refresh_token() -> GrantError {
    GrantError::InvalidGrant("invalid refresh token".to_string())
}

fn token_error(application: &Application, err: TokenError) -> GrantError {
    match err {
        TokenError::KeepBoundToUser { user_id } => {
            tracing::warn!(
                client_id = %application.id,
                user_id = %user_id,
                "Refusing non-expiring user token"
            );
            GrantError::NotAllowedSignin {
                account_id: user_id,
            }
        }
        TokenError::InvalidLifetime { lifetime } => {
            tracing::error!(
                client_id = %application.id,
                lifetime,
                "Client is configured with an unusable token lifetime"
            );
            GrantError::InvalidClient("client token lifetime is misconfigured".to_string())
        }
    }
}

impl GrantEngine {
    pub fn new(stores: Stores, settings: EngineSettings) -> Self {
        let scopes = ScopeResolver::new(stores.accounts.clone());
        Self {
            stores,
            scopes,
            settings,
        }
    }

    /// Issue an authorization code for an already authenticated user.
    #[tracing::instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<AuthorizationCode, GrantError> {
        tracing::debug!(state = "REQUESTED", "Authorization request received");

        let application = self
            .resolve_client(&request.client_id, None, &request.caller)
            .await?;
        self.ensure_grant(&application, GrantType::AuthorizationCode)?;

        match request.redirect_uri.as_deref() {
            Some(uri) if !application.allows_redirect_uri(uri) => {
                return Err(GrantError::InvalidRequest(
                    "redirect_uri is not registered for this client".to_string(),
                ));
            }
            None if !application.redirect_uris.is_empty() => {
                return Err(GrantError::InvalidRequest(
                    "missing parameter: redirect_uri".to_string(),
                ));
            }
            _ => {}
        }

        let project = self.load_project(&application).await?;
        tracing::debug!(state = "CLIENT_RESOLVED", "Client resolved");

        let account = self.load_account(&request.user_id).await?;
        self.check_policy(&account, &project, account.primary_email(), false)?;
        tracing::debug!(state = "USER_RESOLVED", user_id = %account.id, "User resolved");

        let requested = ScopeSet::parse(request.scope.as_deref().unwrap_or_default());
        let scope = self
            .scopes
            .resolve(&application, &project, &account.id, &requested)
            .await?;
        tracing::debug!(state = "SCOPE_RESOLVED", scope = %scope, "Scope resolved");

        let code = AuthorizationCode::new(
            application.id.clone(),
            Some(account.id.clone()),
            request.redirect_uri,
            scope,
            self.settings.code_lifetime,
        );
        self.stores.codes.create(&code).await?;
        tracing::debug!(state = "PERSISTED", "Authorization code stored");

        tracing::info!(
            client_id = %application.id,
            user_id = %account.id,
            "Authorization code issued"
        );
        Ok(code)
    }

    /// Run the token endpoint for any supported grant.
    #[tracing::instrument(skip(self, request), fields(grant_type = %request.grant_type))]
    pub async fn token(&self, request: TokenRequest) -> Result<Token, GrantError> {
        tracing::debug!(state = "REQUESTED", "Token request received");

        let grant: GrantType = request
            .grant_type
            .parse()
            .map_err(|e: crate::models::UnknownGrantType| {
                GrantError::UnsupportedGrantType(e.to_string())
            })?;
        let client_id = require(&request.client_id, "client_id")?;
        let client_secret = require(&request.client_secret, "client_secret")?;

        let application = self
            .resolve_client(client_id, Some(client_secret), &request.caller)
            .await?;
        self.ensure_grant(&application, grant)?;
        let project = self.load_project(&application).await?;
        tracing::debug!(state = "CLIENT_RESOLVED", client_id = %application.id, "Client resolved");

        let requested = ScopeSet::parse(request.scope.as_deref().unwrap_or_default());

        let token = match grant {
            GrantType::ClientCredentials => {
                self.client_credentials(&application, &project, &requested)
                    .await?
            }
            GrantType::Password => {
                self.password(&application, &project, &request, &requested)
                    .await?
            }
            GrantType::AuthorizationCode => {
                self.authorization_code(&application, &project, &request)
                    .await?
            }
            GrantType::RefreshToken => {
                self.refresh_token(&application, &project, &request, &requested)
                    .await?
            }
        };

        tracing::debug!(state = "RESPONDED", "Token response ready");
        Ok(token)
    }

    async fn client_credentials(
        &self,
        application: &Application,
        project: &Project,
        requested: &ScopeSet,
    ) -> Result<Token, GrantError> {
        let scope = self
            .scopes
            .resolve(application, project, &application.id, requested)
            .await?;
        tracing::debug!(state = "SCOPE_RESOLVED", scope = %scope, "Scope resolved");

        self.issue(application, project, None, scope, TokenType::Application, false)
            .await
    }

    async fn password(
        &self,
        application: &Application,
        project: &Project,
        request: &TokenRequest,
        requested: &ScopeSet,
    ) -> Result<Token, GrantError> {
        let username = require(&request.username, "username")?;
        let password = require(&request.password, "password")?;

        let account = self
            .stores
            .accounts
            .get_by_credentials(username, password)
            .await?
            .ok_or_else(|| {
                tracing::warn!(client_id = %application.id, "Rejected user credentials");
                GrantError::InvalidGrant("invalid username or password".to_string())
            })?;

        if account.id != application.id {
            self.check_policy(&account, project, account.find_email(username), false)?;
        }
        tracing::debug!(state = "USER_RESOLVED", user_id = %account.id, "User resolved");

        let scope = self
            .scopes
            .resolve(application, project, &account.id, requested)
            .await?;
        tracing::debug!(state = "SCOPE_RESOLVED", scope = %scope, "Scope resolved");

        self.issue(application, project, Some(&account), scope, TokenType::User, true)
            .await
    }

    async fn authorization_code(
        &self,
        application: &Application,
        project: &Project,
        request: &TokenRequest,
    ) -> Result<Token, GrantError> {
        let value = require(&request.code, "code")?;

        // Removing the code is the redemption; whoever gets the record wins.
        let code = self.stores.codes.take(value).await?.ok_or_else(|| {
            tracing::warn!(
                client_id = %application.id,
                "Unknown or already redeemed authorization code"
            );
            invalid_code()
        })?;

        if code.is_expired_at(Utc::now()) {
            tracing::warn!(client_id = %application.id, "Expired authorization code purged");
            return Err(invalid_code());
        }
        if code.application_id != application.id {
            tracing::warn!(
                client_id = %application.id,
                code_client_id = %code.application_id,
                "Authorization code presented by another client"
            );
            return Err(invalid_code());
        }
        if code.redirect_uri.is_some() && code.redirect_uri != request.redirect_uri {
            return Err(GrantError::InvalidGrant(
                "redirect_uri does not match the authorization request".to_string(),
            ));
        }

        match code.user_id.as_deref() {
            Some(user_id) if user_id != application.id => {
                let account = self.load_account(user_id).await?;
                self.check_policy(&account, project, account.primary_email(), false)?;
                tracing::debug!(state = "USER_RESOLVED", user_id = %account.id, "User resolved");

                let scope = self
                    .scopes
                    .resolve(application, project, &account.id, &code.scope)
                    .await?;
                tracing::debug!(state = "SCOPE_RESOLVED", scope = %scope, "Scope resolved");

                self.issue(application, project, Some(&account), scope, TokenType::User, true)
                    .await
            }
            _ => {
                let scope = self
                    .scopes
                    .resolve(application, project, &application.id, &code.scope)
                    .await?;
                tracing::debug!(state = "SCOPE_RESOLVED", scope = %scope, "Scope resolved");

                self.issue(application, project, None, scope, TokenType::Application, true)
                    .await
            }
        }
    }

    async fn refresh_token(
        &self,
        application: &Application,
        project: &Project,
        request: &TokenRequest,
        requested: &ScopeSet,
    ) -> Result<Token, GrantError> {
        let value = require(&request.refresh_token, "refresh_token")?;
        let now = Utc::now();

        let token = self
            .stores
            .tokens
            .find_active_refresh(value, now)
            .await?
            .ok_or_else(|| {
                tracing::warn!(client_id = %application.id, "Unknown or expired refresh token");
                invalid_refresh_token()
            })?;

        if token.application_id != application.id {
            tracing::warn!(
                client_id = %application.id,
                token_client_id = %token.application_id,
                "Refresh token presented by another client"
            );
            return Err(invalid_refresh_token());
        }
        if token.is_corrupt() {
            tracing::error!(
                client_id = %application.id,
                "Refusing corrupt non-expiring user token"
            );
            return Err(invalid_refresh_token());
        }

        if token.is_user_bound() {
            let account = self.load_account(token.subject_id()).await?;
            self.check_policy(&account, project, account.primary_email(), token.is_social())?;
            tracing::debug!(state = "USER_RESOLVED", user_id = %account.id, "User resolved");
        }

        let requested = requested.without_virtual();
        if !requested.is_subset(&token.scope) {
            return Err(GrantError::InvalidScope(format!(
                "requested scope exceeds the original grant: {}",
                requested
            )));
        }
        tracing::debug!(
            state = "SCOPE_RESOLVED",
            scope = %token.scope,
            "Scope kept from original grant"
        );

        let lifetime = application
            .access_token_lifetime
            .unwrap_or(project.token_lifetime.access_token);
        let (expires_at, keep) =
            expiry_for(lifetime, now).map_err(|e| token_error(application, e))?;
        if keep && token.is_user_bound() {
            return Err(GrantError::NotAllowedSignin {
                account_id: token.subject_id().to_string(),
            });
        }

        let new_access_token = crate::utils::generate_token();
        let refreshed = self
            .stores
            .tokens
            .refresh_access(value, &new_access_token, expires_at, keep, now)
            .await?
            .ok_or_else(invalid_refresh_token)?;
        tracing::debug!(state = "PERSISTED", "Access token replaced");

        tracing::info!(
            client_id = %application.id,
            subject_id = %refreshed.subject_id(),
            "Access token refreshed"
        );
        Ok(refreshed)
    }

    /// Validate an access token and return what it stands for.
    ///
    /// User-bound tokens re-run the access policy on every call, so blocking
    /// an account takes effect immediately.
    #[tracing::instrument(skip_all)]
    pub async fn get_access_token(&self, access_token: &str) -> Result<AuthContext, GrantError> {
        let token = self
            .stores
            .tokens
            .find_active_access(access_token, Utc::now())
            .await?
            .ok_or(GrantError::TokenExpired)?;

        if token.is_corrupt() {
            tracing::error!(
                client_id = %token.application_id,
                "Refusing corrupt non-expiring user token"
            );
            return Err(GrantError::InvalidGrant(
                "token is bound to a user but never expires".to_string(),
            ));
        }

        let application = self
            .stores
            .clients
            .get(&token.application_id, None)
            .await?
            .filter(Application::is_enabled)
            .ok_or_else(|| GrantError::InvalidClient("client is unknown or disabled".to_string()))?;

        let account = if token.is_user_bound() {
            let project = self.load_project(&application).await?;
            let account = self.load_account(token.subject_id()).await?;
            self.check_policy(&account, &project, account.primary_email(), token.is_social())?;
            Some(account)
        } else {
            None
        };

        Ok(AuthContext {
            application,
            account,
            scope: token.scope,
            token_type: token.token_type,
            expires_at: token.access_token_expires_at,
        })
    }

    /// Gate for protected operations: the token must be valid and carry every
    /// required scope entry.
    pub async fn authenticate(
        &self,
        access_token: &str,
        required_scope: &ScopeSet,
    ) -> Result<AuthContext, GrantError> {
        let context = self.get_access_token(access_token).await?;

        if !required_scope.is_subset(&context.scope) {
            tracing::warn!(
                client_id = %context.application.id,
                required = %required_scope,
                granted = %context.scope,
                "Insufficient scope"
            );
            return Err(GrantError::InvalidScope(format!(
                "token lacks required scope: {}",
                required_scope
            )));
        }

        Ok(context)
    }

    /// Revoke an access or refresh token. Unknown values return `false`.
    #[tracing::instrument(skip_all)]
    pub async fn revoke(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
    ) -> Result<bool, GrantError> {
        let tokens = &self.stores.tokens;
        let revoked = match hint {
            Some(TokenTypeHint::RefreshToken) => {
                tokens.revoke_refresh(token).await? || tokens.revoke_access(token).await?
            }
            _ => tokens.revoke_access(token).await? || tokens.revoke_refresh(token).await?,
        };

        if revoked {
            tracing::info!("Token revoked");
        }
        Ok(revoked)
    }

    async fn resolve_client(
        &self,
        client_id: &str,
        secret: Option<&str>,
        caller: &CallerContext,
    ) -> Result<Application, GrantError> {
        let application = self
            .stores
            .clients
            .get(client_id, secret)
            .await?
            .ok_or_else(|| {
                tracing::warn!(client_id = %client_id, "Client authentication failed");
                GrantError::InvalidClient("client authentication failed".to_string())
            })?;

        if !application.is_enabled() {
            tracing::warn!(
                client_id = %client_id,
                status = ?application.status,
                "Client is not enabled"
            );
            return Err(GrantError::InvalidClient("client is disabled".to_string()));
        }

        if !application.allows_caller(caller.ip.as_deref(), caller.origin.as_deref()) {
            tracing::warn!(
                client_id = %client_id,
                ip = ?caller.ip,
                origin = ?caller.origin,
                "Caller rejected by client restriction"
            );
            return Err(GrantError::InvalidClient(
                "caller is not allowed to use this client".to_string(),
            ));
        }

        Ok(application)
    }

    fn ensure_grant(&self, application: &Application, grant: GrantType) -> Result<(), GrantError> {
        if application.allows_grant(grant) {
            Ok(())
        } else {
            Err(GrantError::UnauthorizedClient(format!(
                "client may not use the {} grant",
                grant
            )))
        }
    }

    async fn load_project(&self, application: &Application) -> Result<Project, GrantError> {
        self.stores
            .projects
            .get(&application.project_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(
                    client_id = %application.id,
                    project_id = %application.project_id,
                    "Client belongs to a missing project"
                );
                GrantError::InvalidClient("client project not found".to_string())
            })
    }

    async fn load_account(&self, user_id: &str) -> Result<Account, GrantError> {
        self.stores
            .accounts
            .get(user_id)
            .await?
            .ok_or_else(|| GrantError::AccountNotRegistered {
                account_id: user_id.to_string(),
            })
    }

    fn check_policy(
        &self,
        account: &Account,
        project: &Project,
        email: Option<&Email>,
        is_social: bool,
    ) -> Result<(), GrantError> {
        AccessPolicy::can_signin(account, project, email, is_social, Utc::now()).map_err(|reason| {
            tracing::warn!(
                account_id = %account.id,
                project_id = %project.id,
                reason = %reason,
                "Sign-in denied"
            );
            GrantError::from(reason)
        })
    }

    async fn issue(
        &self,
        application: &Application,
        project: &Project,
        account: Option<&Account>,
        scope: ScopeSet,
        token_type: TokenType,
        with_refresh: bool,
    ) -> Result<Token, GrantError> {
        let access_lifetime = application
            .access_token_lifetime
            .unwrap_or(project.token_lifetime.access_token);
        let refresh_lifetime = with_refresh.then(|| {
            application
                .refresh_token_lifetime
                .unwrap_or(project.token_lifetime.refresh_token)
        });

        let params = TokenParams {
            application_id: application.id.clone(),
            user_id: account.map(|account| account.id.clone()),
            scope,
            token_type,
            access_lifetime,
            refresh_lifetime,
        };

        let token = Token::issue(params, Utc::now()).map_err(|e| token_error(application, e))?;

        self.stores.tokens.create(&token).await?;
        tracing::debug!(state = "PERSISTED", keep = token.keep, "Token stored");

        tracing::info!(
            client_id = %application.id,
            subject_id = %token.subject_id(),
            token_type = ?token.token_type,
            "Token issued"
        );
        Ok(token)
    }
}
