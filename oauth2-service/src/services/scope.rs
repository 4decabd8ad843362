//! Scope resolution for a (client, subject, requested scope) triple.

use std::sync::Arc;

use super::{AccountStore, GrantError};
use crate::models::scope::{
    APPLICATION_OWNER_SCOPE, APPLICATION_SCOPE, DEFAULT_SCOPE, PROJECT_OWNER_SCOPE, USER_SCOPE,
};
use crate::models::{Application, Profile, Project, ScopeSet};

/// Compute the scope a grant ends up with.
///
/// `subject_id == application.id` marks a client-only grant. For user grants
/// the caller passes the user's profile in the application's project; a
/// missing profile means the user is not registered there.
///
/// Real entries keep the order of the requested (or profile) scope, followed
/// by `default`, then `application`/`user`, then the ownership markers.
pub fn resolve_scope(
    application: &Application,
    project: &Project,
    subject_id: &str,
    requested: &ScopeSet,
    profile: Option<&Profile>,
) -> Result<ScopeSet, GrantError> {
    let requested = requested.without_virtual();
    let client_only = subject_id == application.id;

    let resolved = if client_only {
        let candidate = if requested.is_empty() {
            &application.scope
        } else {
            &requested
        };
        candidate.intersection(&application.scope)
    } else {
        let profile = profile.ok_or_else(|| GrantError::AccountNotRegistered {
            account_id: subject_id.to_string(),
        })?;
        let candidate = if requested.is_empty() {
            &profile.scope
        } else {
            &requested
        };
        candidate
            .intersection(&application.scope)
            .intersection(&profile.scope)
    };

    let mut resolved = resolved.without_virtual();
    if !requested.is_empty() && resolved.is_empty() {
        return Err(GrantError::InvalidScope(format!(
            "none of the requested scopes are allowed: {}",
            requested
        )));
    }

    resolved.push_marker(DEFAULT_SCOPE);
    resolved.push_marker(if client_only {
        APPLICATION_SCOPE
    } else {
        USER_SCOPE
    });
    if application.is_owned_by(subject_id) {
        resolved.push_marker(APPLICATION_OWNER_SCOPE);
    }
    if project.is_owned_by(subject_id) {
        resolved.push_marker(PROJECT_OWNER_SCOPE);
    }

    Ok(resolved)
}

/// Fetches the profile a user grant needs, then defers to [`resolve_scope`].
#[derive(Clone)]
pub struct ScopeResolver {
    accounts: Arc<dyn AccountStore>,
}

impl ScopeResolver {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    pub async fn resolve(
        &self,
        application: &Application,
        project: &Project,
        subject_id: &str,
        requested: &ScopeSet,
    ) -> Result<ScopeSet, GrantError> {
        let profile = if subject_id == application.id {
            None
        } else {
            self.accounts.get_profile(subject_id, &project.id).await?
        };

        resolve_scope(application, project, subject_id, requested, profile.as_ref())
    }
}
