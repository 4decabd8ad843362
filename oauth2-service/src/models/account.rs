use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{optional_chrono_datetime_as_bson_datetime, ScopeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    TemporarilyBlocked,
    Cancelled,
    DisabledByAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    /// Registered but not yet confirmed.
    Registered,
    Confirmed,
    NeedsConfirmAuthBlocked,
    NeedsConfirmAuthAllowed,
    TemporarilyBlocked,
    Cancelled,
    DisabledByAdmin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub address: String,
    pub status: EmailStatus,
    #[serde(
        default,
        with = "optional_chrono_datetime_as_bson_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub confirmation_expires: Option<DateTime<Utc>>,
}

impl Email {
    pub fn new(address: String, status: EmailStatus) -> Self {
        Self {
            address,
            status,
            confirmation_expires: None,
        }
    }

    pub fn with_confirmation_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.confirmation_expires = Some(expires);
        self
    }

    /// A missing deadline counts as already elapsed.
    pub fn confirmation_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.confirmation_expires
            .map(|expires| expires < now)
            .unwrap_or(true)
    }
}

/// End user. Passwords never leave the store adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: AccountStatus,
    #[serde(default)]
    pub emails: Vec<Email>,
}

impl Account {
    pub fn new(id: String, emails: Vec<Email>) -> Self {
        Self {
            id,
            status: AccountStatus::Active,
            emails,
        }
    }

    pub fn primary_email(&self) -> Option<&Email> {
        self.emails.first()
    }

    pub fn find_email(&self, address: &str) -> Option<&Email> {
        self.emails
            .iter()
            .find(|email| email.address.eq_ignore_ascii_case(address))
    }
}

/// Per-project scope granted to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub project_id: String,
    pub scope: ScopeSet,
}
