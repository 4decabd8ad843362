use serde::{Deserialize, Serialize};

/// Whether accounts must confirm their email before signing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailConfirmation {
    NotRequired,
    Required,
    /// Unconfirmed emails may sign in until their confirmation deadline.
    RequiredByTime,
}

/// Default token lifetimes in seconds, used when an application has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLifetime {
    pub access_token: i64,
    pub refresh_token: i64,
}

impl Default for TokenLifetime {
    fn default() -> Self {
        Self {
            access_token: 3600,
            refresh_token: 14 * 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: String,
    pub domain_id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub email_confirmation: EmailConfirmation,
    #[serde(default)]
    pub token_lifetime: TokenLifetime,
}

impl Project {
    pub fn new(id: String, domain_id: String, email_confirmation: EmailConfirmation) -> Self {
        Self {
            id,
            domain_id,
            owner_id: None,
            email_confirmation,
            token_lifetime: TokenLifetime::default(),
        }
    }

    pub fn is_owned_by(&self, subject_id: &str) -> bool {
        self.owner_id.as_deref() == Some(subject_id)
    }
}
