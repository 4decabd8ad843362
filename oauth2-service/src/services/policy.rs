//! Access policy: may an account sign in to a project right now.

use chrono::{DateTime, Utc};

use super::DeniedReason;
use crate::models::{Account, AccountStatus, Email, EmailConfirmation, EmailStatus, Project};

#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy;

impl AccessPolicy {
    /// Evaluate the sign-in rules in order; the first failing rule wins.
    ///
    /// `email` is the address the user authenticates with. It may be absent
    /// only for social logins.
    pub fn can_signin(
        account: &Account,
        project: &Project,
        email: Option<&Email>,
        is_social: bool,
        now: DateTime<Utc>,
    ) -> Result<(), DeniedReason> {
        let account_id = || account.id.clone();

        match account.status {
            AccountStatus::TemporarilyBlocked => {
                return Err(DeniedReason::AccountBlocked {
                    account_id: account_id(),
                })
            }
            AccountStatus::Cancelled => {
                return Err(DeniedReason::AccountCancelled {
                    account_id: account_id(),
                })
            }
            AccountStatus::DisabledByAdmin => {
                return Err(DeniedReason::AccountDisabled {
                    account_id: account_id(),
                })
            }
            AccountStatus::Active => {}
        }

        // The email must be one of the account's own records.
        let email = email.filter(|email| account.find_email(&email.address).is_some());
        let email = match email {
            Some(email) => email,
            None if is_social => return Ok(()),
            None => {
                return Err(DeniedReason::NotAllowedSignin {
                    account_id: account_id(),
                })
            }
        };

        match email.status {
            EmailStatus::TemporarilyBlocked => Err(DeniedReason::AccountBlocked {
                account_id: account_id(),
            }),
            EmailStatus::Cancelled => Err(DeniedReason::AccountCancelled {
                account_id: account_id(),
            }),
            EmailStatus::DisabledByAdmin => Err(DeniedReason::AccountDisabled {
                account_id: account_id(),
            }),
            EmailStatus::Registered => {
                let denied = match project.email_confirmation {
                    EmailConfirmation::NotRequired => false,
                    EmailConfirmation::Required => true,
                    EmailConfirmation::RequiredByTime => email.confirmation_expired_at(now),
                };
                if denied {
                    Err(DeniedReason::EmailNotConfirmed {
                        account_id: account_id(),
                    })
                } else {
                    Ok(())
                }
            }
            EmailStatus::NeedsConfirmAuthBlocked => Err(DeniedReason::EmailNotConfirmed {
                account_id: account_id(),
            }),
            EmailStatus::NeedsConfirmAuthAllowed => {
                if email.confirmation_expired_at(now) {
                    Err(DeniedReason::EmailNotConfirmed {
                        account_id: account_id(),
                    })
                } else {
                    Ok(())
                }
            }
            EmailStatus::Confirmed => Ok(()),
        }
    }
}
