pub mod account;
pub mod application;
pub mod authorization_code;
pub mod project;
pub mod scope;
pub mod token;

pub use account::{Account, AccountStatus, Email, EmailStatus, Profile};
pub use application::{Application, ApplicationStatus, GrantType, UnknownGrantType, NEVER_EXPIRES};
pub use authorization_code::AuthorizationCode;
pub use project::{EmailConfirmation, Project, TokenLifetime};
pub use scope::{ScopeError, ScopeSet};
pub use token::{Token, TokenError, TokenParams, TokenType};

pub mod optional_chrono_datetime_as_bson_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match val {
            Some(date) => {
                mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime::serialize(
                    date, serializer,
                )
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(
            #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
            DateTime<Utc>,
        );

        let wrapper = Option::<Wrapper>::deserialize(deserializer)?;
        Ok(wrapper.map(|w| w.0))
    }
}
