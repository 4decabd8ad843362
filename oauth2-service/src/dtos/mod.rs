pub mod oauth2;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Flat OAuth2 error body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "invalid_grant")]
    pub error: String,
    #[schema(example = "invalid authorization code")]
    pub error_description: String,
    /// Set for account policy errors so callers can route to remediation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}
