//! Request and response bodies of the HTTP host.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of both token endpoints.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenRequest {
    /// Caller claims merged over the base claims.
    #[serde(default)]
    pub claims: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub token: String,
}
