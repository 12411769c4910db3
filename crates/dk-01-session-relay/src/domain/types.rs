//! Wire types exchanged with the backend's BFF endpoints.

use serde::{Deserialize, Serialize};

/// One claim of the signed-in user as reported by `GET /bff/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BffClaim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

/// Session view returned by `GET /bff/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BffUser {
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub claims: Vec<BffClaim>,
}

impl BffUser {
    /// First claim value of the given type.
    pub fn claim_value(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }
}

/// Body of `GET /bff/antiforgery`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiforgeryResponse {
    pub request_token: String,
}
