use serde::{Deserialize, Serialize};

/// A single authentication token addressed to a specific provider (GLOSSARY: Credential/Key).
/// Opaque to everything except the adapter it was issued for and the Key Pool that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub provider_id: String,
    pub key_id: String,
    pub secret: String,
}

impl Credential {
    pub fn new(provider_id: impl Into<String>, key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            key_id: key_id.into(),
            secret: secret.into(),
        }
    }
}
