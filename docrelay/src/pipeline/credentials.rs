//! Bearer token lookup for outbound Loxo calls.

use std::collections::HashMap;

use crate::config::CredentialsConfig;
use crate::errors::{Error, Result};

/// Read-only token store, built once at startup and shared by every request.
#[derive(Clone)]
pub enum CredentialStore {
    PerAgency(HashMap<String, String>),
    Global(String),
}

impl CredentialStore {
    pub fn from_config(config: &CredentialsConfig) -> Self {
        match config {
            CredentialsConfig::PerAgency { tokens } => CredentialStore::PerAgency(tokens.clone()),
            CredentialsConfig::Global { token } => CredentialStore::Global(token.clone()),
        }
    }

    /// The bearer token for `slug`.
    pub fn token_for(&self, slug: &str) -> Result<&str> {
        match self {
            CredentialStore::Global(token) => Ok(token),
            CredentialStore::PerAgency(tokens) => tokens.get(slug).map(String::as_str).ok_or_else(|| {
                tracing::error!(slug, "No bearer token configured for agency");
                Error::MissingCredentials { slug: slug.to_string() }
            }),
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialStore::PerAgency(tokens) => f.debug_tuple("PerAgency").field(&tokens.len()).finish(),
            CredentialStore::Global(_) => f.write_str("Global(<redacted>)"),
        }
    }
}
