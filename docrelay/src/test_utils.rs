//! Test utilities for integration testing.

use axum_test::TestServer;
use std::collections::HashMap;

use crate::config::{Config, CredentialsConfig, LoxoConfig};

/// Build a test server for `config`.
pub async fn create_test_app(config: Config) -> TestServer {
    crate::Application::new(config)
        .expect("Failed to create application")
        .into_test_server()
}

/// Config pointing the Loxo API at `api_url` (usually a wiremock server), with a token for the
/// `acme` agency only.
pub fn create_test_config(api_url: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        enable_otel_export: false,
        loxo: LoxoConfig {
            api_url: api_url.parse().expect("valid test API URL"),
            credentials: CredentialsConfig::PerAgency {
                tokens: HashMap::from([("acme".to_string(), "token-acme".to_string())]),
            },
            ..Default::default()
        },
    }
}
