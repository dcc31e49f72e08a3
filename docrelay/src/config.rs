//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `DOCRELAY_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `DOCRELAY_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `DOCRELAY_LOXO__RECIPIENT=query_person_id` sets the `loxo.recipient` field, and
//! `DOCRELAY_LOXO__CREDENTIALS__TOKENS__ACME=...` sets the bearer token for the `acme` agency.
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 7071
//! loxo:
//!   api_url: https://app.loxo.co
//!   recipient: email_lookup
//!   credentials:
//!     tokens:
//!       acme: "<bearer token>"
//!   filename:
//!     policy: timestamp
//! ```
//!
//! Single-tenant deployments can use a global token and a fixed agency slug instead:
//!
//! ```yaml
//! loxo:
//!   agency_slug: acme
//!   recipient: query_person_id
//!   credentials:
//!     token: "<bearer token>"
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use url::Url;

use crate::errors::{Error, Stage};
use axum::http::StatusCode;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "DOCRELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Loxo integration settings
    pub loxo: LoxoConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7071,
            enable_otel_export: false,
            loxo: LoxoConfig::default(),
        }
    }
}

/// Settings for the upstream Loxo API and how inbound requests map onto it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoxoConfig {
    /// Base URL of the Loxo API
    #[serde(deserialize_with = "parse_url")]
    pub api_url: Url,
    /// Agency slug used when the request body does not carry one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_slug: Option<String>,
    /// How the destination person is identified
    pub recipient: RecipientStrategy,
    /// Bearer tokens used for outbound Loxo calls
    pub credentials: CredentialsConfig,
    /// How uploaded documents are named
    pub filename: FilenameConfig,
    /// How failed upstream calls are reported to the caller
    pub upstream_errors: UpstreamErrorPolicy,
    /// Timeout applied to every outbound call. Unset means the transport default.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,
}

impl Default for LoxoConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("https://app.loxo.co").expect("default Loxo URL is valid"),
            agency_slug: None,
            recipient: RecipientStrategy::default(),
            credentials: CredentialsConfig::default(),
            filename: FilenameConfig::default(),
            upstream_errors: UpstreamErrorPolicy::default(),
            request_timeout: None,
        }
    }
}

/// Where the person id for an upload comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStrategy {
    /// Look the person up by `data.email` against the Loxo people search
    #[default]
    EmailLookup,
    /// Use `data.personID` from the request body
    BodyPersonId,
    /// Use the `person-id` query parameter
    QueryPersonId,
}

/// Bearer token source: one token per agency slug, or a single token for every agency.
#[derive(Clone, Deserialize, Serialize)]
#[serde(try_from = "CredentialsFields", into = "CredentialsFields")]
pub enum CredentialsConfig {
    PerAgency { tokens: HashMap<String, String> },
    Global { token: String },
}

/// On-disk shape of [`CredentialsConfig`]; `tokens` and `token` are mutually exclusive.
#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct CredentialsFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    tokens: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl TryFrom<CredentialsFields> for CredentialsConfig {
    type Error = String;

    fn try_from(fields: CredentialsFields) -> Result<Self, Self::Error> {
        match (fields.tokens, fields.token) {
            (Some(_), Some(_)) => {
                Err("loxo.credentials: set either `tokens` (per agency) or `token` (global), not both".to_string())
            }
            (None, Some(token)) => Ok(CredentialsConfig::Global { token }),
            (tokens, None) => Ok(CredentialsConfig::PerAgency {
                tokens: tokens.unwrap_or_default(),
            }),
        }
    }
}

impl From<CredentialsConfig> for CredentialsFields {
    fn from(config: CredentialsConfig) -> Self {
        match config {
            CredentialsConfig::PerAgency { tokens } => Self {
                tokens: Some(tokens),
                ..Default::default()
            },
            CredentialsConfig::Global { token } => Self {
                token: Some(token),
                ..Default::default()
            },
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        CredentialsConfig::PerAgency { tokens: HashMap::new() }
    }
}

// Tokens never show up in logs or `--validate` output.
impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialsConfig::PerAgency { tokens } => {
                let mut slugs: Vec<&String> = tokens.keys().collect();
                slugs.sort();
                f.debug_struct("PerAgency").field("slugs", &slugs).finish()
            }
            CredentialsConfig::Global { .. } => f.debug_struct("Global").field("token", &"<redacted>").finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenamePolicy {
    /// `{prefix}{yyyy_MM_dd_HH_mm_ss}.{extension}`
    #[default]
    Timestamp,
    /// Last segment of the document URL's path, falling back to a timestamp name
    UrlPath,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilenameConfig {
    pub policy: FilenamePolicy,
    pub prefix: String,
    pub extension: String,
}

impl Default for FilenameConfig {
    fn default() -> Self {
        Self {
            policy: FilenamePolicy::Timestamp,
            prefix: "Form_".to_string(),
            extension: "pdf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorPolicy {
    /// Return the upstream status code verbatim
    #[default]
    Passthrough,
    /// 404 for lookup and download failures, 500 for publish failures
    Collapse,
}

impl UpstreamErrorPolicy {
    /// The status reported to the caller when `stage` received `status` from upstream.
    pub fn report(self, stage: Stage, status: StatusCode) -> StatusCode {
        match self {
            UpstreamErrorPolicy::Passthrough => status,
            UpstreamErrorPolicy::Collapse => match stage {
                Stage::Resolve | Stage::Fetch => StatusCode::NOT_FOUND,
                Stage::Publish => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let loxo = &self.loxo;

        if !matches!(loxo.api_url.scheme(), "http" | "https") {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: loxo.api_url must be an http(s) URL, got '{}'",
                    loxo.api_url
                ),
            });
        }

        if loxo.api_url.cannot_be_a_base() {
            return Err(Error::Internal {
                operation: format!("Config validation: loxo.api_url '{}' cannot be used as a base URL", loxo.api_url),
            });
        }

        match &loxo.credentials {
            CredentialsConfig::PerAgency { tokens } => {
                if tokens.is_empty() {
                    return Err(Error::Internal {
                        operation: "Config validation: no Loxo credentials configured. \
                         Set loxo.credentials.tokens.<slug> or loxo.credentials.token (DOCRELAY_LOXO__CREDENTIALS__TOKEN)."
                            .to_string(),
                    });
                }
                if let Some((slug, _)) = tokens.iter().find(|(_, token)| token.trim().is_empty()) {
                    return Err(Error::Internal {
                        operation: format!("Config validation: empty bearer token for agency '{slug}'"),
                    });
                }
            }
            CredentialsConfig::Global { token } => {
                if token.trim().is_empty() {
                    return Err(Error::Internal {
                        operation: "Config validation: loxo.credentials.token is empty".to_string(),
                    });
                }
            }
        }

        // The query-parameter trigger has no body field for the slug, so it must come from config.
        if loxo.recipient == RecipientStrategy::QueryPersonId && loxo.agency_slug.as_deref().is_none_or(|s| s.trim().is_empty()) {
            return Err(Error::Internal {
                operation: "Config validation: recipient strategy 'query_person_id' requires loxo.agency_slug".to_string(),
            });
        }

        if loxo.filename.extension.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: loxo.filename.extension cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("DOCRELAY_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_per_agency_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 8080
loxo:
  api_url: http://loxo.internal:9000
  credentials:
    tokens:
      acme: token-acme
      globex: token-globex
  filename:
    policy: url_path
  request_timeout: 45s
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 8080);
            assert_eq!(config.loxo.api_url.as_str(), "http://loxo.internal:9000/");
            assert_eq!(config.loxo.recipient, RecipientStrategy::EmailLookup);
            assert_eq!(config.loxo.filename.policy, FilenamePolicy::UrlPath);
            assert_eq!(config.loxo.filename.prefix, "Form_"); // default
            assert_eq!(config.loxo.request_timeout, Some(Duration::from_secs(45)));
            assert_eq!(config.loxo.upstream_errors, UpstreamErrorPolicy::Passthrough);

            match &config.loxo.credentials {
                CredentialsConfig::PerAgency { tokens } => {
                    assert_eq!(tokens.get("acme").map(String::as_str), Some("token-acme"));
                    assert_eq!(tokens.len(), 2);
                }
                other => panic!("expected per-agency credentials, got {other:?}"),
            }

            Ok(())
        });
    }

    #[test]
    fn test_global_token_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
loxo:
  agency_slug: acme
  recipient: query_person_id
  upstream_errors: collapse
  credentials:
    token: global-token
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.loxo.recipient, RecipientStrategy::QueryPersonId);
            assert_eq!(config.loxo.agency_slug.as_deref(), Some("acme"));
            assert_eq!(config.loxo.upstream_errors, UpstreamErrorPolicy::Collapse);
            assert!(matches!(config.loxo.credentials, CredentialsConfig::Global { ref token } if token == "global-token"));
            assert_eq!(config.loxo.api_url.as_str(), "https://app.loxo.co/");

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
loxo:
  credentials:
    tokens:
      acme: from-yaml
"#,
            )?;

            jail.set_env("DOCRELAY_HOST", "127.0.0.1");
            jail.set_env("DOCRELAY_PORT", "9090");
            jail.set_env("DOCRELAY_LOXO__RECIPIENT", "body_person_id");
            jail.set_env("DOCRELAY_LOXO__CREDENTIALS__TOKENS__ACME", "from-env");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 9090);
            assert_eq!(config.loxo.recipient, RecipientStrategy::BodyPersonId);
            match &config.loxo.credentials {
                CredentialsConfig::PerAgency { tokens } => {
                    assert_eq!(tokens.get("acme").map(String::as_str), Some("from-env"));
                }
                other => panic!("expected per-agency credentials, got {other:?}"),
            }

            Ok(())
        });
    }

    #[test]
    fn test_token_and_tokens_together_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
loxo:
  credentials:
    tokens:
      acme: from-yaml
"#,
            )?;
            jail.set_env("DOCRELAY_LOXO__CREDENTIALS__TOKEN", "from-env");

            let err = Config::load(&args("test.yaml")).expect_err("conflicting credentials");
            assert!(err.to_string().contains("not both"), "unexpected error: {err}");

            Ok(())
        });
    }

    #[test]
    fn test_missing_config_file_fails_validation_without_credentials() {
        Jail::expect_with(|_jail| {
            let result = Config::load(&args("does-not-exist.yaml"));
            let err = result.expect_err("empty config has no credentials");
            assert!(err.to_string().contains("no Loxo credentials configured"));
            Ok(())
        });
    }

    #[test]
    fn test_config_validation_query_strategy_requires_slug() {
        let mut config = Config::default();
        config.loxo.credentials = CredentialsConfig::Global {
            token: "token".to_string(),
        };
        config.loxo.recipient = RecipientStrategy::QueryPersonId;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requires loxo.agency_slug"));

        config.loxo.agency_slug = Some("acme".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_token() {
        let mut config = Config::default();
        config.loxo.credentials = CredentialsConfig::PerAgency {
            tokens: HashMap::from([("acme".to_string(), "  ".to_string())]),
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("empty bearer token for agency 'acme'"));
    }

    #[test]
    fn test_config_validation_rejects_non_http_api_url() {
        let mut config = Config::default();
        config.loxo.credentials = CredentialsConfig::Global {
            token: "token".to_string(),
        };
        config.loxo.api_url = Url::parse("ftp://loxo.example").unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_tokens() {
        let per_agency = CredentialsConfig::PerAgency {
            tokens: HashMap::from([("acme".to_string(), "secret-1".to_string())]),
        };
        let global = CredentialsConfig::Global {
            token: "secret-2".to_string(),
        };

        let rendered = format!("{per_agency:?} {global:?}");
        assert!(rendered.contains("acme"));
        assert!(!rendered.contains("secret-1"));
        assert!(!rendered.contains("secret-2"));
    }

    #[test]
    fn test_upstream_error_policy() {
        let passthrough = UpstreamErrorPolicy::Passthrough;
        assert_eq!(passthrough.report(Stage::Fetch, StatusCode::FORBIDDEN), StatusCode::FORBIDDEN);
        assert_eq!(passthrough.report(Stage::Publish, StatusCode::UNPROCESSABLE_ENTITY), StatusCode::UNPROCESSABLE_ENTITY);

        let collapse = UpstreamErrorPolicy::Collapse;
        assert_eq!(collapse.report(Stage::Resolve, StatusCode::UNAUTHORIZED), StatusCode::NOT_FOUND);
        assert_eq!(collapse.report(Stage::Fetch, StatusCode::FORBIDDEN), StatusCode::NOT_FOUND);
        assert_eq!(collapse.report(Stage::Publish, StatusCode::BAD_REQUEST), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
