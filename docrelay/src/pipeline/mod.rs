//! The upload pipeline: validate → resolve credentials → resolve recipient → fetch → publish.
//!
//! ```text
//! UploadRequest::parse()            // 400 on the first missing field
//!   └─ UploadPipeline::run()
//!        ├─ CredentialStore::token_for()     // fails before any outbound call
//!        ├─ RecipientResolver::resolve()     // GET /api/{slug}/people?query=emails:"..."
//!        ├─ DocumentFetcher::fetch()         // GET {fileUrl}, buffered
//!        └─ DocumentPublisher::publish()     // POST /api/{slug}/people/{id}/documents
//! ```
//!
//! Every stage returns [`crate::errors::Result`], so the first failure short-circuits the rest.
//! Nothing is retried and nothing outlives the request.

mod credentials;
mod fetcher;
mod publisher;
mod request;
mod resolver;

pub use credentials::CredentialStore;
pub use fetcher::{DocumentFetcher, FetchedDocument, derive_filename};
pub use publisher::{DocumentPublisher, PublishOutcome};
pub use request::{Recipient, UploadRequest};
pub use resolver::RecipientResolver;

#[cfg(test)]
pub(crate) use publisher::tests::multipart_parts;

use anyhow::Context;
use reqwest::Client;
use std::sync::Arc;
use tracing::{info, instrument};
use url::Url;

use crate::config::LoxoConfig;
use crate::errors::{Error, Result};
use crate::types::display_url;

/// `{api_url}/api/{segments...}`, with each segment percent-encoded.
pub(crate) fn loxo_endpoint(api_url: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = api_url.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| Error::Internal {
            operation: format!("build Loxo API URL from {api_url}"),
        })?
        .pop_if_empty()
        .push("api")
        .extend(segments);
    Ok(url)
}

/// Shared outbound HTTP client. Connections are pooled across requests; no per-request state is
/// kept in it.
pub fn http_client(config: &LoxoConfig) -> anyhow::Result<Client> {
    crate::install_crypto_provider();
    let mut builder = Client::builder();
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to create HTTP client")
}

#[derive(Debug, Clone)]
pub struct UploadPipeline {
    credentials: Arc<CredentialStore>,
    resolver: RecipientResolver,
    fetcher: DocumentFetcher,
    publisher: DocumentPublisher,
}

impl UploadPipeline {
    pub fn from_config(config: &LoxoConfig) -> anyhow::Result<Self> {
        let client = http_client(config)?;
        Ok(Self {
            credentials: Arc::new(CredentialStore::from_config(&config.credentials)),
            resolver: RecipientResolver::new(client.clone(), config.api_url.clone(), config.upstream_errors),
            fetcher: DocumentFetcher::new(client.clone(), config.filename.clone(), config.upstream_errors),
            publisher: DocumentPublisher::new(client, config.api_url.clone(), config.upstream_errors),
        })
    }

    /// Run one upload end to end.
    #[instrument(skip_all, fields(slug = %request.agency_slug, document = %display_url(&request.document_url)))]
    pub async fn run(&self, request: UploadRequest) -> Result<PublishOutcome> {
        let token = self.credentials.token_for(&request.agency_slug)?;

        let person_id = self.resolver.resolve(&request.agency_slug, token, &request.recipient).await?;
        let document = self.fetcher.fetch(&request.document_url).await?;
        let outcome = self.publisher.publish(&request.agency_slug, token, person_id, document).await?;

        info!(person_id, status = outcome.status.as_u16(), "File posted successfully.");
        Ok(outcome)
    }
}
