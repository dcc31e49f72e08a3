//! Document upload to a Loxo person record.

use reqwest::{
    Client, StatusCode,
    header::ACCEPT,
    multipart::{Form, Part},
};
use tracing::{debug, error, instrument};
use url::Url;

use super::{FetchedDocument, loxo_endpoint};
use crate::config::UpstreamErrorPolicy;
use crate::errors::{Error, Result, Stage};
use crate::types::PersonId;

/// Name of the multipart field Loxo reads the document from
const DOCUMENT_FIELD: &str = "document";
const DOCUMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// A document accepted by Loxo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub status: StatusCode,
}

#[derive(Debug, Clone)]
pub struct DocumentPublisher {
    client: Client,
    api_url: Url,
    upstream_errors: UpstreamErrorPolicy,
}

impl DocumentPublisher {
    pub fn new(client: Client, api_url: Url, upstream_errors: UpstreamErrorPolicy) -> Self {
        Self {
            client,
            api_url,
            upstream_errors,
        }
    }

    /// `POST /api/{slug}/people/{person_id}/documents` with the document as a single multipart
    /// file part. Every call creates a new document upstream.
    #[instrument(skip(self, token, document), fields(filename = %document.filename, size = document.bytes.len()))]
    pub async fn publish(&self, slug: &str, token: &str, person_id: PersonId, document: FetchedDocument) -> Result<PublishOutcome> {
        let person_id = person_id.to_string();
        let url = loxo_endpoint(&self.api_url, &[slug, "people", person_id.as_str(), "documents"])?;

        let part = Part::bytes(Vec::from(document.bytes))
            .file_name(document.filename)
            .mime_str(DOCUMENT_CONTENT_TYPE)
            .map_err(|e| Error::Other(e.into()))?;
        let form = Form::new().part(DOCUMENT_FIELD, part);

        debug!("Posting document to {}", url);
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(Error::transport(Stage::Publish))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Failed to post file. HTTP status code: {}", status);
            debug!("Loxo error response body: {}", body);
            return Err(Error::upstream(Stage::Publish, status, self.upstream_errors));
        }

        Ok(PublishOutcome { status })
    }
}
