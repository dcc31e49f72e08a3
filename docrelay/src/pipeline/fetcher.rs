//! Document download.

use bytes::Bytes;
use chrono::{DateTime, Local};
use percent_encoding::percent_decode_str;
use reqwest::Client;
use tracing::{error, info, instrument};
use url::Url;

use crate::config::{FilenameConfig, FilenamePolicy, UpstreamErrorPolicy};
use crate::errors::{Error, Result, Stage};
use crate::types::display_url;

/// A downloaded document, held in memory for the rest of one request.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Bytes,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    client: Client,
    filename: FilenameConfig,
    upstream_errors: UpstreamErrorPolicy,
}

impl DocumentFetcher {
    pub fn new(client: Client, filename: FilenameConfig, upstream_errors: UpstreamErrorPolicy) -> Self {
        Self {
            client,
            filename,
            upstream_errors,
        }
    }

    /// Download `url` without authentication and buffer the whole body.
    ///
    /// Document URLs are expected to be public or pre-signed.
    #[instrument(skip_all, fields(url = %display_url(url)))]
    pub async fn fetch(&self, url: &Url) -> Result<FetchedDocument> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(Error::transport(Stage::Fetch))?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Failed to download file {}", display_url(url));
            return Err(Error::upstream(Stage::Fetch, status, self.upstream_errors));
        }

        let bytes = response.bytes().await.map_err(Error::transport(Stage::Fetch))?;
        info!("File downloaded successfully. Size: {} bytes", bytes.len());

        Ok(FetchedDocument {
            bytes,
            filename: derive_filename(&self.filename, url, Local::now()),
        })
    }
}

/// Name the uploaded document according to the configured policy.
pub fn derive_filename(config: &FilenameConfig, url: &Url, now: DateTime<Local>) -> String {
    match config.policy {
        FilenamePolicy::UrlPath => url_filename(url).unwrap_or_else(|| timestamp_filename(config, now)),
        FilenamePolicy::Timestamp => timestamp_filename(config, now),
    }
}

fn timestamp_filename(config: &FilenameConfig, now: DateTime<Local>) -> String {
    format!("{}{}.{}", config.prefix, now.format("%Y_%m_%d_%H_%M_%S"), config.extension)
}

/// Last non-empty path segment, percent-decoded.
fn url_filename(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back().filter(|s| !s.is_empty())?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let name = decoded.trim();
    (!name.is_empty()).then(|| name.to_string())
}
