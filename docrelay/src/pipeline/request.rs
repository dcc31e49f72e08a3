//! Request parsing and validation.

use url::Url;

use crate::api::models::uploads::{PersonIdValue, UploadPayload, UploadQuery};
use crate::config::{LoxoConfig, RecipientStrategy};
use crate::errors::{Error, Result};
use crate::types::PersonId;

/// How the destination person was identified by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    PersonId(PersonId),
    /// Email to look up against Loxo, already trimmed
    Email(String),
}

/// A validated upload: everything the pipeline needs, nothing optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub document_url: Url,
    pub agency_slug: String,
    pub recipient: Recipient,
}

/// Treat absent, empty and whitespace-only values alike.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl UploadRequest {
    /// Build an [`UploadRequest`] from the inbound body and query.
    ///
    /// Missing fields are reported one at a time in a fixed order: `fileUrl`, then the recipient
    /// field of the configured strategy, then `slug`.
    pub fn parse(payload: &UploadPayload, query: &UploadQuery, config: &LoxoConfig) -> Result<Self> {
        let file_url = present(payload.file_url.as_deref()).ok_or_else(|| Error::bad_request("Missing fileUrl in request body."))?;
        let document_url = parse_document_url(file_url)?;

        let recipient = match config.recipient {
            RecipientStrategy::EmailLookup => {
                let email = present(payload.email()).ok_or_else(|| Error::bad_request("Missing email in request body."))?;
                Recipient::Email(email.to_string())
            }
            RecipientStrategy::BodyPersonId => {
                let value = payload
                    .person_id()
                    .ok_or_else(|| Error::bad_request("Missing personID in request body."))?;
                Recipient::PersonId(person_id_from_body(value)?)
            }
            RecipientStrategy::QueryPersonId => {
                let raw = present(query.person_id.as_deref()).ok_or_else(|| Error::bad_request("Missing person-id in query parameters."))?;
                let id = raw
                    .parse::<PersonId>()
                    .map_err(|_| Error::bad_request("Invalid person-id in query parameters."))?;
                Recipient::PersonId(id)
            }
        };

        let agency_slug = present(payload.slug())
            .or_else(|| present(config.agency_slug.as_deref()))
            .ok_or_else(|| Error::bad_request("Missing slug in request body."))?
            .to_string();

        Ok(Self {
            document_url,
            agency_slug,
            recipient,
        })
    }
}

fn parse_document_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|_| Error::bad_request("Invalid fileUrl in request body."))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(Error::bad_request("Invalid fileUrl in request body.")),
    }
}

fn person_id_from_body(value: &PersonIdValue) -> Result<PersonId> {
    if value.is_blank() {
        return Err(Error::bad_request("Missing personID in request body."));
    }
    value
        .as_person_id()
        .ok_or_else(|| Error::bad_request("Invalid personID in request body."))
}
