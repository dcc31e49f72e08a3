use serde::Deserialize;
use url::form_urlencoded;

pub use crate::types::PersonIdValue;

/// JSON body accepted by the upload endpoint.
///
/// Every field is optional so that validation can name the first missing one. Unknown fields are
/// ignored; callers tend to forward whole webhook payloads.
#[derive(Debug, Default, Deserialize)]
pub struct UploadPayload {
    #[serde(rename = "fileUrl")]
    pub file_url: Option<String>,
    pub data: Option<UploadData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadData {
    pub slug: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "personID")]
    pub person_id: Option<PersonIdValue>,
}

impl UploadPayload {
    /// Parse a raw request body. Anything that is not a well-formed payload is treated as an
    /// empty one, so malformed JSON is reported as missing fields rather than a parser error.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("Unparseable upload payload, treating as empty: {}", e);
                Self::default()
            }
        }
    }

    pub fn slug(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.slug.as_deref())
    }

    pub fn email(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.email.as_deref())
    }

    pub fn person_id(&self) -> Option<&PersonIdValue> {
        self.data.as_ref().and_then(|d| d.person_id.as_ref())
    }
}

/// Query parameters accepted by the upload endpoint
#[derive(Debug, Default)]
pub struct UploadQuery {
    pub person_id: Option<String>,
}

impl UploadQuery {
    /// Parse a raw query string. Like the body, this never fails: invalid percent-escapes are
    /// decoded lossily, and a repeated `person-id` is joined with commas so it reads as invalid
    /// rather than silently picking one value.
    pub fn from_query(raw: Option<&str>) -> Self {
        let values: Vec<String> = raw
            .map(|raw| {
                form_urlencoded::parse(raw.as_bytes())
                    .filter(|(key, _)| key == "person-id")
                    .map(|(_, value)| value.into_owned())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            person_id: (!values.is_empty()).then(|| values.join(",")),
        }
    }
}
