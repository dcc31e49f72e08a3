//! Common type definitions shared across the pipeline.

use serde::Deserialize;
use url::Url;

/// Loxo's internal identifier for a person (candidate) record
pub type PersonId = i64;

/// A person id as it appears in loosely-typed JSON: a number, a numeric string, or anything else.
///
/// Deserializing never fails, so one odd field cannot sink the document around it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PersonIdValue {
    Number(PersonId),
    Text(String),
    Other(serde_json::Value),
}

impl PersonIdValue {
    /// True for strings that are empty once trimmed.
    pub fn is_blank(&self) -> bool {
        matches!(self, PersonIdValue::Text(text) if text.trim().is_empty())
    }

    /// The id, if the value is an integer or a string holding one.
    pub fn as_person_id(&self) -> Option<PersonId> {
        match self {
            PersonIdValue::Number(id) => Some(*id),
            PersonIdValue::Text(text) => text.trim().parse().ok(),
            PersonIdValue::Other(_) => None,
        }
    }
}

/// Render a URL for logs without its query string or fragment.
///
/// Document URLs are usually pre-signed, so the query carries credentials.
pub fn display_url(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.set_fragment(None);
    shown.to_string()
}
