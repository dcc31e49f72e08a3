//! Recipient resolution: turn a [`Recipient`] into a concrete Loxo person id.

use reqwest::{Client, header::ACCEPT};
use serde::Deserialize;
use tracing::{debug, error, info, instrument};
use url::{Url, form_urlencoded};

use super::{Recipient, loxo_endpoint};
use crate::config::UpstreamErrorPolicy;
use crate::errors::{Error, Result, Stage};
use crate::types::{PersonId, PersonIdValue};

/// Body of `GET /api/{slug}/people`
#[derive(Debug, Deserialize)]
struct PeopleResponse {
    people: Option<Vec<PersonRecord>>,
}

#[derive(Debug, Deserialize)]
struct PersonRecord {
    id: Option<PersonIdValue>,
}

impl PeopleResponse {
    /// Id of the first listed person, when it is usable.
    fn first_id(&self) -> Option<PersonId> {
        self.people.as_deref()?.first()?.id.as_ref()?.as_person_id()
    }
}

/// Parse a successful search body. An empty or `null` body means nobody matched.
fn parse_people(body: &[u8]) -> serde_json::Result<Option<PeopleResponse>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
}

/// Looks people up by email through the Loxo person search.
#[derive(Debug, Clone)]
pub struct RecipientResolver {
    client: Client,
    api_url: Url,
    upstream_errors: UpstreamErrorPolicy,
}

impl RecipientResolver {
    pub fn new(client: Client, api_url: Url, upstream_errors: UpstreamErrorPolicy) -> Self {
        Self {
            client,
            api_url,
            upstream_errors,
        }
    }

    /// Resolve the person id for `recipient`. Ids supplied directly are returned as-is without
    /// any outbound call.
    pub async fn resolve(&self, slug: &str, token: &str, recipient: &Recipient) -> Result<PersonId> {
        match recipient {
            Recipient::PersonId(id) => Ok(*id),
            Recipient::Email(email) => self.find_by_email(slug, token, email).await,
        }
    }

    /// `GET /api/{slug}/people?query=emails:"{email}"`, returning the first match's id.
    #[instrument(skip(self, token))]
    pub async fn find_by_email(&self, slug: &str, token: &str, email: &str) -> Result<PersonId> {
        let url = people_search_url(&self.api_url, slug, email)?;
        debug!("Searching for person at {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(Error::transport(Stage::Resolve))?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Failed to get person with email {}", email);
            return Err(Error::upstream(Stage::Resolve, status, self.upstream_errors));
        }

        let body = response.bytes().await.map_err(Error::transport(Stage::Resolve))?;
        let people = parse_people(&body).map_err(|e| {
            error!("Failed to parse person search response: {}", e);
            Error::Internal {
                operation: "parse person search response".to_string(),
            }
        })?;

        match people.as_ref().and_then(PeopleResponse::first_id) {
            Some(id) => {
                info!(person_id = id, "Resolved recipient");
                Ok(id)
            }
            None => {
                info!("No person matches email {}", email);
                Err(Error::RecipientNotFound { email: email.to_string() })
            }
        }
    }
}

/// Build the person search URL. The email is trimmed and form-encoded inside the quoted
/// `emails:` filter.
fn people_search_url(api_url: &Url, slug: &str, email: &str) -> Result<Url> {
    let encoded: String = form_urlencoded::byte_serialize(email.trim().as_bytes()).collect();
    let mut url = loxo_endpoint(api_url, &[slug, "people"])?;
    url.set_query(Some(&format!("query=emails:\"{encoded}\"")));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(server: &MockServer, policy: UpstreamErrorPolicy) -> RecipientResolver {
        RecipientResolver::new(Client::new(), Url::parse(&server.uri()).unwrap(), policy)
    }

    #[test]
    fn test_people_search_url_encodes_email() {
        let api = Url::parse("https://app.loxo.co").unwrap();
        let url = people_search_url(&api, "acme", "  jane+doe@example.com ").unwrap();

        assert_eq!(url.path(), "/api/acme/people");
        assert_eq!(url.query(), Some("query=emails:%22jane%2Bdoe%40example.com%22"));
    }

    #[tokio::test]
    async fn test_find_by_email_returns_first_match() {
        crate::install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/acme/people"))
            .and(query_param("query", "emails:\"a@b.com\""))
            .and(header("authorization", "Bearer token-acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "people": [{"id": 42, "name": "Ada"}, {"id": 43}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = resolver(&server, UpstreamErrorPolicy::Passthrough)
            .find_by_email("acme", "token-acme", "a@b.com")
            .await
            .unwrap();
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn test_zero_matches_is_not_found() {
        crate::install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/acme/people"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "people": [] })))
            .mount(&server)
            .await;

        let err = resolver(&server, UpstreamErrorPolicy::Passthrough)
            .find_by_email("acme", "token", "nobody@b.com")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RecipientNotFound { ref email } if email == "nobody@b.com"));
        assert_eq!(err.status_code(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_search_responses_are_not_found() {
        crate::install_crypto_provider();
        for body in ["", "  ", "null", "{}", r#"{"people":null}"#, r#"{"people":[{}]}"#, r#"{"people":[{"id":null}]}"#] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/acme/people"))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;

            let err = resolver(&server, UpstreamErrorPolicy::Passthrough)
                .find_by_email("acme", "token", "nobody@b.com")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::RecipientNotFound { .. }), "body {body:?} gave {err:?}");
        }
    }

    #[tokio::test]
    async fn test_string_person_id_is_accepted() {
        crate::install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/acme/people"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "people": [{"id": "42"}]
            })))
            .mount(&server)
            .await;

        let id = resolver(&server, UpstreamErrorPolicy::Passthrough)
            .find_by_email("acme", "token", "a@b.com")
            .await
            .unwrap();
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn test_unparseable_search_response_is_internal() {
        crate::install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/acme/people"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = resolver(&server, UpstreamErrorPolicy::Passthrough)
            .find_by_email("acme", "token", "a@b.com")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_upstream_failure_carries_status() {
        crate::install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/acme/people"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = resolver(&server, UpstreamErrorPolicy::Passthrough)
            .find_by_email("acme", "bad-token", "a@b.com")
            .await
            .unwrap_err();

        match err {
            Error::Upstream { stage, status, reported } => {
                assert_eq!(stage, Stage::Resolve);
                assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
                assert_eq!(reported, reqwest::StatusCode::UNAUTHORIZED);
            }
            other => panic!("expected upstream error, got {other:?}"),
        }

        let collapsed = resolver(&server, UpstreamErrorPolicy::Collapse)
            .find_by_email("acme", "bad-token", "a@b.com")
            .await
            .unwrap_err();
        assert_eq!(collapsed.status_code(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_direct_person_id_skips_lookup() {
        crate::install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let id = resolver(&server, UpstreamErrorPolicy::Passthrough)
            .resolve("acme", "token", &Recipient::PersonId(7))
            .await
            .unwrap();
        assert_eq!(id, 7);
    }
}
