//! HTTP handler for relaying a document into Loxo.

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::uploads::{UploadPayload, UploadQuery},
    errors::Result,
    pipeline::UploadRequest,
};

/// Fetch the document at `fileUrl` and attach it to the Loxo person identified by the request.
///
/// Body and query are read raw rather than through the `Json` and `Query` extractors, so that
/// malformed input is reported through the field messages instead of an extractor rejection.
#[tracing::instrument(skip_all)]
pub async fn upload_document(State(state): State<AppState>, RawQuery(query): RawQuery, body: Bytes) -> Result<StatusCode> {
    let payload = UploadPayload::from_body(&body);
    let query = UploadQuery::from_query(query.as_deref());
    let request = UploadRequest::parse(&payload, &query, &state.config.loxo)?;

    state.pipeline.run(request).await?;

    Ok(StatusCode::OK)
}
