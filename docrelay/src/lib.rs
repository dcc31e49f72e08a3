//! # docrelay: document relay into Loxo
//!
//! `docrelay` receives a document URL and a recipient, downloads the document and re-uploads it
//! to a person record in the [Loxo](https://loxo.co) applicant-tracking API.
//!
//! ## Request Flow
//!
//! A caller (typically a form or e-signature webhook) POSTs to `/api/upload-document-to-loxo`:
//!
//! ```json
//! { "fileUrl": "https://bucket.example.com/signed/form.pdf", "data": { "slug": "acme", "email": "jane@example.com" } }
//! ```
//!
//! The request is validated, the bearer token for the agency is looked up, the recipient is
//! resolved to a Loxo person id (directly from the request, or by email lookup), the document is
//! downloaded into memory and finally posted as multipart form data to
//! `/api/{slug}/people/{person_id}/documents`. Any failing stage ends the request immediately; see
//! [`pipeline`] for the stages and [`errors`] for how failures map to status codes.
//!
//! The service is stateless. The only shared state is the configuration, the credential store and
//! the outbound HTTP client, all read-only after startup.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use docrelay::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = docrelay::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     docrelay::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use axum::{
    Router,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

use crate::pipeline::UploadPipeline;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .pipeline(Arc::new(pipeline))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<UploadPipeline>,
}

/// Install the process-wide rustls crypto provider. Safe to call more than once.
pub fn install_crypto_provider() {
    // Err means a provider is already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Build the HTTP router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api/upload-document-to-loxo", post(api::handlers::uploads::upload_document))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Main application struct owning the router and its configuration.
///
/// 1. **Create**: [`Application::new`] builds the outbound client, credential store and router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until shutdown
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        info!(
            recipient = ?config.loxo.recipient,
            filename = ?config.loxo.filename.policy,
            upstream_errors = ?config.loxo.upstream_errors,
            "Starting docrelay against {}",
            config.loxo.api_url
        );

        let pipeline = UploadPipeline::from_config(&config.loxo)?;
        let state = AppState::builder().config(config.clone()).pipeline(Arc::new(pipeline)).build();
        let router = build_router(state);

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("docrelay listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
