use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use thiserror::Error as ThisError;

use crate::config::UpstreamErrorPolicy;

/// The outbound call an upstream failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Person search by email against Loxo
    Resolve,
    /// Download of the source document
    Fetch,
    /// Document upload to Loxo
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Stage::Resolve => "look up recipient",
            Stage::Fetch => "download document",
            Stage::Publish => "publish document",
        };
        f.write_str(action)
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing or malformed inbound request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Person search succeeded but matched nobody
    #[error("No person found with email {email}")]
    RecipientNotFound { email: String },

    /// No bearer token is configured for the requested agency
    #[error("No credentials configured for agency '{slug}'")]
    MissingCredentials { slug: String },

    /// Upstream answered with a non-success status
    #[error("Failed to {stage}: upstream returned {status}")]
    Upstream {
        stage: Stage,
        status: StatusCode,
        /// Status returned to our caller, after the configured policy is applied
        reported: StatusCode,
    },

    /// Upstream could not be reached or the response could not be read
    #[error("Failed to {stage}: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    pub fn upstream(stage: Stage, status: StatusCode, policy: UpstreamErrorPolicy) -> Self {
        Error::Upstream {
            stage,
            status,
            reported: policy.report(stage, status),
        }
    }

    pub fn transport(stage: Stage) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Error::Transport { stage, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::RecipientNotFound { .. } => StatusCode::NOT_FOUND,
            Error::MissingCredentials { .. } => StatusCode::UNAUTHORIZED,
            Error::Upstream { reported, .. } => *reported,
            Error::Transport { .. } => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::RecipientNotFound { .. } => "No person found with the supplied email".to_string(),
            Error::MissingCredentials { slug } => format!("No credentials configured for agency '{slug}'"),
            Error::Upstream { stage, status, .. } => format!("Failed to {stage}: upstream returned {}", status.as_u16()),
            Error::Transport { stage, .. } => format!("Failed to {stage}: upstream unreachable"),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Upstream { .. } | Error::Transport { .. } => {
                tracing::warn!("Upstream error: {}", self);
            }
            Error::MissingCredentials { .. } => {
                tracing::warn!("Credential error: {}", self);
            }
            Error::BadRequest { .. } | Error::RecipientNotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
