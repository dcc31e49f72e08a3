//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Inbound request schemas

pub mod handlers;
pub mod models;
