//! HTTP request handlers.
//!
//! - [`uploads`]: the document relay trigger
//!
//! Handlers return [`crate::errors::Error`], which converts to a status code and a plain-text
//! message.

pub mod uploads;
